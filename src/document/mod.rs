//! Test document model, loading and path lookups

pub mod loader;
pub mod model;
pub mod path;

pub use loader::{load_document, load_document_with_env};
pub use model::{DebugFlags, Document, NextDirective, RuleSet, Step, TestDefinition};
pub use path::{parse_path, Segment};
