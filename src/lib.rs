//! pipetest library interface
//!
//! Runs declarative HTTP API test documents: named tests grouped into steps,
//! response rules selected by status code, and `next` chaining between tests.
//!
//! # Module Organization
//!
//! - [`document`] - Document model, loading and path lookups
//! - [`pipeline`] - Value resolution, requests, rules and step orchestration
//! - [`output`] - Terminal colors and per-task report buffers
//! - [`signals`] - Ctrl+C handling
//! - [`errors`] - Error types (PipelineError, Result)
//! - [`status`] - Exit status codes (ExitStatus)
//! - [`core`] - Main execution logic

pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod document;
pub mod errors;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod signals;
pub mod status;

pub use document::{load_document, Document};
pub use errors::{PipelineError, Result};
pub use pipeline::{PipelineRunner, RunOptions, RunOutcome, RunSummary, TestStatus};
pub use status::ExitStatus;
