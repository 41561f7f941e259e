//! Terminal output: colors and per-task report buffers

pub mod buffer;
pub mod terminal;

pub use buffer::OutputBuffer;
