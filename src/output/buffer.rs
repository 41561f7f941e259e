//! Per-task report buffers
//!
//! Tests in one step run concurrently, so nothing a worker prints goes straight
//! to stdout. Each worker appends to its own [`OutputBuffer`]; the orchestrator
//! writes the finished block in one piece once the worker (and any chain it
//! triggered) is done.

use std::fmt::Write as _;
use std::io::{self, Write};

use serde_json::Value as JsonValue;

use super::terminal;

/// Fallback width when the terminal size cannot be queried
const DEFAULT_WIDTH: u16 = 80;

/// Width used for separator rows
pub fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| cols)
        .unwrap_or(DEFAULT_WIDTH)
        .max(20) as usize
}

/// `ch` repeated `width` times
pub fn separator(ch: char, width: usize) -> String {
    std::iter::repeat(ch).take(width).collect()
}

/// Text accumulated by one worker for one unit of work
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    text: String,
    width: usize,
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::with_width(DEFAULT_WIDTH as usize)
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::with_width(terminal_width())
    }

    pub fn with_width(width: usize) -> Self {
        Self {
            text: String::new(),
            width,
        }
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        self.text.push_str(text.as_ref());
        self.text.push('\n');
    }

    /// A full-width separator made of `ch`
    pub fn row(&mut self, ch: char) {
        self.line(terminal::muted(&separator(ch, self.width)));
    }

    /// `name: value`, skipped when `value` is empty
    pub fn inline(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        let _ = writeln!(self.text, "{}: {}", terminal::info(name), value);
    }

    /// Pretty-printed JSON under an optional heading.
    ///
    /// Null and empty containers are skipped entirely, heading included.
    pub fn json(&mut self, name: Option<&str>, value: &JsonValue) {
        let empty = match value {
            JsonValue::Null => true,
            JsonValue::String(s) => s.is_empty(),
            JsonValue::Array(a) => a.is_empty(),
            JsonValue::Object(o) => o.is_empty(),
            JsonValue::Bool(_) | JsonValue::Number(_) => false,
        };
        if empty {
            return;
        }
        if let Some(name) = name {
            self.line(terminal::info(name));
        }
        match value {
            JsonValue::String(s) => self.line(s),
            other => {
                let pretty = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
                self.line(pretty);
            }
        }
    }

    pub fn warn(&mut self, text: &str) {
        self.line(terminal::warning(text));
    }

    pub fn error(&mut self, text: &str) {
        self.line(terminal::error(text));
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Write the whole block at once, removing colors when `color` is false
    pub fn flush_to<W: Write + ?Sized>(&self, out: &mut W, color: bool) -> io::Result<()> {
        if color {
            out.write_all(self.text.as_bytes())?;
        } else {
            out.write_all(terminal::strip_ansi(&self.text).as_bytes())?;
        }
        out.flush()
    }
}
