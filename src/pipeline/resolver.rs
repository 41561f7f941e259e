//! Resolving a test's raw parameters right before the request is built
//!
//! Every string scalar goes through two passes: `{path}` templates are
//! rendered against the run context, then the `read:`, `file:` and `json:`
//! prefixes are applied to the rendered text.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::document::parse_path;
use crate::errors::{PipelineError, Result};
use super::context::Scope;

/// An open file handed to the executor for a multipart upload
#[derive(Debug)]
pub struct FileUpload {
    pub path: PathBuf,
    pub file: fs::File,
}

impl FileUpload {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    }
}

/// A resolved parameter tree; like JSON, plus file handles
#[derive(Debug)]
pub enum Resolved {
    Json(JsonValue),
    File(FileUpload),
    Seq(Vec<Resolved>),
    Map(IndexMap<String, Resolved>),
}

impl Resolved {
    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            Resolved::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Resolved::Json(JsonValue::Null))
    }

    /// Key lookup on a resolved mapping (JSON objects included)
    pub fn get(&self, key: &str) -> Option<&Resolved> {
        match self {
            Resolved::Map(map) => map.get(key),
            _ => None,
        }
    }

    pub fn take(&mut self, key: &str) -> Option<Resolved> {
        match self {
            Resolved::Map(map) => map.shift_remove(key),
            _ => None,
        }
    }

    /// JSON view for reports and non-file parameters; handles become their path
    pub fn to_json(&self) -> JsonValue {
        match self {
            Resolved::Json(v) => v.clone(),
            Resolved::File(upload) => JsonValue::String(format!("<file {}>", upload.path.display())),
            Resolved::Seq(items) => JsonValue::Array(items.iter().map(Resolved::to_json).collect()),
            Resolved::Map(map) => {
                JsonValue::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }

    pub fn contains_files(&self) -> bool {
        match self {
            Resolved::File(_) => true,
            Resolved::Json(_) => false,
            Resolved::Seq(items) => items.iter().any(Resolved::contains_files),
            Resolved::Map(map) => map.values().any(Resolved::contains_files),
        }
    }
}

pub struct ValueResolver<'a> {
    scope: &'a dyn Scope,
    root_dir: &'a Path,
}

impl<'a> ValueResolver<'a> {
    pub fn new(scope: &'a dyn Scope, root_dir: &'a Path) -> Self {
        Self { scope, root_dir }
    }

    /// Deep-copy `value`, resolving every string. Mappings and lists keep their
    /// shape (and key order).
    pub fn resolve(&self, value: &JsonValue) -> Result<Resolved> {
        match value {
            JsonValue::String(s) => self.resolve_str(s),
            JsonValue::Array(items) => Ok(Resolved::Seq(
                items.iter().map(|item| self.resolve(item)).collect::<Result<_>>()?,
            )),
            JsonValue::Object(map) => Ok(Resolved::Map(
                map.iter()
                    .map(|(k, v)| -> Result<(String, Resolved)> { Ok((k.clone(), self.resolve(v)?)) })
                    .collect::<Result<_>>()?,
            )),
            other => Ok(Resolved::Json(other.clone())),
        }
    }

    fn resolve_str(&self, raw: &str) -> Result<Resolved> {
        let rendered = render(raw, self.scope);
        let text = match rendered {
            JsonValue::String(text) => text,
            typed => return Ok(Resolved::Json(typed)),
        };

        if let Some(path) = text.strip_prefix("read:") {
            let path = self.locate(path);
            let file = fs::File::open(&path).map_err(|e| unreadable(&path, e))?;
            return Ok(Resolved::File(FileUpload { path, file }));
        }
        if let Some(path) = text.strip_prefix("file:") {
            let path = self.locate(path);
            let content = fs::read_to_string(&path).map_err(|e| unreadable(&path, e))?;
            return Ok(Resolved::Json(JsonValue::String(content.trim().to_string())));
        }
        if let Some(path) = text.strip_prefix("json:") {
            let path = self.locate(path);
            let content = fs::read_to_string(&path).map_err(|e| unreadable(&path, e))?;
            let parsed = serde_json::from_str(&content).map_err(|e| {
                PipelineError::document(format!("{} is not valid JSON: {}", path.display(), e))
            })?;
            return Ok(Resolved::Json(parsed));
        }
        Ok(Resolved::Json(JsonValue::String(text)))
    }

    fn locate(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw.trim());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }
}

fn unreadable(path: &Path, err: std::io::Error) -> PipelineError {
    PipelineError::document(format!("cannot read {}: {}", path.display(), err))
}

enum Piece<'s> {
    Text(String),
    Placeholder(&'s str),
}

/// Split a template into literal text and `{path}` placeholders.
/// `{{`/`}}` are literal braces; a `{` that does not start a valid path
/// (e.g. inline JSON) is kept as text.
fn split_template(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("{{") || rest.starts_with("}}") {
            text.push(c);
            rest = &rest[2..];
            continue;
        }
        if c == '{' {
            if let Some(end) = rest.find('}') {
                let inner = &rest[1..end];
                if parse_path(inner).is_ok() {
                    if !text.is_empty() {
                        pieces.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    pieces.push(Piece::Placeholder(inner));
                    rest = &rest[end + 1..];
                    continue;
                }
            }
        }
        text.push(c);
        rest = &rest[c.len_utf8()..];
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    pieces
}

/// Render a template; a lone placeholder keeps the referenced value's type
pub fn render(template: &str, scope: &dyn Scope) -> JsonValue {
    let lookup = |path: &str| -> JsonValue {
        parse_path(path)
            .ok()
            .and_then(|segments| scope.resolve(&segments))
            .unwrap_or(JsonValue::Null)
    };

    let pieces = split_template(template);
    if let [Piece::Placeholder(path)] = pieces.as_slice() {
        return lookup(path);
    }

    let mut out = String::with_capacity(template.len());
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.push_str(&text),
            Piece::Placeholder(path) => match lookup(path) {
                JsonValue::Null => {}
                JsonValue::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            },
        }
    }
    JsonValue::String(out)
}
