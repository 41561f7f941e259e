//! Rule expressions
//!
//! ```text
//! expr      := path [ "==" literal ]
//! path      := namespace ( "." name | "[" index "]" | "[" quoted "]" )*
//! namespace := status | headers | text | json | body | response | self | tests
//! ```
//!
//! Expressions are parsed into an [`Expression`] and evaluated against a fixed
//! set of roots; nothing in a document can reach beyond them.

use serde_json::Value as JsonValue;

use crate::document::path::{self, Cursor, Segment};
use crate::errors::ExpressionError;
use super::context::Scope;
use super::response::ResponseSnapshot;

/// Evaluation roots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Status,
    Headers,
    Text,
    /// `json` and `body`
    Json,
    /// The whole snapshot; `response` and `self`
    Response,
    /// Every test in the document, including captured results
    Tests,
}

impl Namespace {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "status" => Some(Namespace::Status),
            "headers" => Some(Namespace::Headers),
            "text" => Some(Namespace::Text),
            "json" | "body" => Some(Namespace::Json),
            "response" | "self" => Some(Namespace::Response),
            "tests" => Some(Namespace::Tests),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    pub root: Namespace,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Path(PathExpr),
    Equals(PathExpr, JsonValue),
}

/// Prefix bare field names with the rule section.
///
/// `ok` in a body rule becomes `body.ok`, `[0]` becomes `body[0]`; anything that
/// already starts with a namespace is left alone.
pub fn normalize(expression: &str, section: &str) -> String {
    let trimmed = expression.trim();
    if starts_with_namespace(trimmed) {
        return trimmed.to_string();
    }
    if trimmed.starts_with('[') {
        format!("{}{}", section, trimmed)
    } else {
        format!("{}.{}", section, trimmed)
    }
}

fn starts_with_namespace(expression: &str) -> bool {
    let mut cursor = Cursor::new(expression);
    match cursor.ident() {
        Some(name) if Namespace::from_name(name).is_some() => {
            matches!(cursor.peek(), None | Some('.' | '[' | '=' | ' '))
        }
        _ => false,
    }
}

/// Parse an already-normalized expression
pub fn parse(expression: &str, namespace: &str) -> Result<Expression, ExpressionError> {
    let fail = |message: String| ExpressionError::new(expression, namespace, message);

    let mut cursor = Cursor::new(expression.trim());
    let name = cursor
        .ident()
        .ok_or_else(|| fail("expected a namespace".to_string()))?;
    let root = Namespace::from_name(name).ok_or_else(|| {
        fail(format!(
            "unknown namespace `{}` (expected status, headers, text, json, body, response or tests)",
            name
        ))
    })?;
    let segments = cursor.segments().map_err(fail)?;
    let path = PathExpr { root, segments };

    cursor.skip_ws();
    if cursor.at_end() {
        return Ok(Expression::Path(path));
    }
    if !cursor.eat_str("==") {
        return Err(fail(format!("unexpected `{}`", cursor.rest())));
    }
    cursor.skip_ws();
    let expected = parse_literal(&mut cursor).map_err(fail)?;
    cursor.skip_ws();
    if !cursor.at_end() {
        return Err(fail(format!("unexpected `{}` after literal", cursor.rest())));
    }
    Ok(Expression::Equals(path, expected))
}

/// Quoted strings, or anything JSON accepts (numbers, booleans, null, lists, maps)
fn parse_literal(cursor: &mut Cursor<'_>) -> Result<JsonValue, String> {
    match cursor.peek() {
        None => Err("expected a literal after `==`".to_string()),
        Some('"' | '\'') => cursor.quoted().map(JsonValue::String),
        Some(_) => {
            let raw = cursor.rest().trim_end();
            let value = serde_json::from_str::<JsonValue>(raw)
                .map_err(|e| format!("invalid literal `{}`: {}", raw, e))?;
            while cursor.bump().is_some() {}
            Ok(value)
        }
    }
}

/// Evaluate against a response snapshot; `tests` lookups go through `scope`
pub fn evaluate(expression: &Expression, response: &ResponseSnapshot, scope: &dyn Scope) -> JsonValue {
    match expression {
        Expression::Path(path) => resolve_path(path, response, scope),
        Expression::Equals(path, expected) => {
            JsonValue::Bool(values_equal(&resolve_path(path, response, scope), expected))
        }
    }
}

/// Parse and evaluate in one go
pub fn eval_str(
    expression: &str,
    namespace: &str,
    response: &ResponseSnapshot,
    scope: &dyn Scope,
) -> Result<JsonValue, ExpressionError> {
    let parsed = parse(expression, namespace)?;
    Ok(evaluate(&parsed, response, scope))
}

fn resolve_path(path: &PathExpr, response: &ResponseSnapshot, scope: &dyn Scope) -> JsonValue {
    match path.root {
        Namespace::Status => walk(&JsonValue::from(response.status), &path.segments),
        Namespace::Text => walk(&JsonValue::String(response.text.clone()), &path.segments),
        Namespace::Json => walk(&response.json, &path.segments),
        Namespace::Response => walk(&response.to_json(), &path.segments),
        Namespace::Headers => {
            // Header names are matched case-insensitively
            let segments: Vec<Segment> = path
                .segments
                .iter()
                .enumerate()
                .map(|(i, s)| match s {
                    Segment::Key(k) if i == 0 => Segment::Key(k.to_ascii_lowercase()),
                    other => other.clone(),
                })
                .collect();
            walk(&response.headers_json(), &segments)
        }
        Namespace::Tests => {
            let mut segments = Vec::with_capacity(path.segments.len() + 1);
            segments.push(Segment::key("tests"));
            segments.extend(path.segments.iter().cloned());
            scope.resolve(&segments).unwrap_or(JsonValue::Null)
        }
    }
}

fn walk(value: &JsonValue, segments: &[Segment]) -> JsonValue {
    path::lookup_or_null(value, segments)
}

/// Structural equality where `1` and `1.0` are the same number
pub fn values_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x == y
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x == y
            } else {
                x.as_f64() == y.as_f64()
            }
        }
        (JsonValue::Array(xs), JsonValue::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| values_equal(x, y))
        }
        (JsonValue::Object(xs), JsonValue::Object(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|(k, x)| ys.get(k).map(|y| values_equal(x, y)).unwrap_or(false))
        }
        _ => a == b,
    }
}
