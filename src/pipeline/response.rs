//! Captured responses
//!
//! A [`ResponseSnapshot`] is what rule expressions see and what later tests can
//! reach through `tests.<id>.results.<status>`.

use std::time::Duration;

use indexmap::IndexMap;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, Default)]
pub struct ResponseSnapshot {
    pub status: u16,
    /// Lower-cased names; repeated headers joined with `", "`
    pub headers: IndexMap<String, String>,
    pub text: String,
    /// Parsed body, or an empty object when the body is not JSON
    pub json: JsonValue,
    pub content: Vec<u8>,
    pub cookies: IndexMap<String, String>,
    /// Final URL after redirects
    pub url: String,
    /// URLs that redirected to `url`
    pub history: Vec<String>,
    pub elapsed: Duration,
}

impl ResponseSnapshot {
    pub fn new(status: u16, headers: IndexMap<String, String>, content: Vec<u8>) -> Self {
        let text = String::from_utf8_lossy(&content).into_owned();
        let json = parse_body(&content);
        Self {
            status,
            headers: headers.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect(),
            text,
            json,
            content,
            ..Default::default()
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn headers_json(&self) -> JsonValue {
        JsonValue::Object(
            self.headers
                .iter()
                .map(|(k, v)| (k.clone(), JsonValue::String(v.clone())))
                .collect(),
        )
    }

    /// The snapshot as stored under `results.<status>`.
    /// `json` and `body` are the same value.
    pub fn to_json(&self) -> JsonValue {
        json!({
            "status": self.status,
            "headers": self.headers_json(),
            "text": self.text,
            "json": self.json,
            "body": self.json,
            "content": String::from_utf8_lossy(&self.content),
            "cookies": self.cookies,
            "url": self.url,
            "history": self.history,
            "elapsed_ms": self.elapsed.as_millis() as u64,
        })
    }
}

fn parse_body(content: &[u8]) -> JsonValue {
    serde_json::from_slice(content).unwrap_or_else(|_| JsonValue::Object(Default::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_body_is_parsed() {
        let snap = ResponseSnapshot::new(200, IndexMap::new(), br#"{"ok": true}"#.to_vec());
        assert_eq!(snap.json, json!({"ok": true}));
        assert_eq!(snap.text, r#"{"ok": true}"#);
    }

    #[test]
    fn test_non_json_body_is_empty_object() {
        let snap = ResponseSnapshot::new(200, IndexMap::new(), b"<html></html>".to_vec());
        assert_eq!(snap.json, json!({}));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let snap = ResponseSnapshot::new(201, headers, Vec::new());
        assert_eq!(snap.header("content-type"), Some("application/json"));
        assert_eq!(snap.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn test_to_json_aliases_body() {
        let snap = ResponseSnapshot::new(200, IndexMap::new(), br#"[1,2]"#.to_vec());
        let value = snap.to_json();
        assert_eq!(value["status"], 200);
        assert_eq!(value["json"], value["body"]);
        assert_eq!(value["body"][1], 2);
    }
}
