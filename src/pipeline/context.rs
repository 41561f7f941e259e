//! Per-run execution context
//!
//! Everything a worker needs (HTTP client, document, captured results,
//! cancellation token, options) travels in one [`RunContext`] behind an `Arc`.

use std::sync::OnceLock;
use std::time::Duration;

use dashmap::DashMap;
use indexmap::IndexMap;
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio_util::sync::CancellationToken;

use crate::document::{path, Document, Segment};
use crate::errors::{PipelineError, Result};
use super::response::ResponseSnapshot;

/// Requests without a usable `timeout` wait this long
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Anything that can resolve a path rooted at the document
/// (`base`, `login`, `env`, `tests.<id>.results...`)
pub trait Scope: Send + Sync {
    fn resolve(&self, segments: &[Segment]) -> Option<JsonValue>;
}

/// A bare JSON value acts as a document root
impl Scope for JsonValue {
    fn resolve(&self, segments: &[Segment]) -> Option<JsonValue> {
        path::lookup(self, segments).cloned()
    }
}

/// Runtime `results`: test id -> observed status -> snapshot (as JSON)
#[derive(Debug, Default)]
pub struct ResultsStore {
    inner: DashMap<String, IndexMap<String, JsonValue>>,
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot under its status, replacing only that status' entry
    pub fn record(&self, test_id: &str, snapshot: &ResponseSnapshot) {
        self.inner
            .entry(test_id.to_string())
            .or_default()
            .insert(snapshot.status.to_string(), snapshot.to_json());
    }

    /// `{ "<status>": snapshot, ... }` for one test
    pub fn get(&self, test_id: &str) -> Option<JsonValue> {
        self.inner.get(test_id).map(|entry| {
            JsonValue::Object(entry.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        })
    }
}

/// Knobs that come from the CLI/config rather than the document
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Concurrent tests per step
    pub workers: usize,
    /// Used when a test has no (or a zero) timeout
    pub default_timeout: Duration,
    /// Dump resolved test data into the report
    pub debug: bool,
    /// Keep ANSI colors when flushing reports
    pub color: bool,
    /// Poll the Ctrl+C flag between steps
    pub handle_interrupts: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            default_timeout: DEFAULT_TIMEOUT,
            debug: false,
            color: false,
            handle_interrupts: false,
        }
    }
}

/// One worker per available processor
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

pub struct RunContext {
    pub client: Client,
    pub document: Document,
    pub results: ResultsStore,
    pub cancel: CancellationToken,
    pub options: RunOptions,
    /// First test whose failing rule set halted the run
    stopped_at: OnceLock<String>,
}

impl RunContext {
    pub fn new(document: Document, options: RunOptions) -> Result<Self> {
        // Shared session: cookies set by one response are sent on later requests
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| PipelineError::Argument(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            document,
            results: ResultsStore::new(),
            cancel: CancellationToken::new(),
            options,
            stopped_at: OnceLock::new(),
        })
    }

    /// Record a run-wide stop and tell every other worker about it
    pub fn stop(&self, test_id: &str) {
        let _ = self.stopped_at.set(test_id.to_string());
        self.cancel.cancel();
    }

    pub fn stopped_at(&self) -> Option<&str> {
        self.stopped_at.get().map(String::as_str)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The test definition as written, with its captured `results` merged in
    fn test_view(&self, id: &str) -> Option<JsonValue> {
        let mut value = self.document.root().get("tests")?.get(id)?.clone();
        if let (Some(obj), Some(results)) = (value.as_object_mut(), self.results.get(id)) {
            obj.insert("results".to_string(), results);
        }
        Some(value)
    }
}

impl Scope for RunContext {
    fn resolve(&self, segments: &[Segment]) -> Option<JsonValue> {
        match segments {
            [Segment::Key(root), rest @ ..] if root == "tests" => match rest {
                [] => {
                    let ids = self.document.tests.keys();
                    Some(JsonValue::Object(
                        ids.filter_map(|id| self.test_view(id).map(|v| (id.clone(), v))).collect(),
                    ))
                }
                [id, tail @ ..] => {
                    let id = id.to_string();
                    match tail {
                        [Segment::Key(results), within @ ..] if results == "results" => {
                            let results = self.results.get(&id)?;
                            path::lookup(&results, within).cloned()
                        }
                        _ => {
                            let view = self.test_view(&id)?;
                            path::lookup(&view, tail).cloned()
                        }
                    }
                }
            },
            _ => self.document.lookup(segments).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_path;
    use serde_json::json;
    use std::path::Path;

    fn context() -> RunContext {
        let doc = Document::from_value(
            json!({
                "base": "http://localhost",
                "login": {"user": "admin"},
                "tests": {"login": {"request": {"uri": "/login"}}}
            }),
            IndexMap::new(),
            Path::new("."),
        )
        .unwrap();
        RunContext::new(doc, RunOptions::default()).unwrap()
    }

    #[test]
    fn test_static_lookups() {
        let ctx = context();
        assert_eq!(ctx.resolve(&parse_path("login.user").unwrap()), Some(json!("admin")));
        assert_eq!(
            ctx.resolve(&parse_path("tests.login.request.uri").unwrap()),
            Some(json!("/login"))
        );
        assert_eq!(ctx.resolve(&parse_path("tests.nobody.request").unwrap()), None);
    }

    #[test]
    fn test_results_lookup_after_record() {
        let ctx = context();
        assert_eq!(ctx.resolve(&parse_path("tests.login.results").unwrap()), None);

        let snap = ResponseSnapshot::new(200, IndexMap::new(), br#"{"token": "t0k"}"#.to_vec());
        ctx.results.record("login", &snap);

        assert_eq!(
            ctx.resolve(&parse_path("tests.login.results.200.json.token").unwrap()),
            Some(json!("t0k"))
        );
        let whole = ctx.resolve(&parse_path("tests.login").unwrap()).unwrap();
        assert_eq!(whole["results"]["200"]["status"], 200);
        assert_eq!(whole["id"], "login");
    }

    #[test]
    fn test_record_overwrites_only_same_status() {
        let store = ResultsStore::new();
        store.record("t", &ResponseSnapshot::new(200, IndexMap::new(), b"1".to_vec()));
        store.record("t", &ResponseSnapshot::new(404, IndexMap::new(), b"2".to_vec()));
        store.record("t", &ResponseSnapshot::new(200, IndexMap::new(), b"3".to_vec()));
        let results = store.get("t").unwrap();
        let statuses: Vec<_> = results.as_object().unwrap().keys().cloned().collect();
        assert_eq!(statuses, vec!["200".to_string(), "404".to_string()]);
        assert_eq!(results["200"]["json"], 3);
        assert_eq!(results["404"]["json"], 2);
    }

    #[test]
    fn test_stop_cancels_and_keeps_first() {
        let ctx = context();
        assert!(!ctx.is_cancelled());
        ctx.stop("a");
        ctx.stop("b");
        assert!(ctx.is_cancelled());
        assert_eq!(ctx.stopped_at(), Some("a"));
    }
}
