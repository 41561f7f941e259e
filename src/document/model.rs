//! Typed view over a loaded test document

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::errors::{PipelineError, Result};
use super::path::{self, Segment};

/// Test ids scheduled together; the unit of concurrency
pub type Step = Vec<String>;

/// The whole document: base URL, login blob, tests, pipelines and env
#[derive(Debug, Clone)]
pub struct Document {
    pub base: String,
    pub login: JsonValue,
    pub tests: IndexMap<String, TestDefinition>,
    pub pipelines: Vec<Step>,
    pub env: IndexMap<String, String>,
    /// Directory relative `file:`/`json:`/`read:` paths are resolved against
    pub root_dir: PathBuf,
    /// Root object as loaded (env injected, ids set), for template lookups
    root: JsonValue,
}

/// One named test
#[derive(Debug, Clone)]
pub struct TestDefinition {
    pub id: String,
    /// Raw request parameters; resolved right before each execution
    pub request: JsonValue,
    pub response: Vec<RuleSet>,
}

/// Expectations for one response status
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    pub status: Option<u16>,
    #[serde(default)]
    pub headers: Option<IndexMap<String, JsonValue>>,
    #[serde(default)]
    pub body: Option<IndexMap<String, JsonValue>>,
    #[serde(default)]
    pub debug: Option<JsonValue>,
    #[serde(default)]
    pub stop: Option<bool>,
    #[serde(default)]
    pub next: Option<NextDirective>,
}

/// Which parts of the response a rule set dumps into the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
    pub headers: bool,
    pub body: bool,
}

impl RuleSet {
    /// A failing rule set halts the run unless `stop: false`
    pub fn stops_on_failure(&self) -> bool {
        self.stop.unwrap_or(true)
    }

    /// `(section, expression, expected)` in evaluation order: headers first,
    /// then body, each in declaration order
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &str, &JsonValue)> {
        let headers = self.headers.iter().flatten().map(|(k, v)| ("headers", k.as_str(), v));
        let body = self.body.iter().flatten().map(|(k, v)| ("body", k.as_str(), v));
        headers.chain(body)
    }

    /// `debug: true`, `debug: body` and `debug: [headers, body]` are all accepted
    pub fn debug_flags(&self) -> DebugFlags {
        let mut flags = DebugFlags::default();
        let mut mark = |name: &str| match name {
            "headers" => flags.headers = true,
            "body" => flags.body = true,
            _ => {}
        };
        match &self.debug {
            Some(JsonValue::Bool(true)) => {
                return DebugFlags { headers: true, body: true };
            }
            Some(JsonValue::String(s)) => mark(s),
            Some(JsonValue::Array(items)) => items.iter().filter_map(|v| v.as_str()).for_each(&mut mark),
            _ => {}
        }
        flags
    }
}

/// Follow-up test to run after a rule set is evaluated
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NextDirective {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub if_success: Option<bool>,
    #[serde(default)]
    pub continue_next: Option<bool>,
}

impl NextDirective {
    pub fn target(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Only chain when the current test passed (default)
    pub fn requires_success(&self) -> bool {
        self.if_success.unwrap_or(true)
    }

    /// Whether the chained test may chain further (default)
    pub fn allows_further_chaining(&self) -> bool {
        self.continue_next.unwrap_or(true)
    }
}

impl TestDefinition {
    /// Method as written, uppercased, `GET` when absent
    pub fn method(&self) -> String {
        self.request
            .get("method")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or("GET")
            .to_uppercase()
    }

    pub fn rule_set_for(&self, status: u16) -> Option<&RuleSet> {
        self.response.iter().find(|r| r.status == Some(status))
    }

    fn from_value(id: &str, value: &JsonValue) -> Result<Self> {
        let request = value.get("request").cloned().unwrap_or(JsonValue::Null);
        if !(request.is_object() || request.is_null()) {
            return Err(PipelineError::document(format!("test {}: request must be a mapping", id)));
        }

        let response = match value.get("response") {
            None | Some(JsonValue::Null) => Vec::new(),
            Some(JsonValue::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    serde_json::from_value::<RuleSet>(item.clone()).map_err(|e| {
                        PipelineError::document(format!("test {}: response rule set {}: {}", id, i + 1, e))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(PipelineError::document(format!(
                    "test {}: response must be a list of rule sets",
                    id
                )))
            }
        };

        let mut seen = Vec::with_capacity(response.len());
        for (i, rule_set) in response.iter().enumerate() {
            let status = rule_set.status.ok_or_else(|| {
                PipelineError::document(format!("test {}: response rule set {} must give the status", id, i + 1))
            })?;
            if seen.contains(&status) {
                return Err(PipelineError::document(format!(
                    "test {}: duplicate rule set for status {}",
                    id, status
                )));
            }
            seen.push(status);
        }

        Ok(Self {
            id: id.to_string(),
            request,
            response,
        })
    }
}

impl Document {
    /// Build the typed view from a parsed document root.
    ///
    /// Checks structure (rule sets, statuses, pipeline shape) but not
    /// cross-references; see [`Document::validate`].
    pub fn from_value(mut root: JsonValue, env: IndexMap<String, String>, root_dir: &Path) -> Result<Self> {
        let obj = root
            .as_object_mut()
            .ok_or_else(|| PipelineError::document("document root must be a mapping"))?;

        // Tests may be a mapping keyed by id or a list of entries carrying `id`
        let tests_value = match obj.remove("tests") {
            None | Some(JsonValue::Null) => serde_json::Map::new(),
            Some(JsonValue::Object(map)) => map,
            Some(JsonValue::Array(items)) => {
                let mut map = serde_json::Map::new();
                for item in items {
                    let id = item
                        .get("id")
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| PipelineError::document("every test in a test list needs an id"))?
                        .to_string();
                    map.insert(id, item);
                }
                map
            }
            Some(_) => return Err(PipelineError::document("tests must be a mapping of id to test")),
        };

        let mut tests = IndexMap::with_capacity(tests_value.len());
        let mut tests_root = serde_json::Map::new();
        for (id, mut value) in tests_value {
            if let Some(test) = value.as_object_mut() {
                test.insert("id".to_string(), JsonValue::String(id.clone()));
            } else {
                return Err(PipelineError::document(format!("test {} must be a mapping", id)));
            }
            tests.insert(id.clone(), TestDefinition::from_value(&id, &value)?);
            tests_root.insert(id, value);
        }
        obj.insert("tests".to_string(), JsonValue::Object(tests_root));

        let pipelines = parse_pipelines(obj.get("pipelines"))?;

        let base = match obj.get("base") {
            None | Some(JsonValue::Null) => String::new(),
            Some(JsonValue::String(s)) => s.clone(),
            Some(_) => return Err(PipelineError::document("base must be a string")),
        };
        let login = obj.get("login").cloned().unwrap_or(JsonValue::Null);

        obj.insert(
            "env".to_string(),
            JsonValue::Object(env.iter().map(|(k, v)| (k.clone(), JsonValue::String(v.clone()))).collect()),
        );

        Ok(Self {
            base,
            login,
            tests,
            pipelines,
            env,
            root_dir: root_dir.to_path_buf(),
            root,
        })
    }

    /// Every id named by a step or a `next` directive must exist
    pub fn validate(&self) -> Result<()> {
        for (index, step) in self.pipelines.iter().enumerate() {
            for id in step {
                if !self.tests.contains_key(id) {
                    return Err(PipelineError::document(format!(
                        "test id {} in step {} does not exist",
                        id,
                        index + 1
                    )));
                }
            }
        }
        for test in self.tests.values() {
            for rule_set in &test.response {
                if let Some(target) = rule_set.next.as_ref().and_then(|n| n.target()) {
                    if !self.tests.contains_key(target) {
                        return Err(PipelineError::document(format!(
                            "next id {} in test {} does not exist",
                            target, test.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    pub fn test(&self, id: &str) -> Result<&TestDefinition> {
        self.tests
            .get(id)
            .ok_or_else(|| PipelineError::document(format!("test id {} does not exist", id)))
    }

    /// Root object for template lookups (`base`, `login`, `env`, `tests`, ...)
    pub fn root(&self) -> &JsonValue {
        &self.root
    }

    /// Static part of a document path; runtime `results` live elsewhere
    pub fn lookup(&self, segments: &[Segment]) -> Option<&JsonValue> {
        path::lookup(&self.root, segments)
    }
}

fn parse_pipelines(value: Option<&JsonValue>) -> Result<Vec<Step>> {
    let steps = match value {
        None | Some(JsonValue::Null) => return Ok(Vec::new()),
        Some(JsonValue::Array(steps)) => steps,
        Some(_) => return Err(PipelineError::document("pipelines must be a list of steps")),
    };

    steps
        .iter()
        .enumerate()
        .map(|(i, step)| match step {
            // A bare id is a single-test step
            JsonValue::String(id) => Ok(vec![id.clone()]),
            JsonValue::Array(ids) => ids
                .iter()
                .map(|id| match id {
                    JsonValue::String(s) => Ok(s.clone()),
                    JsonValue::Number(n) => Ok(n.to_string()),
                    other => Err(PipelineError::document(format!(
                        "step {}: test ids must be strings, got {}",
                        i + 1,
                        other
                    ))),
                })
                .collect(),
            other => Err(PipelineError::document(format!(
                "step {} must be a list of test ids, got {}",
                i + 1,
                other
            ))),
        })
        .collect()
}
