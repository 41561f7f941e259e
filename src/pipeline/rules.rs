//! Validating a response against the rule set for its status
//!
//! Failed expectations are data, not errors: they come back as
//! [`RuleResult`]s and only change control flow through the rule set's
//! `stop` and `next` settings.

use serde_json::Value as JsonValue;

use crate::document::{NextDirective, RuleSet, TestDefinition};
use crate::errors::{ExpressionError, Result};
use crate::output::buffer::OutputBuffer;
use crate::output::terminal;
use super::context::Scope;
use super::expression::{self, values_equal};
use super::response::ResponseSnapshot;

/// Outcome of one declared expectation
#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    /// Normalized expression (`body.ok`, not `ok`)
    pub expression: String,
    pub value: JsonValue,
    pub expected: JsonValue,
    pub success: bool,
    pub error: Option<String>,
}

impl RuleResult {
    fn checked(expression: String, value: JsonValue, expected: &JsonValue) -> Self {
        let success = values_equal(&value, expected);
        Self {
            expression,
            value,
            expected: expected.clone(),
            success,
            error: None,
        }
    }

    fn failed(expression: String, expected: &JsonValue, err: ExpressionError) -> Self {
        Self {
            expression,
            value: JsonValue::Null,
            expected: expected.clone(),
            success: false,
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationKind {
    /// The test declares no rule sets at all
    NoRules,
    /// No rule set for the observed status
    Unhandled,
    /// A rule set was selected and its rules evaluated
    Checked,
}

/// Everything the rule engine concluded about one response
#[derive(Debug)]
pub struct Evaluation<'t> {
    pub status: u16,
    pub kind: EvaluationKind,
    pub rule_set: Option<&'t RuleSet>,
    pub results: Vec<RuleResult>,
}

/// What the caller should do after an evaluation
#[derive(Debug, PartialEq)]
pub enum Decision<'t> {
    Done,
    /// Halt the whole run
    Stop,
    /// `next` names a test; `run` is false when `if_success` gates it off
    Next { directive: &'t NextDirective, run: bool },
}

impl<'t> Evaluation<'t> {
    /// AND over every result; vacuously true
    pub fn success(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn decide(&self, continue_next: bool) -> Decision<'t> {
        let rule_set = match (self.kind, self.rule_set) {
            (EvaluationKind::Checked, Some(rule_set)) => rule_set,
            _ => return Decision::Done,
        };
        let success = self.success();
        if !success && rule_set.stops_on_failure() {
            return Decision::Stop;
        }
        if !continue_next {
            return Decision::Done;
        }
        match &rule_set.next {
            Some(directive) if directive.target().is_some() => Decision::Next {
                directive,
                run: success || !directive.requires_success(),
            },
            _ => Decision::Done,
        }
    }

    /// Per-expression lines followed by the aggregate verdict
    pub fn report(&self, buf: &mut OutputBuffer) {
        for result in &self.results {
            let icon = if result.success {
                terminal::success("✓")
            } else {
                terminal::error("✗")
            };
            match &result.error {
                Some(err) => buf.line(format!("  {} {}", icon, terminal::error(err))),
                None if result.success => buf.line(format!(
                    "  {} {} == {}",
                    icon,
                    terminal::key(&result.expression),
                    compact(&result.value)
                )),
                None => buf.line(format!(
                    "  {} {}: got {}, expected {}",
                    icon,
                    terminal::key(&result.expression),
                    terminal::error(&compact(&result.value)),
                    compact(&result.expected)
                )),
            }
        }
        if self.kind == EvaluationKind::Checked {
            buf.inline("Result", &terminal::verdict(self.success()));
        }
    }
}

fn compact(value: &JsonValue) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}

/// Run the rule engine for one response.
///
/// Only the mandatory status check can fail here; everything else becomes a
/// [`RuleResult`].
pub fn evaluate<'t>(
    test: &'t TestDefinition,
    response: &ResponseSnapshot,
    scope: &dyn Scope,
) -> Result<Evaluation<'t>> {
    let observed = expression::eval_str("status", "status", response, scope)?;
    let status = observed
        .as_u64()
        .and_then(|s| u16::try_from(s).ok())
        .unwrap_or(response.status);

    if test.response.is_empty() {
        return Ok(Evaluation {
            status,
            kind: EvaluationKind::NoRules,
            rule_set: None,
            results: Vec::new(),
        });
    }

    let rule_set = match test.rule_set_for(status) {
        Some(rule_set) => rule_set,
        None => {
            return Ok(Evaluation {
                status,
                kind: EvaluationKind::Unhandled,
                rule_set: None,
                results: Vec::new(),
            })
        }
    };

    let results = rule_set
        .rules()
        .map(|(section, raw, expected)| {
            let normalized = expression::normalize(raw, section);
            match expression::eval_str(&normalized, section, response, scope) {
                Ok(value) => RuleResult::checked(normalized, value, expected),
                Err(err) => RuleResult::failed(normalized, expected, err),
            }
        })
        .collect();

    Ok(Evaluation {
        status,
        kind: EvaluationKind::Checked,
        rule_set: Some(rule_set),
        results,
    })
}

/// Dump the parts of the response a rule set's `debug` asks for
pub fn dump_debug(rule_set: &RuleSet, response: &ResponseSnapshot, buf: &mut OutputBuffer) {
    let flags = rule_set.debug_flags();
    if flags.headers {
        buf.json(Some("Response headers"), &response.headers_json());
    }
    if flags.body {
        let body = if serde_json::from_str::<JsonValue>(&response.text).is_ok() {
            response.json.clone()
        } else {
            JsonValue::String(response.text.clone())
        };
        buf.json(Some("Response body"), &body);
    }
}
