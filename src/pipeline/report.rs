//! Per-test outcomes and the end-of-run summary

use std::time::Duration;

use serde_json::json;

use crate::output::buffer::{separator, terminal_width};
use crate::status::ExitStatus;

/// How one test invocation ended
#[derive(Debug, Clone, PartialEq)]
pub enum TestStatus {
    Passed,
    Failed,
    /// Response status had no rule set; not a failure
    Unhandled(u16),
    /// Test declares no rule sets; not a failure
    NoRules,
    /// The request never produced a response
    TransportError(String),
    /// Skipped because the run was stopping
    Cancelled,
}

impl TestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TestStatus::Passed => "passed",
            TestStatus::Failed => "failed",
            TestStatus::Unhandled(_) => "unhandled",
            TestStatus::NoRules => "no-rules",
            TestStatus::TransportError(_) => "transport-error",
            TestStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestReport {
    pub id: String,
    pub method: String,
    pub url: String,
    pub response_status: Option<u16>,
    pub elapsed: Option<Duration>,
    pub status: TestStatus,
    pub rules_passed: usize,
    pub rules_total: usize,
    /// Test whose `next` triggered this one
    pub chained_from: Option<String>,
}

impl TestReport {
    pub fn new(id: &str, method: &str, url: &str, chained_from: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            method: method.to_string(),
            url: url.to_string(),
            response_status: None,
            elapsed: None,
            status: TestStatus::Cancelled,
            rules_passed: 0,
            rules_total: 0,
            chained_from: chained_from.map(str::to_string),
        }
    }

    /// Unhandled statuses and rule-less tests count as passing
    pub fn passed(&self) -> bool {
        matches!(self.status, TestStatus::Passed | TestStatus::Unhandled(_) | TestStatus::NoRules)
    }

    pub fn skipped(&self) -> bool {
        self.status == TestStatus::Cancelled
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    /// 1-based
    pub index: usize,
    pub tests: Vec<TestReport>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// A failing rule set with `stop` halted the run
    Stopped,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub steps: Vec<StepReport>,
    pub outcome: RunOutcome,
    pub stopped_at: Option<String>,
}

impl RunSummary {
    pub fn tests(&self) -> impl Iterator<Item = &TestReport> {
        self.steps.iter().flat_map(|s| s.tests.iter())
    }

    pub fn find(&self, id: &str) -> Option<&TestReport> {
        self.tests().find(|t| t.id == id)
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self.outcome {
            RunOutcome::Completed => ExitStatus::Success,
            RunOutcome::Stopped => ExitStatus::RuleFailed,
            RunOutcome::Interrupted => ExitStatus::Interrupted,
        }
    }
}

pub fn format_summary(summary: &RunSummary) -> String {
    render_summary(summary, terminal_width())
}

fn render_summary(summary: &RunSummary, width: usize) -> String {
    let heavy = separator('═', width);
    let mut output = String::new();
    output.push_str(&format!("\n{}\n", heavy));
    output.push_str(&format!("{:^width$}\n", "PIPELINE RESULTS", width = width));
    output.push_str(&format!("{}\n\n", heavy));

    let total = summary.tests().count();
    let passed = summary.tests().filter(|t| t.passed()).count();
    let skipped = summary.tests().filter(|t| t.skipped()).count();
    let failed = total - passed - skipped;

    for step in &summary.steps {
        output.push_str(&format!("  Step {}\n", step.index));
        for test in &step.tests {
            let icon = if test.skipped() {
                "⊘"
            } else if test.passed() {
                "✓"
            } else {
                "✗"
            };
            let status_str = test
                .response_status
                .map(|c| c.to_string())
                .unwrap_or_else(|| "---".to_string());

            output.push_str(&format!(
                "    {} {} ({} {}) {}",
                icon,
                test.id,
                test.method,
                status_str,
                test.status.label()
            ));
            if let Some(ref parent) = test.chained_from {
                output.push_str(&format!(" [next of {}]", parent));
            }
            output.push('\n');

            if test.rules_total > 0 {
                output.push_str(&format!("        Rules: {}/{}\n", test.rules_passed, test.rules_total));
            }
            if let Some(elapsed) = test.elapsed {
                output.push_str(&format!("        Time: {:?}\n", elapsed));
            }
            if let TestStatus::TransportError(ref error) = test.status {
                output.push_str(&format!("        Error: {}\n", error));
            }
        }
        output.push('\n');
    }

    output.push_str(&format!("{}\n", separator('─', width)));
    output.push_str(&format!(
        "  Total: {} | Passed: {} | Failed: {} | Skipped: {}\n",
        total, passed, failed, skipped
    ));
    match summary.outcome {
        RunOutcome::Completed => {}
        RunOutcome::Stopped => output.push_str(&format!(
            "  Run stopped by failing test {}\n",
            summary.stopped_at.as_deref().unwrap_or("?")
        )),
        RunOutcome::Interrupted => output.push_str("  Run interrupted\n"),
    }
    output.push_str(&format!("{}\n", heavy));

    output
}

/// One JSON object per test, for log aggregation
pub fn format_summary_json(summary: &RunSummary) -> String {
    let mut output = String::new();
    for step in &summary.steps {
        for test in &step.tests {
            let error = match test.status {
                TestStatus::TransportError(ref e) => Some(e.as_str()),
                _ => None,
            };
            let line = json!({
                "level": if test.passed() || test.skipped() { "info" } else { "error" },
                "step": step.index,
                "test": test.id,
                "method": test.method,
                "url": test.url,
                "status_code": test.response_status,
                "result": test.status.label(),
                "error": error,
                "rules_passed": test.rules_passed,
                "rules_total": test.rules_total,
                "elapsed_ms": test.elapsed.map(|d| d.as_millis() as u64),
                "chained_from": test.chained_from,
            });
            output.push_str(&line.to_string());
            output.push('\n');
        }
    }
    output
}
