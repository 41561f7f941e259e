//! Step orchestration
//!
//! Steps run in document order. The tests of one step are spawned onto the
//! runtime behind a semaphore; each task reports into its own buffer, and the
//! buffers are written out in submission order once the whole step is done.
//! Chained tests run inside the task that triggered them.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value as JsonValue;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::document::Document;
use crate::errors::{PipelineError, Result};
use crate::output::buffer::OutputBuffer;
use crate::output::terminal::{self, colors};
use crate::signals;
use super::context::{RunContext, RunOptions};
use super::executor::{describe_transport_error, PreparedRequest};
use super::report::{RunOutcome, RunSummary, StepReport, TestReport, TestStatus};
use super::resolver::ValueResolver;
use super::rules::{self, Decision, EvaluationKind};

/// Longest `next` chain followed from one step entry
pub const MAX_CHAIN_DEPTH: usize = 64;

/// How often the interrupt flag is polled while a step is running
const INTERRUPT_POLL: Duration = Duration::from_millis(100);

pub struct PipelineRunner {
    ctx: Arc<RunContext>,
}

impl PipelineRunner {
    pub fn new(document: Document, options: RunOptions) -> Result<Self> {
        Ok(Self {
            ctx: Arc::new(RunContext::new(document, options)?),
        })
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    fn interrupted(&self) -> bool {
        self.ctx.options.handle_interrupts && signals::was_interrupted()
    }

    /// Run every step, writing each test's report block to `out`.
    ///
    /// A document error aborts the run after the current step's buffers have
    /// been written; rule failures and transport errors are part of the summary.
    pub async fn run<W: Write + ?Sized>(&self, out: &mut W) -> Result<RunSummary> {
        let color = self.ctx.options.color;
        let watcher = self.ctx.options.handle_interrupts.then(|| spawn_interrupt_watcher(Arc::clone(&self.ctx)));

        let mut steps = Vec::with_capacity(self.ctx.document.pipelines.len());
        let result = self.run_steps(out, color, &mut steps).await;

        if let Some(watcher) = watcher {
            watcher.abort();
        }
        result?;

        let outcome = if self.interrupted() {
            RunOutcome::Interrupted
        } else if self.ctx.stopped_at().is_some() {
            RunOutcome::Stopped
        } else {
            RunOutcome::Completed
        };

        Ok(RunSummary {
            steps,
            outcome,
            stopped_at: self.ctx.stopped_at().map(str::to_string),
        })
    }

    async fn run_steps<W: Write + ?Sized>(
        &self,
        out: &mut W,
        color: bool,
        steps: &mut Vec<StepReport>,
    ) -> Result<()> {
        let workers = self.ctx.options.workers.max(1);

        for (index, step) in self.ctx.document.pipelines.iter().enumerate() {
            if self.interrupted() {
                self.ctx.cancel.cancel();
            }
            if self.ctx.is_cancelled() {
                debug!(step = index + 1, "run cancelled, skipping remaining steps");
                break;
            }

            let mut header = OutputBuffer::new();
            header.row('═');
            header.line(format!(
                "{} {}",
                terminal::bold(&format!("STEP {}", index + 1), colors::AQUA),
                terminal::muted(&format!("[{}]", step.join(", ")))
            ));
            header.row('═');
            header.flush_to(out, color)?;

            info!(step = index + 1, tests = step.len(), workers, "starting step");

            let semaphore = Arc::new(Semaphore::new(workers));
            let mut handles = Vec::with_capacity(step.len());

            for id in step {
                let permit = Arc::clone(&semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Worker(e.to_string()))?;
                let ctx = Arc::clone(&self.ctx);
                let id = id.clone();

                handles.push(tokio::spawn(async move {
                    let mut buf = OutputBuffer::new();
                    let mut reports = Vec::new();
                    let result = execute_test(&ctx, &id, true, 0, None, &mut buf, &mut reports).await;
                    if result.is_err() {
                        // Fatal: nothing else in this step should chain further
                        ctx.cancel.cancel();
                    }
                    drop(permit);
                    (buf, reports, result)
                }));
            }

            let mut fatal = None;
            let mut tests = Vec::new();
            for handle in handles {
                match handle.await {
                    Ok((buf, reports, result)) => {
                        buf.flush_to(out, color)?;
                        tests.extend(reports);
                        if let Err(e) = result {
                            if fatal.is_none() {
                                fatal = Some(e);
                            }
                        }
                    }
                    Err(e) if fatal.is_none() => {
                        fatal = Some(PipelineError::Worker(format!("test task failed: {}", e)));
                    }
                    Err(_) => {}
                }
            }
            steps.push(StepReport {
                index: index + 1,
                tests,
            });

            if let Some(e) = fatal {
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Forward Ctrl+C to the run's cancellation token
fn spawn_interrupt_watcher(ctx: Arc<RunContext>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = ctx.cancel.cancelled() => {}
            _ = signals::interrupted(INTERRUPT_POLL) => {
                warn!("interrupted, finishing in-flight requests");
                ctx.cancel.cancel();
            }
        }
    })
}

/// Resolve, send and validate one test, then follow its `next` directive.
///
/// Reports for the test and everything it chains to are appended to
/// `reports`, parent first.
fn execute_test<'a>(
    ctx: &'a RunContext,
    id: &'a str,
    continue_next: bool,
    depth: usize,
    chained_from: Option<&'a str>,
    buf: &'a mut OutputBuffer,
    reports: &'a mut Vec<TestReport>,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        if depth > MAX_CHAIN_DEPTH {
            return Err(PipelineError::document(format!(
                "next chain through test {} is longer than {} tests; check next ids for cycles",
                id, MAX_CHAIN_DEPTH
            )));
        }

        let test = ctx.document.test(id)?;
        let method = test.method();

        buf.row('─');
        match chained_from {
            Some(parent) => buf.line(format!(
                "{} {}",
                terminal::bold(&format!("TEST {}", id), colors::YELLOW),
                terminal::muted(&format!("(next of {})", parent))
            )),
            None => buf.line(terminal::bold(&format!("TEST {}", id), colors::YELLOW)),
        }

        if ctx.is_cancelled() {
            buf.warn("run stopped; test not started");
            reports.push(TestReport::new(id, &method, "", chained_from));
            return Ok(());
        }

        let params = ValueResolver::new(ctx, &ctx.document.root_dir).resolve(&test.request)?;
        if ctx.options.debug {
            buf.json(Some("Resolved request"), &params.to_json());
        }
        let prepared = PreparedRequest::prepare(params, &ctx.document.base, ctx.options.default_timeout)?;

        let url = prepared.url.to_string();
        let mut report = TestReport::new(id, prepared.method.as_str(), &url, chained_from);

        buf.line(format!(
            "{} {}",
            terminal::http::method(prepared.method.as_str()),
            terminal::colorize(&url, colors::YELLOW)
        ));
        let request_headers: serde_json::Map<String, JsonValue> = prepared
            .headers
            .iter()
            .map(|(k, v)| (k.to_string(), JsonValue::String(String::from_utf8_lossy(v.as_bytes()).into_owned())))
            .collect();
        buf.json(Some("Request headers"), &JsonValue::Object(request_headers));

        debug!(test = id, method = %prepared.method, url = %url, depth, "sending request");
        let timeout = prepared.timeout;
        let snapshot = match prepared.send(&ctx.client).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let message = describe_transport_error(&e, timeout);
                warn!(test = id, error = %message, "request failed");
                buf.error(&format!("Transport error: {}", message));
                report.status = TestStatus::TransportError(message);
                reports.push(report);
                return Ok(());
            }
        };
        ctx.results.record(id, &snapshot);

        report.response_status = Some(snapshot.status);
        report.elapsed = Some(snapshot.elapsed);
        buf.inline(
            "Status",
            &format!("{} {}", terminal::http::status(snapshot.status), terminal::muted(&format!("({:?})", snapshot.elapsed))),
        );

        if ctx.is_cancelled() {
            buf.warn("run stopped; skipping rule evaluation");
            reports.push(report);
            return Ok(());
        }

        let evaluation = rules::evaluate(test, &snapshot, ctx)?;
        match evaluation.kind {
            EvaluationKind::NoRules => {
                warn!(test = id, "no rule sets declared");
                buf.warn(&format!("test {} declares no response rules", id));
                report.status = TestStatus::NoRules;
            }
            EvaluationKind::Unhandled => {
                warn!(test = id, status = evaluation.status, "unhandled status");
                buf.warn(&format!("unhandled status {} for test {}", evaluation.status, id));
                report.status = TestStatus::Unhandled(evaluation.status);
            }
            EvaluationKind::Checked => {
                report.status = if evaluation.success() {
                    TestStatus::Passed
                } else {
                    TestStatus::Failed
                };
            }
        }
        if let Some(rule_set) = evaluation.rule_set {
            rules::dump_debug(rule_set, &snapshot, buf);
        }
        evaluation.report(buf);
        report.rules_total = evaluation.results.len();
        report.rules_passed = evaluation.results.iter().filter(|r| r.success).count();
        reports.push(report);

        match evaluation.decide(continue_next) {
            Decision::Done => Ok(()),
            Decision::Stop => {
                info!(test = id, "failing rule set stops the run");
                buf.error(&format!("Stopping: test {} failed", id));
                ctx.stop(id);
                Ok(())
            }
            Decision::Next { directive, run } => {
                let target = match directive.target() {
                    Some(target) => target,
                    None => return Ok(()),
                };
                ctx.document.test(target).map_err(|_| {
                    PipelineError::document(format!("next id {} in test {} does not exist", target, id))
                })?;
                if !run {
                    buf.line(terminal::muted(&format!("Not running {}: test {} failed", target, id)));
                    return Ok(());
                }
                if ctx.is_cancelled() {
                    buf.warn(&format!("run stopped; not chaining to {}", target));
                    return Ok(());
                }
                debug!(from = id, to = target, "chaining");
                execute_test(
                    ctx,
                    target,
                    directive.allows_further_chaining(),
                    depth + 1,
                    Some(id),
                    buf,
                    reports,
                )
                .await
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::path::Path;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn runner(doc: JsonValue) -> PipelineRunner {
        let document = Document::from_value(doc, IndexMap::new(), Path::new(".")).unwrap();
        let options = RunOptions {
            workers: 4,
            ..RunOptions::default()
        };
        PipelineRunner::new(document, options).unwrap()
    }

    async fn run(runner: &PipelineRunner) -> (Result<RunSummary>, String) {
        let mut out = Vec::new();
        let result = runner.run(&mut out).await;
        (result, String::from_utf8(out).unwrap())
    }

    async fn mount_json(server: &MockServer, route: &str, status: u16, body: JsonValue) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_single_passing_test() {
        let server = MockServer::start().await;
        mount_json(&server, "/ok", 200, json!({"ok": true})).await;

        let runner = runner(json!({
            "base": server.uri(),
            "tests": {"t1": {"request": {"uri": "/ok"}, "response": [{"status": 200, "body": {"ok": true}}]}},
            "pipelines": [["t1"]]
        }));
        let (result, output) = run(&runner).await;
        let summary = result.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.find("t1").unwrap().status, TestStatus::Passed);
        assert!(output.contains("STEP 1"));
        assert!(output.contains("✓ body.ok == true"));
    }

    #[tokio::test]
    async fn test_results_feed_later_templates() {
        let server = MockServer::start().await;
        mount_json(&server, "/login", 200, json!({"token": "abc"})).await;
        Mock::given(method("GET"))
            .and(path("/me"))
            .and(wiremock::matchers::header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "admin"})))
            .expect(1)
            .mount(&server)
            .await;

        let runner = runner(json!({
            "base": server.uri(),
            "tests": {
                "login": {"request": {"uri": "/login"}, "response": [{"status": 200}]},
                "me": {
                    "request": {"uri": "/me", "headers": {"Authorization": "Bearer {tests.login.results.200.json.token}"}},
                    "response": [{"status": 200, "body": {"name": "admin", "tests.login.results.200.json.token": "abc"}}]
                }
            },
            "pipelines": [["login"], ["me"]]
        }));
        let summary = run(&runner).await.0.unwrap();
        assert_eq!(summary.find("me").unwrap().status, TestStatus::Passed);
    }

    #[tokio::test]
    async fn test_transport_error_does_not_stop() {
        let server = MockServer::start().await;
        mount_json(&server, "/ok", 200, json!({})).await;

        let runner = runner(json!({
            "base": server.uri(),
            "tests": {
                "down": {"request": {"uri": "http://127.0.0.1:1/"}, "response": [{"status": 200}]},
                "up": {"request": {"uri": "/ok"}, "response": [{"status": 200}]}
            },
            "pipelines": [["down"], ["up"]]
        }));
        let (result, output) = run(&runner).await;
        let summary = result.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(matches!(summary.find("down").unwrap().status, TestStatus::TransportError(_)));
        assert_eq!(summary.find("up").unwrap().status, TestStatus::Passed);
        assert!(output.contains("Transport error"));
    }

    #[tokio::test]
    async fn test_cyclic_chain_is_capped() {
        let server = MockServer::start().await;
        mount_json(&server, "/ping", 200, json!({})).await;

        let runner = runner(json!({
            "base": server.uri(),
            "tests": {
                "ping": {"request": {"uri": "/ping"}, "response": [{"status": 200, "next": {"id": "ping"}}]}
            },
            "pipelines": [["ping"]]
        }));
        let err = run(&runner).await.0.unwrap_err();
        assert!(matches!(err, PipelineError::Document(ref m) if m.contains("cycles")));
    }

    #[tokio::test]
    async fn test_continue_next_false_ends_chain() {
        let server = MockServer::start().await;
        mount_json(&server, "/a", 200, json!({})).await;
        mount_json(&server, "/b", 200, json!({})).await;
        Mock::given(method("GET"))
            .and(path("/c"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let runner = runner(json!({
            "base": server.uri(),
            "tests": {
                "a": {"request": {"uri": "/a"}, "response": [{"status": 200, "next": {"id": "b", "continue_next": false}}]},
                "b": {"request": {"uri": "/b"}, "response": [{"status": 200, "next": {"id": "c"}}]},
                "c": {"request": {"uri": "/c"}, "response": [{"status": 200}]}
            },
            "pipelines": [["a"]]
        }));
        let summary = run(&runner).await.0.unwrap();
        let ids: Vec<_> = summary.tests().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_cancelled_context_skips_tests() {
        let server = MockServer::start().await;
        let runner = runner(json!({
            "base": server.uri(),
            "tests": {"t1": {"request": {"uri": "/"}, "response": [{"status": 200}]}},
            "pipelines": [["t1"]]
        }));
        runner.context().cancel.cancel();
        let summary = run(&runner).await.0.unwrap();
        assert!(summary.steps.is_empty());
        assert_eq!(summary.outcome, RunOutcome::Completed);
    }
}
