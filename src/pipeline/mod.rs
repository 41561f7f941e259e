//! Pipeline execution: resolve, send, validate, chain

pub mod context;
pub mod executor;
pub mod expression;
pub mod report;
pub mod resolver;
pub mod response;
pub mod rules;
pub mod runner;

pub use context::{RunContext, RunOptions, Scope, DEFAULT_TIMEOUT};
pub use report::{format_summary, format_summary_json, RunOutcome, RunSummary, TestReport, TestStatus};
pub use response::ResponseSnapshot;
pub use runner::PipelineRunner;

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use tracing::info;

use crate::cli::{Args, LogFormat};
use crate::context::Environment;
use crate::document::{load_document, Document};
use crate::errors::{PipelineError, Result};
use crate::status::ExitStatus;

/// Translate CLI flags into run options
pub fn run_options(args: &Args, env: &Environment) -> Result<RunOptions> {
    let mut options = RunOptions {
        debug: args.debug || env.debug,
        color: env.use_colors(args.no_color),
        handle_interrupts: true,
        ..RunOptions::default()
    };

    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(PipelineError::Argument("--workers must be at least 1".to_string()));
        }
        options.workers = workers;
    }

    if let Some(timeout_secs) = args.timeout {
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(PipelineError::Argument(format!(
                "--timeout must be a positive number of seconds, got {}",
                timeout_secs
            )));
        }
        options.default_timeout = Duration::from_secs_f64(timeout_secs);
    }

    Ok(options)
}

/// Print what `--validate` found
fn report_validation(document: &Document, path: &Path) {
    eprintln!("Validating document: {}", path.display());
    eprintln!("  Tests: {}", document.tests.len());
    eprintln!("  Steps: {}", document.pipelines.len());
    eprintln!("  Document is valid");
}

pub async fn run_pipeline(args: &Args, document_path: &Path, env: &Environment) -> Result<ExitStatus> {
    let document = load_document(document_path)?;

    if args.validate {
        report_validation(&document, document_path);
        return Ok(ExitStatus::Success);
    }

    let options = run_options(args, env)?;
    info!(
        path = %document_path.display(),
        tests = document.tests.len(),
        steps = document.pipelines.len(),
        workers = options.workers,
        "running document"
    );

    let runner = PipelineRunner::new(document, options)?;
    let mut stdout = std::io::stdout();
    let summary = runner.run(&mut stdout).await?;

    if matches!(args.log_format, Some(LogFormat::Json)) {
        write!(stdout, "{}", format_summary_json(&summary))?;
    } else {
        write!(stdout, "{}", format_summary(&summary))?;
    }
    stdout.flush()?;

    Ok(summary.exit_status())
}
