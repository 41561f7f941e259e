//! CLI argument definitions using clap

use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

/// pipetest - run declarative HTTP API test pipelines
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pipetest", version, about, long_about = None, args_override_self = true)]
pub struct Args {
    /// Test document (YAML or JSON)
    #[arg(value_name = "FILE", required_unless_present_any = ["generate_completions", "generate_manpage"])]
    pub file: Option<PathBuf>,

    /// Maximum number of tests of one step running at the same time
    /// (default: number of CPUs)
    #[arg(short = 'w', long = "workers", value_name = "N", env = "PIPETEST_WORKERS")]
    pub workers: Option<usize>,

    /// Default request timeout in seconds, used when a test sets none
    #[arg(long = "timeout", value_name = "SECONDS", env = "PIPETEST_TIMEOUT")]
    pub timeout: Option<f64>,

    /// Force disable colors in output
    #[arg(long = "no-color", action = ArgAction::SetTrue)]
    pub no_color: bool,

    /// Load and check the document without sending any request
    #[arg(long = "validate", action = ArgAction::SetTrue)]
    pub validate: bool,

    /// Format of the end-of-run summary and of log lines on stderr
    #[arg(long = "log-format", value_name = "FORMAT", value_enum)]
    pub log_format: Option<LogFormat>,

    /// Debug mode: dump resolved requests, debug logs, detailed errors
    #[arg(long = "debug", action = ArgAction::SetTrue)]
    pub debug: bool,

    /// Generate shell completions
    #[arg(long = "generate-completions", value_name = "SHELL", value_enum)]
    pub generate_completions: Option<Shell>,

    /// Generate man page
    #[arg(long = "generate-manpage", action = ArgAction::SetTrue)]
    pub generate_manpage: bool,
}

/// Shell types for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Log format for structured output (CI/CD)
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text output (default)
    #[default]
    Text,
    /// JSON Lines format for parsing
    Json,
}
