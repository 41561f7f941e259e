use clap::Parser;

use crate::cli::Args;
use crate::config::Config;
use crate::context::Environment;
use crate::errors::PipelineError;
use crate::logging::init_logging;
use crate::pipeline::run_pipeline;
use crate::status::ExitStatus;

/// Main entry point for the CLI.
///
/// Loads the config file, merges its default options into the arguments,
/// parses them and runs the document on a multi-threaded tokio runtime.
pub fn run(args: Vec<String>, mut env: Environment) -> ExitStatus {
    if let Some(name) = args.first() {
        if let Some(basename) = std::path::Path::new(name).file_stem() {
            env.program_name = basename.to_string_lossy().to_string();
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}", e);
            Config::default()
        }
    };

    let merged_args = merge_default_options(args, &config);

    let parsed = match Args::try_parse_from(&merged_args) {
        Ok(args) => args,
        Err(e) => {
            e.print().ok();
            return if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion {
                ExitStatus::Success
            } else {
                ExitStatus::Error
            };
        }
    };

    if let Some(shell) = &parsed.generate_completions {
        generate_completions(shell, &env.program_name);
        return ExitStatus::Success;
    }

    if parsed.generate_manpage {
        return match generate_manpage() {
            Ok(()) => ExitStatus::Success,
            Err(e) => handle_error(e.into(), false),
        };
    }

    let debug = parsed.debug || env.debug;
    init_logging(
        debug,
        parsed.log_format.unwrap_or_default(),
        env.stderr_isatty && !parsed.no_color,
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return handle_error(e.into(), debug),
    };

    match runtime.block_on(program(parsed, env)) {
        Ok(status) => status,
        Err(e) => handle_error(e, debug),
    }
}

pub async fn program(args: Args, env: Environment) -> Result<ExitStatus, PipelineError> {
    if args.debug {
        eprintln!("Debug: {:?}", args);
    }

    let path = args
        .file
        .clone()
        .ok_or_else(|| PipelineError::Argument("no test document given".to_string()))?;

    run_pipeline(&args, &path, &env).await
}

/// Prepend `[defaults] options` flags from the config file.
/// Positional entries are ignored; the document must come from the command line.
fn merge_default_options(args: Vec<String>, config: &Config) -> Vec<String> {
    if config.default_options.is_empty() {
        return args;
    }

    let options = &config.default_options;
    let (flags, positional): (Vec<_>, Vec<_>) = options
        .iter()
        .enumerate()
        .partition(|(i, opt)| opt.starts_with('-') || (*i > 0 && takes_value(&options[i - 1])));
    let flags: Vec<&String> = flags.into_iter().map(|(_, opt)| opt).collect();
    let positional: Vec<&String> = positional.into_iter().map(|(_, opt)| opt).collect();

    if !positional.is_empty() {
        eprintln!("\x1b[33mWarning: Positional arguments in default_options are ignored: {:?}\x1b[0m", positional);
        eprintln!("Only flags (starting with -) and their values can be used in default_options.");
    }

    if flags.is_empty() {
        return args;
    }

    let mut merged = Vec::with_capacity(args.len() + flags.len());

    if let Some(program) = args.first() {
        merged.push(program.clone());
    }

    merged.extend(flags.into_iter().cloned());
    merged.extend(args.into_iter().skip(1));

    merged
}

/// Flags whose next entry in `default_options` is their value
fn takes_value(flag: &str) -> bool {
    matches!(flag, "--workers" | "-w" | "--timeout" | "--log-format")
}

fn handle_error(error: PipelineError, traceback: bool) -> ExitStatus {
    if traceback {
        eprintln!("Error: {:?}", error);
    } else {
        eprintln!("Error: {}", error);
    }

    // All errors return the same exit code (1) following Unix conventions
    ExitStatus::Error
}

fn generate_completions(shell: &crate::cli::Shell, program_name: &str) {
    use clap::CommandFactory;
    use clap_complete::{generate, Shell as ClapShell};

    let mut cmd = Args::command();
    let shell = match shell {
        crate::cli::Shell::Bash => ClapShell::Bash,
        crate::cli::Shell::Zsh => ClapShell::Zsh,
        crate::cli::Shell::Fish => ClapShell::Fish,
        crate::cli::Shell::PowerShell => ClapShell::PowerShell,
        crate::cli::Shell::Elvish => ClapShell::Elvish,
    };

    generate(shell, &mut cmd, program_name, &mut std::io::stdout());
}

fn generate_manpage() -> std::io::Result<()> {
    use clap::CommandFactory;

    let cmd = Args::command();
    let man = clap_mangen::Man::new(cmd);
    man.render(&mut std::io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn config(options: &[&str]) -> Config {
        Config {
            config_dir: PathBuf::from("."),
            default_options: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_without_defaults() {
        let merged = merge_default_options(args(&["pipetest", "a.yml"]), &config(&[]));
        assert_eq!(merged, args(&["pipetest", "a.yml"]));
    }

    #[test]
    fn test_merge_prepends_flags() {
        let merged = merge_default_options(
            args(&["pipetest", "--debug", "a.yml"]),
            &config(&["--workers", "4", "--no-color"]),
        );
        assert_eq!(merged, args(&["pipetest", "--workers", "4", "--no-color", "--debug", "a.yml"]));
    }

    #[test]
    fn test_merge_drops_positionals() {
        let merged = merge_default_options(args(&["pipetest", "a.yml"]), &config(&["other.yml", "--no-color"]));
        assert_eq!(merged, args(&["pipetest", "--no-color", "a.yml"]));
    }

    #[test]
    fn test_command_line_overrides_config() {
        let merged = merge_default_options(
            args(&["pipetest", "--workers", "8", "a.yml"]),
            &config(&["--workers", "2"]),
        );
        let parsed = Args::try_parse_from(&merged).unwrap();
        assert_eq!(parsed.workers, Some(8));
    }
}
