//! Environment struct (terminal capabilities, debug switches)

/// Execution environment
#[derive(Debug, Clone)]
pub struct Environment {
    pub stdout_isatty: bool,
    pub stderr_isatty: bool,
    /// stdout can take ANSI colors
    pub colors: bool,
    /// `DEBUG` is set to something other than empty/`0`/`false`
    pub debug: bool,
    pub program_name: String,
}

impl Environment {
    /// Initialize the environment with Windows ANSI support
    pub fn init() -> Self {
        // crossterm enables virtual terminal processing on Windows 10+
        #[cfg(windows)]
        {
            let _ = crossterm::execute!(std::io::stdout(), crossterm::terminal::SetTitle("pipetest"));
        }

        Self::default()
    }

    /// Colors are used unless disabled on the command line or not supported
    pub fn use_colors(&self, no_color: bool) -> bool {
        self.colors && !no_color
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            stdout_isatty: atty::is(atty::Stream::Stdout),
            stderr_isatty: atty::is(atty::Stream::Stderr),
            colors: detect_color_support(),
            debug: debug_from_env(std::env::var("DEBUG").ok().as_deref()),
            program_name: "pipetest".to_string(),
        }
    }
}

/// Detect color support
fn detect_color_support() -> bool {
    if !atty::is(atty::Stream::Stdout) {
        return false;
    }

    // Check for NO_COLOR environment variable
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    !matches!(std::env::var("TERM").as_deref(), Ok("dumb"))
}

fn debug_from_env(value: Option<&str>) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        None => false,
        Some(v) => !(v.is_empty() || v == "0" || v == "false" || v == "no"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_from_env() {
        assert!(!debug_from_env(None));
        assert!(!debug_from_env(Some("")));
        assert!(!debug_from_env(Some("0")));
        assert!(!debug_from_env(Some("False")));
        assert!(debug_from_env(Some("1")));
        assert!(debug_from_env(Some("yes")));
    }

    #[test]
    fn test_no_color_flag_wins() {
        let env = Environment {
            stdout_isatty: true,
            stderr_isatty: true,
            colors: true,
            debug: false,
            program_name: "pipetest".to_string(),
        };
        assert!(env.use_colors(false));
        assert!(!env.use_colors(true));
    }
}
