//! Exit status codes for the CLI
//!
//! - 0: every step ran and no stopping rule set failed
//! - 1: document/reference errors and other fatal errors
//! - 10: a failing rule set with `stop` enabled halted the run
//! - 130: user interrupted (Ctrl+C, standard SIGINT exit code)

use std::process::{ExitCode, Termination};

/// Exit code for a run halted by a failing rule set
pub const EXIT_RULE_FAILED: u8 = 10;

/// Exit status codes following standard Unix conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitStatus {
    /// Clean run
    Success = 0,
    /// Document error or any other fatal error
    Error = 1,
    /// Run-wide stop triggered by a failed rule set
    RuleFailed = EXIT_RULE_FAILED,
    /// User interrupted (Ctrl+C) - standard SIGINT code
    Interrupted = 130,
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status as u8)
    }
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_values() {
        assert_eq!(ExitStatus::RuleFailed as u8, EXIT_RULE_FAILED);
        assert_eq!(ExitStatus::Interrupted as u8, 130);
    }
}
