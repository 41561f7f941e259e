use pipetest::context::Environment;
use pipetest::status::ExitStatus;
use pipetest::{core, signals};

/// Entry point - installs the Ctrl+C handler and calls core::run()
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    if let Err(e) = signals::install() {
        eprintln!("Warning: cannot install Ctrl+C handler: {}", e);
    }

    let args: Vec<String> = std::env::args().collect();
    let status = core::run(args, Environment::init());

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }
    status
}
