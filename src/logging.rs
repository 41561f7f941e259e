//! Structured logging to stderr

use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;

/// Filter from `RUST_LOG`, else `debug` in debug mode and `warn` otherwise
fn build_filter(debug: bool) -> EnvFilter {
    let fallback = if debug { "debug" } else { "warn" };
    std::env::var("RUST_LOG").map_or_else(
        |_| EnvFilter::new(fallback),
        |value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new(fallback)),
    )
}

/// Install the global subscriber; later calls are no-ops
pub fn init_logging(debug: bool, format: LogFormat, ansi: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(build_filter(debug))
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(ansi).try_init(),
    };
    if let Err(err) = result {
        tracing::debug!("logging already initialized: {}", err);
    }
}
