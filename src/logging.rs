//! Logging setup for the command-line tool.

use tracing_subscriber::{EnvFilter, fmt};

/// Default filter directive for a verbosity level.
///
/// `-q` silences everything but errors; each `-v` raises the level by one.
pub fn filter_directive(quiet: bool, verbosity: u8) -> &'static str {
    if quiet {
        return "pipertray=error";
    }
    match verbosity {
        0 => "pipertray=warn",
        1 => "pipertray=info",
        2 => "pipertray=debug",
        _ => "pipertray=trace",
    }
}

/// Initialize logging to stderr.
///
/// `RUST_LOG` takes precedence over the verbosity flags. Calling this more
/// than once keeps the first subscriber.
pub fn init_logging(quiet: bool, verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(quiet, verbosity)));
    let installed = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if installed.is_err() {
        tracing::debug!("logging already initialized");
    }
}
