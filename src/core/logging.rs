//! Diagnostic logging setup
//!
//! Logs go to stderr so command output on stdout stays pipeable. `RUST_LOG`
//! wins over the verbosity flags when set.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "linkcache=info";

/// Filter directive for the given verbosity flags
pub fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "linkcache=error"
    } else if verbose {
        "linkcache=debug"
    } else {
        DEFAULT_FILTER
    }
}

/// Install the global subscriber
///
/// Calling this twice is harmless; the second call is ignored.
pub fn init(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose, quiet)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .try_init();
}
