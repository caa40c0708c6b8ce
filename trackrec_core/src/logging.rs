//! Logging setup shared by the trackrec binaries.
//!
//! Log lines go to stderr so that command output on stdout (status lines,
//! exported file paths) can be piped without noise.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Level used when neither `RUST_LOG` nor a verbosity flag says otherwise
pub const DEFAULT_LEVEL: &str = "info";

/// Initialize logging with the default level
pub fn init() {
    init_with_level(DEFAULT_LEVEL)
}

/// Map `-q` / `-v` style flags to a filter directive
///
/// `quiet` wins over any number of `-v`.
pub fn level_for(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "warn";
    }
    match verbose {
        0 => DEFAULT_LEVEL,
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize logging with a specific default level
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Initialize logging for tests (captured by the test harness)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
