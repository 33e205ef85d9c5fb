//! Logging setup
//!
//! The filter is read from `KILN_LOG` (same syntax as `RUST_LOG`), falling
//! back to `warn`. Output goes to stderr so it never mixes with command
//! output.

use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the filter directives
pub const LOG_ENV: &str = "KILN_LOG";

static INIT: OnceCell<()> = OnceCell::new();

fn build_filter(verbose: bool) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directives) => EnvFilter::builder().parse_lossy(directives),
        Err(_) if verbose => EnvFilter::new("debug"),
        Err(_) => EnvFilter::new("warn"),
    }
}

/// Install the global subscriber. Later calls do nothing.
pub fn init(verbose: bool) {
    INIT.get_or_init(|| {
        // Another subscriber may already be installed by the host
        let _ = fmt()
            .with_env_filter(build_filter(verbose))
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    });
}
