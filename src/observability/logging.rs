//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for the CLI
//! - Default to AppSec debug diagnostics, overridable through `RUST_LOG`
//!
//! # Design Decisions
//! - Logs go to stderr so resolved configuration on stdout stays parseable
//! - Initialization is idempotent; a second call is a no-op

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "appsec_config=info";

/// Install the global subscriber. `verbose` lowers the default to `debug`.
pub fn init_logging(verbose: bool) {
    let default = if verbose {
        "appsec_config=debug"
    } else {
        DEFAULT_DIRECTIVE
    };

    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}
