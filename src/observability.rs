//! Tracing initialization.
//!
//! Logs go to stderr so stdout stays clean for JSON and Markdown output.
//! `CONTENTGATE_LOG` takes an `EnvFilter` directive (default `contentgate=warn`);
//! `CONTENTGATE_LOG_JSON=1` switches to JSON lines.

use tracing_subscriber::{prelude::*, EnvFilter};

pub const ENV_LOG: &str = "CONTENTGATE_LOG";
pub const ENV_LOG_JSON: &str = "CONTENTGATE_LOG_JSON";

const DEFAULT_FILTER: &str = "contentgate=warn";

/// Initialize tracing. Call once at process startup; later calls are no-ops.
pub fn init_tracing(verbose: bool) {
    let directive = std::env::var(ENV_LOG).ok().filter(|v| !v.is_empty());
    let filter = match directive {
        Some(d) => EnvFilter::try_new(&d).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None if verbose => EnvFilter::new("contentgate=debug"),
        None => EnvFilter::new(DEFAULT_FILTER),
    };

    let json = std::env::var(ENV_LOG_JSON)
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let _ = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .try_init()
    };
}
