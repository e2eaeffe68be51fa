//! # Logging
//!
//! Installs the `tracing` subscriber.

use crate::constants::DEFAULT_LOG_FILTER;
use tracing::warn;

/// Install the fmt subscriber with an `EnvFilter`
///
/// `RUST_LOG` overrides the default filter. Calling this twice is harmless: the
/// second call only logs a warning.
pub fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .try_init()
    {
        warn!("Tracing subscriber already initialized: {}", e);
    }
}
