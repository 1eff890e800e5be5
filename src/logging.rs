//! Fallback console sink
//!
//! Failures inside the log engine are reported as `tracing` events. This module
//! installs a subscriber that prints them to stderr.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize stderr logging
///
/// `RUST_LOG` overrides `default_filter` when set.
pub fn init_console_logging(default_filter: &str) -> Result<()> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .context("Failed to initialize console logging")
}
