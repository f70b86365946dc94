//! Tracing subscriber setup for binaries built on the entity store.

use tracing_subscriber::EnvFilter;

use crate::config::StoreConfig;

/// Installs a global `tracing-subscriber` fmt subscriber.
///
/// `RUST_LOG` takes precedence over [`StoreConfig::log_filter`].
///
/// # Errors
///
/// Returns an error if the filter directive does not parse or a global
/// subscriber is already installed.
pub fn init_tracing(config: &StoreConfig) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_filter)?,
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
