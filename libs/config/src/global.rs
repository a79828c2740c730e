//! Process-global configuration slot

use once_cell::sync::{Lazy, OnceCell};
use tracing::info;

use crate::transport_config::{ConfigError, TransportConfig};

static CONFIG: OnceCell<TransportConfig> = OnceCell::new();
static DEFAULT_CONFIG: Lazy<TransportConfig> = Lazy::new(TransportConfig::default);

/// Install the process-wide configuration. Only the first call succeeds.
pub fn init(config: TransportConfig) -> Result<(), ConfigError> {
    config.validate()?;
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    info!("transport configuration initialized");
    Ok(())
}

/// The installed configuration, or the defaults when [`init`] has not run
pub fn global() -> &'static TransportConfig {
    CONFIG.get().unwrap_or(&DEFAULT_CONFIG)
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}
