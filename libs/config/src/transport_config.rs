//! Transport Configuration Module
//!
//! Loads [`TransportConfig`] from a TOML file with environment-variable
//! overrides. Every field has a default, so an empty file (or no file at all)
//! yields a usable configuration.
//!
//! Environment overrides use the `ISOLATE_` prefix and `__` between nested
//! keys, e.g. `ISOLATE_LIMITS__MAX_NESTING_DEPTH=128`.

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::limits::{CodecLimits, MAX_CONTAINER_LENGTH};
use crate::logging::LoggingConfig;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "ISOLATE";

/// Rejected configuration values
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("Transport configuration already initialized")]
    AlreadyInitialized,
}

/// Top-level configuration of the transport
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub limits: CodecLimits,
    pub ports: PortSettings,
    pub logging: LoggingConfig,
}

/// Port layer settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PortSettings {
    /// Worker threads serving one concurrent native port (default: 4)
    pub native_port_workers: usize,
    /// Prefix for consumer thread names (default: "isolate-port")
    pub thread_name_prefix: String,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            native_port_workers: 4,
            thread_name_prefix: "isolate-port".to_string(),
        }
    }
}

impl TransportConfig {
    /// Load configuration from a TOML file with `ISOLATE_` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Same as [`TransportConfig::load`] with a custom environment prefix
    pub fn load_with_env_prefix(path: impl AsRef<Path>, prefix: &str) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading transport config: {:?}", path);

        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let parsed: TransportConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        parsed
            .validate()
            .with_context(|| format!("Invalid configuration in {:?}", path))?;
        debug!(?parsed, "transport config loaded");
        Ok(parsed)
    }

    /// Parse configuration from TOML text, without environment overrides
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .context("Failed to parse configuration")?;
        let parsed: TransportConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Render as TOML, e.g. to write out a default file
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let limits = &self.limits;
        if limits.max_container_length == 0 || limits.max_container_length > MAX_CONTAINER_LENGTH
        {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_container_length",
                value: limits.max_container_length.to_string(),
                reason: "must be between 1 and the compiled-in maximum",
            });
        }
        if limits.max_nesting_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_nesting_depth",
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }
        if limits.max_message_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limits.max_message_bytes",
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }
        if self.ports.native_port_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ports.native_port_workers",
                value: "0".to_string(),
                reason: "a concurrent port needs at least one worker",
            });
        }
        Ok(())
    }
}
