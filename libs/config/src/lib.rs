//! # Transport Configuration
//!
//! Process-global flags for the isolate message transport. Every knob the
//! codec and the port layer consult lives here, set once at startup.
//!
//! ## Features
//!
//! - **Codec limits**: maximum container length, nesting depth and message size
//! - **Port settings**: worker threads for concurrent native ports, thread names
//! - **Logging**: level and output format for the tracing subscriber
//!
//! ## Usage
//!
//! ```rust,no_run
//! use transport_config::{init, global, TransportConfig};
//!
//! let config = TransportConfig::load("config/transport.toml").unwrap();
//! init(config).unwrap();
//!
//! let max = global().limits.max_container_length;
//! assert!(max > 0);
//! ```
//!
//! Anything that reads [`global`] before [`init`] runs sees the defaults.

mod global;
pub mod limits;
pub mod logging;
pub mod transport_config;

pub use global::{global, init, is_initialized};
pub use limits::{
    CodecLimits, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_NESTING_DEPTH, MAX_CONTAINER_LENGTH,
};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use transport_config::{ConfigError, PortSettings, TransportConfig};
