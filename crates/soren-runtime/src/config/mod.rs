//! Configuration module for the Soren runtime.
//!
//! Connection, identity, event channel, logging and delivery settings are
//! loaded from layered sources (see [`loader`]) and checked by
//! [`validate_config`] before the SDK starts.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DeliverySettings, LogFormat, LogOutput, LogRotation, LoggingConfig, LoggingLevel,
    SorenConfig, SpanEventConfig,
};
pub use validation::validate_config;
