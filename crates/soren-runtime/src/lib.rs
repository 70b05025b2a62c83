//! Soren Runtime - configuration, logging and bootstrap for Soren plugins.
//!
//! This crate provides:
//! - Layered configuration loading and validation ([`config`])
//! - Agent credential decoding ([`Credentials`])
//! - Logging setup over `tracing-subscriber` ([`logging`])
//! - The [`SorenSdk`] bootstrap owning the serving lifetime
//!
//! ```ignore
//! use std::sync::Arc;
//! use soren_runtime::SorenSdk;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sdk = Arc::new(SorenSdk::from_env(transport)?);
//!     let plugin = sdk.plugin();
//!     plugin.set_actions(actions());
//!
//!     sdk.shutdown_on_signal();
//!     plugin.start().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod sdk;

pub use config::{ConfigError, ConfigLoader, ConfigResult, LoggingConfig, SorenConfig};
pub use credentials::Credentials;
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, LoggingError, SpanEvents};
pub use sdk::SorenSdk;

// Re-export tracing for use by plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
