//! Runtime error types.

use soren_framework::SdkError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while bootstrapping or running a plugin.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The coordinator failed.
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// Shutdown signal handlers could not be installed.
    #[error("Failed to listen for shutdown signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
