//! Error types shared by the transport surface and identity parsing.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors a [`Transport`](crate::Transport) implementation can report.
///
/// The split between [`NoResponders`](TransportError::NoResponders) and
/// everything else matters: only the former is treated as transient by the
/// acknowledged delivery path.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// A request found nobody subscribed to its subject.
    #[error("no responders available for request on '{subject}'")]
    NoResponders {
        /// The subject the request was sent to.
        subject: String,
    },

    /// A request got no reply within its timeout.
    #[error("request on '{subject}' timed out")]
    Timeout {
        /// The subject the request was sent to.
        subject: String,
    },

    /// Tried to answer a message that carries no reply subject.
    #[error("message on '{subject}' has no reply subject")]
    NoReplySubject {
        /// The subject of the message that could not be answered.
        subject: String,
    },

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// Subscribing to a subject failed.
    #[error("failed to subscribe to '{subject}': {reason}")]
    SubscribeFailed {
        /// The subject that could not be subscribed.
        subject: String,
        /// Reason for failure.
        reason: String,
    },

    /// Any other delivery failure.
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` for the transient "nobody is listening yet" condition.
    pub fn is_no_responders(&self) -> bool {
        matches!(self, Self::NoResponders { .. })
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(err.to_string())
    }
}

// =============================================================================
// Identity Errors
// =============================================================================

/// Errors raised while parsing a configured plugin id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The plugin id is empty.
    #[error("plugin id must not be empty")]
    Empty,

    /// A `bin.*.` id without a usable uuid segment.
    #[error("gateway plugin id '{0}' has no uuid segment")]
    MissingUuid(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
