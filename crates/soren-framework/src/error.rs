//! Error types for the Soren coordinator.

use soren_core::TransportError;
use thiserror::Error;

/// Errors surfaced by plugin operations.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The transport rejected or failed an operation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A payload could not be encoded or decoded.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Acknowledged delivery gave up after repeated "no responders".
    #[error("delivery to '{subject}' failed after {attempts} attempts")]
    DeliveryExhausted {
        /// Subject of the undelivered update.
        subject: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A subscription required for serving could not be established.
    #[error("failed to subscribe to '{subject}': {source}")]
    Subscribe {
        /// The subject that could not be subscribed.
        subject: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// A progress update above 100 %.
    #[error("progress {0} is out of range 0..=100")]
    ProgressOutOfRange(u8),

    /// A gateway-hosted job has no entity to route its updates to.
    #[error("job '{job_id}' has no gateway route")]
    UnboundJob {
        /// The job that was reported on.
        job_id: String,
    },

    /// The event channel answered with something other than `OK`.
    #[error("event channel rejected the event: {0}")]
    EventRejected(String),

    /// A reply could not be interpreted.
    #[error("invalid response on '{subject}': {reason}")]
    InvalidResponse {
        /// Subject the request was sent to.
        subject: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl SdkError {
    /// Returns `true` if the failure came from the transport's "no
    /// responders" condition, either directly or after retries.
    pub fn is_no_responders(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_no_responders(),
            Self::DeliveryExhausted { .. } => true,
            _ => false,
        }
    }
}

/// Result type for coordinator operations.
pub type SdkResult<T> = Result<T, SdkError>;
