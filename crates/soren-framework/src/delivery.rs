//! Delivery policies for job updates.
//!
//! Two policies exist and each class of update is bound to exactly one of
//! them through [`DeliveryConfig`]:
//!
//! | Class | Default | Behaviour |
//! |-------|---------|-----------|
//! | intermediate progress (`< 100`) | [`BestEffort`](DeliveryMode::BestEffort) | publish once, no acknowledgement |
//! | completion (`100`, `done`) | [`Acknowledged`](DeliveryMode::Acknowledged) | request with timeout, retry on "no responders", then flush |
//!
//! The acknowledged schedule with the default [`RetryPolicy`]:
//!
//! ```text
//! attempt 1 ──fail──▶ sleep 1s ──▶ attempt 2 ──fail──▶ sleep 2s ──▶ … attempt 5 ──fail──▶ sleep 5s ──▶ DeliveryExhausted
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use soren_core::{JobProgress, Message};

/// How an update is handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Fire-and-forget publish.
    BestEffort,
    /// Request/reply with retries on "no responders".
    Acknowledged,
}

/// Retry schedule of acknowledged delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff unit; the sleep after attempt `n` (0-indexed) is `step × (n + 1)`.
    pub step: Duration,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            step: Duration::from_secs(1),
            timeout: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// Sleep that follows the failed attempt `attempt` (0-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt.saturating_add(1))
    }

    /// Sum of all sleeps of a fully exhausted schedule.
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_attempts).map(|attempt| self.delay(attempt)).sum()
    }
}

/// Delivery policy per class of update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Policy for intermediate progress updates.
    pub progress: DeliveryMode,
    /// Policy for updates that report 100 %.
    pub completion: DeliveryMode,
    /// Schedule used by [`DeliveryMode::Acknowledged`].
    pub retry: RetryPolicy,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            progress: DeliveryMode::BestEffort,
            completion: DeliveryMode::Acknowledged,
            retry: RetryPolicy::default(),
        }
    }
}

impl DeliveryConfig {
    /// Policy for updates of the given completion state.
    pub fn mode_for(&self, complete: bool) -> DeliveryMode {
        if complete {
            self.completion
        } else {
            self.progress
        }
    }

    /// Policy for a progress payload.
    pub fn mode_for_progress(&self, payload: &JobProgress) -> DeliveryMode {
        self.mode_for(payload.is_complete())
    }
}

/// Outcome of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport; nobody confirmed receipt.
    Published,
    /// Confirmed by the agent with this reply.
    Acknowledged(Message),
    /// Nothing sent: a completion for a job whose route was already released.
    Skipped,
}

impl Delivery {
    /// The agent's reply, if the update was acknowledged.
    pub fn reply(&self) -> Option<&Message> {
        match self {
            Self::Acknowledged(reply) => Some(reply),
            Self::Published | Self::Skipped => None,
        }
    }
}
