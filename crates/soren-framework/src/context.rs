//! Shared coordinator state.
//!
//! One [`SorenContext`] exists per plugin identity. It is handed around as an
//! `Arc` to every component that needs the transport, the identity or the
//! job context registry:
//!
//! ```text
//!                  ┌──────────────── SorenContext ────────────────┐
//!                  │ transport · identity · job contexts · policy │
//!                  └──────────────────────────────────────────────┘
//!                     ▲            ▲             ▲            ▲
//!          ActionDispatcher   JobLifecycle  ProgressReporter  EventEmitter
//! ```
//!
//! The job context registry is injected rather than reached through a global,
//! so tests can run isolated instances side by side.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use soren_core::{BoxedTransport, Message, PluginIdentity, TransportError};

use crate::delivery::DeliveryConfig;
use crate::error::SdkResult;
use crate::events::EventEmitter;
use crate::jobs::JobLifecycle;
use crate::progress::ProgressReporter;
use crate::registry::{CompletedJobs, DEFAULT_COMPLETED_CAPACITY, JobContextRegistry};

// =============================================================================
// EventSettings
// =============================================================================

/// Where operational events go.
///
/// Event emission is a no-op unless both fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSettings {
    /// Operational event channel name.
    pub channel: Option<String>,
    /// Value of the `Authorization` header sent with every event.
    pub auth_key: Option<String>,
}

impl EventSettings {
    pub fn new(channel: impl Into<String>, auth_key: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            auth_key: Some(auth_key.into()),
        }
    }

    /// Returns the channel and key when both are present and non-empty.
    pub fn resolved(&self) -> Option<(&str, &str)> {
        let channel = self.channel.as_deref().filter(|c| !c.is_empty())?;
        let auth_key = self.auth_key.as_deref().filter(|k| !k.is_empty())?;
        Some((channel, auth_key))
    }
}

// =============================================================================
// SorenContext
// =============================================================================

/// Everything a plugin's coordinator components share.
pub struct SorenContext {
    transport: BoxedTransport,
    identity: PluginIdentity,
    job_contexts: Arc<JobContextRegistry>,
    completed_jobs: CompletedJobs,
    events: EventSettings,
    delivery: DeliveryConfig,
}

impl SorenContext {
    /// Starts building a context for `identity` on `transport`.
    pub fn builder(transport: BoxedTransport, identity: PluginIdentity) -> SorenContextBuilder {
        SorenContextBuilder {
            transport,
            identity,
            job_contexts: None,
            completed_capacity: DEFAULT_COMPLETED_CAPACITY,
            events: EventSettings::default(),
            delivery: DeliveryConfig::default(),
        }
    }

    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    /// The configured plugin id.
    pub fn plugin_id(&self) -> Cow<'_, str> {
        self.identity.as_str()
    }

    /// The job id → entity id bindings of gateway-routed jobs.
    pub fn job_contexts(&self) -> &Arc<JobContextRegistry> {
        &self.job_contexts
    }

    /// Entities of recently completed gateway jobs.
    pub fn completed_jobs(&self) -> &CompletedJobs {
        &self.completed_jobs
    }

    pub fn events(&self) -> &EventSettings {
        &self.events
    }

    pub fn delivery(&self) -> &DeliveryConfig {
        &self.delivery
    }

    /// Job accept/reject/release operations bound to this context.
    pub fn lifecycle(self: &Arc<Self>) -> JobLifecycle {
        JobLifecycle::new(Arc::clone(self))
    }

    /// Progress and completion reporting bound to this context.
    pub fn reporter(self: &Arc<Self>) -> ProgressReporter {
        ProgressReporter::new(Arc::clone(self))
    }

    /// Operational event emission bound to this context.
    pub fn emitter(self: &Arc<Self>) -> EventEmitter {
        EventEmitter::new(Arc::clone(self))
    }

    /// Publishes `payload` to the reply subject of `message`.
    pub(crate) async fn reply(&self, message: &Message, payload: Vec<u8>) -> SdkResult<()> {
        let reply = message
            .reply
            .as_deref()
            .ok_or_else(|| TransportError::NoReplySubject {
                subject: message.subject.clone(),
            })?;
        self.transport.publish(Message::new(reply, payload)).await?;
        Ok(())
    }
}

impl fmt::Debug for SorenContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SorenContext")
            .field("identity", &self.identity)
            .field("events", &self.events)
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SorenContext`].
pub struct SorenContextBuilder {
    transport: BoxedTransport,
    identity: PluginIdentity,
    job_contexts: Option<Arc<JobContextRegistry>>,
    completed_capacity: usize,
    events: EventSettings,
    delivery: DeliveryConfig,
}

impl SorenContextBuilder {
    /// Uses `registry` for job bindings instead of a fresh, private one.
    pub fn with_job_contexts(mut self, registry: Arc<JobContextRegistry>) -> Self {
        self.job_contexts = Some(registry);
        self
    }

    /// How many completed gateway jobs keep their route for repeated
    /// completions.
    pub fn with_completed_capacity(mut self, capacity: usize) -> Self {
        self.completed_capacity = capacity;
        self
    }

    pub fn with_events(mut self, events: EventSettings) -> Self {
        self.events = events;
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn build(self) -> Arc<SorenContext> {
        Arc::new(SorenContext {
            transport: self.transport,
            identity: self.identity,
            job_contexts: self.job_contexts.unwrap_or_default(),
            completed_jobs: CompletedJobs::new(self.completed_capacity),
            events: self.events,
            delivery: self.delivery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soren_transport::LocalBus;

    #[test]
    fn test_event_settings_require_both_fields() {
        assert!(EventSettings::default().resolved().is_none());
        assert!(
            EventSettings {
                channel: Some("ops".into()),
                auth_key: None,
            }
            .resolved()
            .is_none()
        );
        assert!(EventSettings::new("ops", "").resolved().is_none());
        assert_eq!(
            EventSettings::new("ops", "secret").resolved(),
            Some(("ops", "secret"))
        );
    }

    #[tokio::test]
    async fn test_reply_without_reply_subject_fails() {
        let ctx = SorenContext::builder(
            Arc::new(LocalBus::new()),
            PluginIdentity::standalone("widgets-svc"),
        )
        .build();

        let err = ctx
            .reply(&Message::new("soren.cpu.widgets-svc.resize", Vec::new()), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SdkError::Transport(TransportError::NoReplySubject { .. })
        ));
    }

    #[test]
    fn test_contexts_get_private_registries_by_default() {
        let bus: BoxedTransport = Arc::new(LocalBus::new());
        let a = SorenContext::builder(Arc::clone(&bus), PluginIdentity::gateway("a")).build();
        let b = SorenContext::builder(bus, PluginIdentity::gateway("b")).build();
        assert!(!Arc::ptr_eq(a.job_contexts(), b.job_contexts()));
    }
}
