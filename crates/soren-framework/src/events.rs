//! Operational event emission.
//!
//! Events go to `<channel>.<pluginId>.log` (or `<channel>.log` for dotted
//! plugin ids) as a JSON array, with the configured key in the
//! `Authorization` header. The channel answers with a JSON object whose
//! `result` field must be `OK`.
//!
//! Emission is best-effort: without a channel and key every call is a
//! successful no-op, and callers are expected to log rather than propagate
//! failures.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use soren_core::subject::event_log_subject;
use soren_core::{EventType, JsonMap, LogLevel, Message, PluginEvent};
use tracing::{debug, trace};

use crate::context::SorenContext;
use crate::error::{SdkError, SdkResult};

/// Request timeout for event delivery.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Header carrying the event channel credential.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

const RESULT_OK: &str = "OK";

/// Sends structured events to the operational channel.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    ctx: Arc<SorenContext>,
}

impl EventEmitter {
    pub fn new(ctx: Arc<SorenContext>) -> Self {
        Self { ctx }
    }

    /// Whether events are actually sent.
    pub fn is_enabled(&self) -> bool {
        self.ctx.events().resolved().is_some()
    }

    /// Sends a log event. The source is prefixed with the plugin id.
    pub async fn log(
        &self,
        source: &str,
        level: LogLevel,
        message: impl Into<String>,
        details: JsonMap,
    ) -> SdkResult<()> {
        let event = PluginEvent {
            event: EventType::Log,
            level,
            source: format!("{} - {}", self.ctx.plugin_id(), source),
            message: message.into(),
            timestamp: unix_now(),
            details,
        };
        self.send_batch(std::slice::from_ref(&event)).await
    }

    /// Sends a custom event at `info` level.
    pub async fn emit_event(&self, event: EventType, details: JsonMap) -> SdkResult<()> {
        let event = PluginEvent {
            message: format!("Event: {event}"),
            event,
            level: LogLevel::Info,
            source: self.ctx.plugin_id().into_owned(),
            timestamp: unix_now(),
            details,
        };
        self.send_batch(std::slice::from_ref(&event)).await
    }

    /// Sends several events in one request.
    pub async fn send_batch(&self, events: &[PluginEvent]) -> SdkResult<()> {
        let Some((channel, auth_key)) = self.ctx.events().resolved() else {
            trace!(count = events.len(), "Event channel not configured, dropping events");
            return Ok(());
        };

        let subject = event_log_subject(channel, &self.ctx.plugin_id());
        let body = serde_json::to_vec(events)?;
        let message =
            Message::new(subject.as_str(), body).with_header(AUTHORIZATION_HEADER, auth_key);

        let reply = self
            .ctx
            .transport()
            .request(message, EVENT_TIMEOUT)
            .await?;
        check_reply(&subject, &reply)?;

        debug!(subject = %subject, count = events.len(), "Events delivered");
        Ok(())
    }
}

fn check_reply(subject: &str, reply: &Message) -> SdkResult<()> {
    let response: JsonMap =
        serde_json::from_slice(&reply.payload).map_err(|e| SdkError::InvalidResponse {
            subject: subject.to_string(),
            reason: e.to_string(),
        })?;

    match response.get("result") {
        Some(Value::String(result)) if result != RESULT_OK => {
            Err(SdkError::EventRejected(result.clone()))
        }
        _ => Ok(()),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
