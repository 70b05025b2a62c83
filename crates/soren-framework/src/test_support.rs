//! Scripted transport for failure injection in unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use soren_core::{
    Message, MessageHandler, PluginIdentity, Subscription, Transport, TransportError,
    TransportResult,
};
use tokio::time::Instant;

use crate::context::{EventSettings, SorenContext};

#[derive(Default)]
struct State {
    published: Vec<Message>,
    requests: Vec<(Instant, Message)>,
    responses: VecDeque<TransportResult<Message>>,
    publish_error: Option<TransportError>,
    failing_subjects: HashSet<String>,
    subscribed: Vec<String>,
    flushes: usize,
}

/// Records every call and answers requests from a script.
///
/// Requests beyond the script are acknowledged with `{}`.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_response(&self, response: TransportResult<Message>) {
        self.state.lock().responses.push_back(response);
    }

    pub(crate) fn push_error_times(&self, error: TransportError, times: usize) {
        let mut state = self.state.lock();
        for _ in 0..times {
            state.responses.push_back(Err(error.clone()));
        }
    }

    pub(crate) fn fail_publishes(&self, error: TransportError) {
        self.state.lock().publish_error = Some(error);
    }

    pub(crate) fn fail_subscribe(&self, subject: &str) {
        self.state.lock().failing_subjects.insert(subject.to_string());
    }

    pub(crate) fn published(&self) -> Vec<Message> {
        self.state.lock().published.clone()
    }

    pub(crate) fn requests(&self) -> Vec<Message> {
        self.state
            .lock()
            .requests
            .iter()
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub(crate) fn request_times(&self) -> Vec<Instant> {
        self.state.lock().requests.iter().map(|(at, _)| *at).collect()
    }

    pub(crate) fn subscribed(&self) -> Vec<String> {
        self.state.lock().subscribed.clone()
    }

    pub(crate) fn flushes(&self) -> usize {
        self.state.lock().flushes
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn subscribe(
        &self,
        subject: &str,
        _handler: MessageHandler,
    ) -> TransportResult<Subscription> {
        let mut state = self.state.lock();
        if state.failing_subjects.contains(subject) {
            return Err(TransportError::SubscribeFailed {
                subject: subject.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.subscribed.push(subject.to_string());
        Ok(Subscription::detached(subject))
    }

    async fn publish(&self, message: Message) -> TransportResult<()> {
        let mut state = self.state.lock();
        if let Some(error) = &state.publish_error {
            return Err(error.clone());
        }
        state.published.push(message);
        Ok(())
    }

    async fn request(&self, message: Message, _timeout: Duration) -> TransportResult<Message> {
        let mut state = self.state.lock();
        state.requests.push((Instant::now(), message));
        state
            .responses
            .pop_front()
            .unwrap_or_else(|| Ok(Message::new("_INBOX.ack", b"{}".to_vec())))
    }

    async fn flush(&self) -> TransportResult<()> {
        self.state.lock().flushes += 1;
        Ok(())
    }
}

pub(crate) fn standalone_context(transport: &ScriptedTransport, id: &str) -> Arc<SorenContext> {
    SorenContext::builder(
        Arc::new(transport.clone()),
        PluginIdentity::standalone(id),
    )
    .with_events(EventSettings::new("ops-events", "secret"))
    .build()
}

pub(crate) fn gateway_context(transport: &ScriptedTransport, uuid: &str) -> Arc<SorenContext> {
    SorenContext::builder(Arc::new(transport.clone()), PluginIdentity::gateway(uuid))
        .with_events(EventSettings::new("ops-events", "secret"))
        .build()
}
