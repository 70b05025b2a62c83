//! Inbound request with a single-use reply.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use soren_core::{ActionRequestContent, JobId, Message, PluginIdentity};

use crate::context::SorenContext;
use crate::error::SdkResult;
use crate::events::EventEmitter;
use crate::progress::ProgressReporter;

/// An inbound message handed to a user handler, together with the right to
/// answer it.
///
/// Every answering method takes `self`, so a request is answered at most
/// once. Dropping it unanswered leaves the caller to time out.
pub struct Request {
    message: Message,
    ctx: Arc<SorenContext>,
}

impl Request {
    pub fn new(message: Message, ctx: Arc<SorenContext>) -> Self {
        Self { message, ctx }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// The subject the request arrived on.
    pub fn subject(&self) -> &str {
        &self.message.subject
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    /// Decodes the payload as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> SdkResult<T> {
        Ok(self.message.json()?)
    }

    /// Decodes the payload as an execute request body.
    pub fn content(&self) -> SdkResult<ActionRequestContent> {
        self.json()
    }

    /// Whether the sender waits for an answer.
    pub fn expects_reply(&self) -> bool {
        self.message.reply.is_some()
    }

    /// The caller's entity id, for requests routed through the gateway.
    pub fn entity(&self) -> Option<&str> {
        if self.ctx.identity().is_gateway() {
            PluginIdentity::entity_from_subject(&self.message.subject)
        } else {
            None
        }
    }

    pub fn context(&self) -> &Arc<SorenContext> {
        &self.ctx
    }

    /// Reporter for jobs accepted from this request.
    pub fn reporter(&self) -> ProgressReporter {
        self.ctx.reporter()
    }

    pub fn emitter(&self) -> EventEmitter {
        self.ctx.emitter()
    }

    /// Gives up the reply and returns the raw message.
    pub fn into_message(self) -> Message {
        self.message
    }

    // ─── Answers ────────────────────────────────────────────────────────────

    /// Answers with a raw payload.
    pub async fn respond(self, payload: impl Into<Vec<u8>>) -> SdkResult<()> {
        self.ctx.reply(&self.message, payload.into()).await
    }

    /// Answers with a JSON-encoded body.
    pub fn respond_json<T: Serialize + ?Sized>(
        self,
        body: &T,
    ) -> impl Future<Output = SdkResult<()>> + Send + use<T> {
        let payload = serde_json::to_vec(body);
        async move { self.respond(payload?).await }
    }

    /// Accepts the request as a new job and answers with its id.
    ///
    /// See [`JobLifecycle::accept`](crate::JobLifecycle::accept).
    pub async fn accept(self) -> SdkResult<JobId> {
        self.ctx.lifecycle().accept(&self.message).await
    }

    /// Refuses the request, answering with `{"details": {"error": detail}}`.
    pub fn reject<T: Serialize + ?Sized>(
        self,
        detail: &T,
    ) -> impl Future<Output = SdkResult<()>> + Send + use<T> {
        let detail = serde_json::to_value(detail);
        async move { self.ctx.lifecycle().reject(&self.message, detail?).await }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("message", &self.message)
            .field("plugin", &self.ctx.plugin_id())
            .finish()
    }
}
