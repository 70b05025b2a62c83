//! Pub/sub transport abstraction.
//!
//! The coordinator only needs four primitives from the broker: subscribe with
//! a callback, fire-and-forget publish, request/reply with a timeout, and a
//! flush that confirms earlier publishes have left the process. Connection
//! management, credentials and delivery guarantees belong to the
//! implementation.
//!
//! ```rust,ignore
//! let sub = transport
//!     .subscribe(
//!         "soren.cpu.widgets-svc.resize",
//!         message_handler(|msg| async move { println!("{}", msg.subject) }),
//!     )
//!     .await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::TransportResult;

/// Message headers.
pub type Headers = HashMap<String, String>;

// =============================================================================
// Message
// =============================================================================

/// A message travelling through the transport, in either direction.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Subject the message was published on.
    pub subject: String,
    /// Subject a reply should be published to, if the sender expects one.
    pub reply: Option<String>,
    /// Message headers.
    pub headers: Headers,
    /// Raw payload.
    pub payload: Vec<u8>,
}

impl Message {
    /// Creates a message without reply subject or headers.
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            reply: None,
            headers: Headers::new(),
            payload: payload.into(),
        }
    }

    /// Sets the reply subject.
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Decodes the payload as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("subject", &self.subject)
            .field("reply", &self.reply)
            .field("headers", &self.headers)
            .field("payload", &String::from_utf8_lossy(&self.payload))
            .finish()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// Callback invoked for every message delivered to a subscription.
///
/// Implementations may invoke the callback concurrently for different
/// messages.
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wraps an async closure as a [`MessageHandler`].
pub fn message_handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| -> BoxFuture<'static, ()> { f(msg).boxed() })
}

/// Handle to a live subscription.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    subject: String,
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a handle that runs `unsubscribe` when dropped.
    pub fn new(
        subject: impl Into<String>,
        unsubscribe: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            subject: subject.into(),
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Creates a handle with nothing to clean up.
    pub fn detached(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            unsubscribe: None,
        }
    }

    /// The subscribed subject (possibly containing wildcards).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Unsubscribes immediately.
    pub fn unsubscribe(mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsubscribe.take() {
            f();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subject", &self.subject)
            .finish()
    }
}

// =============================================================================
// Transport
// =============================================================================

/// The pub/sub surface the coordinator depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Subscribes `handler` to `subject`.
    ///
    /// `*` matches exactly one segment, `>` matches one or more trailing
    /// segments.
    async fn subscribe(&self, subject: &str, handler: MessageHandler)
    -> TransportResult<Subscription>;

    /// Publishes a message without waiting for any acknowledgement.
    async fn publish(&self, message: Message) -> TransportResult<()>;

    /// Sends a request and waits up to `timeout` for the first reply.
    ///
    /// Fails with [`TransportError::NoResponders`](crate::TransportError::NoResponders)
    /// when nobody is subscribed, and
    /// [`TransportError::Timeout`](crate::TransportError::Timeout) when no
    /// reply arrives in time.
    async fn request(&self, message: Message, timeout: Duration) -> TransportResult<Message>;

    /// Completes once all previously published messages have left the process.
    async fn flush(&self) -> TransportResult<()>;
}

/// Shared transport handle.
pub type BoxedTransport = Arc<dyn Transport>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_unsubscribes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = Subscription::new("soren.v2.x.@intro", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(sub.subject(), "soren.v2.x.@intro");
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_unsubscribes_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        {
            let _sub = Subscription::new("a.b", move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_message_handler_adapts_closure() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handler = message_handler(move |msg: Message| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(msg.payload.len(), Ordering::SeqCst);
            }
        });

        handler(Message::new("a.b", b"abc".to_vec())).await;
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_message_json() {
        let msg = Message::new("a.b", br#"{"jobId":"j"}"#.to_vec()).with_reply("_INBOX.1");
        let body: serde_json::Value = msg.json().unwrap();
        assert_eq!(body["jobId"], "j");
        assert_eq!(msg.reply.as_deref(), Some("_INBOX.1"));
    }
}
