//! In-process pub/sub broker.
//!
//! [`LocalBus`] implements [`Transport`] entirely in memory with the same
//! observable behaviour the coordinator relies on from a real broker:
//!
//! - every matching subscription receives a copy of a published message,
//!   each delivered on its own tokio task,
//! - requests get a private inbox subject and resolve with the first reply,
//! - a request with no matching subscription fails fast with
//!   [`TransportError::NoResponders`].
//!
//! ```rust,ignore
//! let bus = LocalBus::new();
//! let _sub = bus.subscribe("svc.echo", handler).await?;
//! let reply = bus.request(Message::new("svc.echo", b"hi".to_vec()), Duration::from_secs(1)).await?;
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, trace};

use soren_core::{Message, MessageHandler, Subscription, Transport, TransportError, TransportResult};

use crate::pattern::subject_matches;

/// Prefix of reply subjects created by [`LocalBus::request`].
const INBOX_PREFIX: &str = "_INBOX";

struct SubscriptionEntry {
    pattern: String,
    handler: MessageHandler,
}

#[derive(Default)]
struct BusInner {
    subscriptions: RwLock<HashMap<u64, SubscriptionEntry>>,
    /// Pending requests: inbox subject → waiting caller.
    inboxes: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl BusInner {
    fn matching_handlers(&self, subject: &str) -> Vec<MessageHandler> {
        self.subscriptions
            .read()
            .values()
            .filter(|entry| subject_matches(&entry.pattern, subject))
            .map(|entry| Arc::clone(&entry.handler))
            .collect()
    }

    fn ensure_open(&self) -> TransportResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

/// An in-memory [`Transport`].
///
/// Cloning is cheap; clones share the same broker.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.read().len()
    }

    /// Returns `true` if at least one subscription matches `subject`.
    pub fn has_subscriber(&self, subject: &str) -> bool {
        !self.inner.matching_handlers(subject).is_empty()
    }

    /// Closes the bus.
    ///
    /// All subscriptions are dropped and pending requests fail.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.subscriptions.write().clear();
        self.inner.inboxes.lock().clear();
        debug!("Local bus closed");
    }

    fn deliver(&self, message: Message) {
        if let Some(waiter) = self.inner.inboxes.lock().remove(&message.subject) {
            trace!(subject = %message.subject, "Routing reply to pending request");
            let _ = waiter.send(message);
            return;
        }

        let handlers = self.inner.matching_handlers(&message.subject);
        trace!(subject = %message.subject, receivers = handlers.len(), "Publishing message");

        for handler in handlers {
            let message = message.clone();
            tokio::spawn(async move { handler(message).await });
        }
    }
}

#[async_trait]
impl Transport for LocalBus {
    async fn subscribe(
        &self,
        subject: &str,
        handler: MessageHandler,
    ) -> TransportResult<Subscription> {
        self.inner.ensure_open()?;
        if subject.is_empty() || subject.split('.').any(str::is_empty) {
            return Err(TransportError::SubscribeFailed {
                subject: subject.to_string(),
                reason: "invalid subject".to_string(),
            });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.subscriptions.write().insert(
            id,
            SubscriptionEntry {
                pattern: subject.to_string(),
                handler,
            },
        );
        debug!(subject = %subject, id, "Subscribed");

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        Ok(Subscription::new(subject, move || {
            if let Some(inner) = weak.upgrade() {
                inner.subscriptions.write().remove(&id);
            }
        }))
    }

    async fn publish(&self, message: Message) -> TransportResult<()> {
        self.inner.ensure_open()?;
        self.deliver(message);
        Ok(())
    }

    async fn request(&self, message: Message, wait: Duration) -> TransportResult<Message> {
        self.inner.ensure_open()?;
        let subject = message.subject.clone();

        if self.inner.matching_handlers(&subject).is_empty() {
            return Err(TransportError::NoResponders { subject });
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let inbox = format!("{INBOX_PREFIX}.{id}");

        // Register before publishing so a fast responder cannot be missed.
        let (tx, rx) = oneshot::channel();
        self.inner.inboxes.lock().insert(inbox.clone(), tx);

        self.deliver(message.with_reply(inbox.clone()));

        match timeout(wait, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.inner.inboxes.lock().remove(&inbox);
                Err(TransportError::Timeout { subject })
            }
        }
    }

    async fn flush(&self) -> TransportResult<()> {
        // Publishes are handed to their receivers synchronously.
        self.inner.ensure_open()
    }
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soren_core::message_handler;
    use tokio::sync::mpsc;

    fn forward_to(tx: mpsc::UnboundedSender<Message>) -> MessageHandler {
        message_handler(move |msg| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(msg);
            }
        })
    }

    fn echo_responder(bus: LocalBus) -> MessageHandler {
        message_handler(move |msg: Message| {
            let bus = bus.clone();
            async move {
                if let Some(reply) = msg.reply {
                    let _ = bus.publish(Message::new(reply, msg.payload)).await;
                }
            }
        })
    }

    #[tokio::test]
    async fn test_publish_reaches_wildcard_subscriber() {
        let bus = LocalBus::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = bus
            .subscribe("soren.v2.bin.*.abc123.resize", forward_to(tx))
            .await
            .unwrap();

        bus.publish(Message::new("soren.v2.bin.tenant-9.abc123.resize", b"{}".to_vec()))
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.subject, "soren.v2.bin.tenant-9.abc123.resize");
    }

    #[tokio::test]
    async fn test_request_reply() {
        let bus = LocalBus::new();
        let _sub = bus
            .subscribe("svc.echo", echo_responder(bus.clone()))
            .await
            .unwrap();

        let reply = bus
            .request(
                Message::new("svc.echo", b"ping".to_vec()),
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert_eq!(reply.payload, b"ping");
    }

    #[tokio::test]
    async fn test_request_without_subscriber_has_no_responders() {
        let bus = LocalBus::new();
        let err = bus
            .request(Message::new("svc.none", Vec::new()), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_no_responders());
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_times_out_when_nobody_replies() {
        let bus = LocalBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let _sub = bus.subscribe("svc.silent", forward_to(tx)).await.unwrap();

        let err = bus
            .request(Message::new("svc.silent", Vec::new()), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let bus = LocalBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let sub = bus.subscribe("a.b", forward_to(tx)).await.unwrap();
        assert!(bus.has_subscriber("a.b"));

        drop(sub);
        assert!(!bus.has_subscriber("a.b"));
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_bus_rejects_operations() {
        let bus = LocalBus::new();
        bus.close();
        assert!(matches!(
            bus.publish(Message::new("a", Vec::new())).await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(bus.flush().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_invalid_subject_is_rejected() {
        let bus = LocalBus::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = bus.subscribe("a..b", forward_to(tx)).await.unwrap_err();
        assert!(matches!(err, TransportError::SubscribeFailed { .. }));
    }
}
