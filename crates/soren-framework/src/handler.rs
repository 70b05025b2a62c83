//! User handlers.
//!
//! Every inbound message that reaches user code goes through a
//! [`RequestHandler`]: a boxed, cloneable tower service taking a
//! [`Request`]. Plain async functions are adapted with [`handler_fn`]:
//!
//! ```rust,ignore
//! let resize = handler_fn(|req: Request| async move {
//!     let job = req.accept().await?;
//!     Ok::<_, SdkError>(())
//! });
//! ```
//!
//! Handlers run isolated: a returned error or a panic is logged together
//! with the plugin and subject, the message stays unanswered and serving
//! continues.

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Service, ServiceExt};
use tracing::{debug, error};

use crate::request::Request;

/// Reply sent from endpoints that have no handler.
pub const NOT_IMPLEMENTED: &[u8] = br#"{"status":"not implemented"}"#;

/// A type-erased request handler.
pub type RequestHandler = BoxCloneSyncService<Request, (), BoxError>;

// ============================================================================
// HandlerOutcome
// ============================================================================

/// Return types accepted from handler functions.
pub trait HandlerOutcome: Send + 'static {
    fn into_result(self) -> Result<(), BoxError>;
}

impl HandlerOutcome for () {
    fn into_result(self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl<E> HandlerOutcome for Result<(), E>
where
    E: Into<BoxError> + Send + 'static,
{
    fn into_result(self) -> Result<(), BoxError> {
        self.map_err(Into::into)
    }
}

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] calling an async function with the request.
pub struct HandlerService<F, R> {
    handler: F,
    _marker: PhantomData<fn() -> R>,
}

impl<F, R> HandlerService<F, R> {
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<F: Clone, R> Clone for HandlerService<F, R> {
    fn clone(&self) -> Self {
        Self::new(self.handler.clone())
    }
}

impl<F, Fut, R> Service<Request> for HandlerService<F, R>
where
    F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutcome,
{
    type Response = ();
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<(), BoxError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let fut = (self.handler)(request);
        async move { fut.await.into_result() }.boxed()
    }
}

/// Adapts an async function into a [`RequestHandler`].
pub fn handler_fn<F, Fut, R>(f: F) -> RequestHandler
where
    F: Fn(Request) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: HandlerOutcome,
{
    BoxCloneSyncService::new(HandlerService::new(f))
}

/// A handler answering every request with [`NOT_IMPLEMENTED`].
pub fn not_implemented() -> RequestHandler {
    handler_fn(|request: Request| async move { request.respond(NOT_IMPLEMENTED.to_vec()).await })
}

// ============================================================================
// Invocation
// ============================================================================

/// Runs `handler` on `request`, containing errors and panics.
pub(crate) async fn invoke(handler: RequestHandler, request: Request, plugin: &str) {
    let subject = request.subject().to_owned();

    match AssertUnwindSafe(handler.oneshot(request))
        .catch_unwind()
        .await
    {
        Ok(Ok(())) => debug!(plugin, subject = %subject, "Handler completed"),
        Ok(Err(e)) => error!(
            plugin,
            subject = %subject,
            error = %e,
            "Handler returned an error"
        ),
        Err(panic) => error!(
            plugin,
            subject = %subject,
            panic = panic_message(panic.as_ref()),
            "Handler panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
