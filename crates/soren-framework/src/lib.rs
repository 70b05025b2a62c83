//! # Soren Framework
//!
//! The action-routing and job-lifecycle coordinator of a Soren plugin.
//!
//! ```text
//! Plugin::start ──▶ ActionDispatcher ──subscribe──▶ Transport
//!                                                      │ execute request
//!                                                      ▼
//!                                        RequestHandler(Request)
//!                                                      │ accept()
//!                                                      ▼
//!                     JobLifecycle ──bind job → entity──▶ JobContextRegistry
//!                                                      │ progress()/done()
//!                                                      ▼
//!                   ProgressReporter ──lookup binding, deliver, release
//! ```
//!
//! - [`SorenContext`] carries the transport, identity, job bindings and
//!   delivery policy shared by all components.
//! - [`Request`] is the single-use reply token user handlers receive.
//! - [`ProgressReporter`] publishes intermediate progress and delivers
//!   completion with acknowledgement and retries (see [`delivery`]).
//! - [`EventEmitter`] sends best-effort operational events.

pub mod action;
pub mod context;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod handler;
pub mod jobs;
pub mod plugin;
pub mod progress;
pub mod registry;
pub mod request;

#[cfg(test)]
mod test_support;

pub use action::Action;
pub use context::{EventSettings, SorenContext, SorenContextBuilder};
pub use delivery::{Delivery, DeliveryConfig, DeliveryMode, RetryPolicy};
pub use dispatcher::{
    ActionDispatcher, DEFAULT_SETTINGS_REPLY_TO, Declaration, Registration, StartupWarning,
};
pub use error::{SdkError, SdkResult};
pub use events::EventEmitter;
pub use handler::{HandlerOutcome, NOT_IMPLEMENTED, RequestHandler, handler_fn, not_implemented};
pub use jobs::JobLifecycle;
pub use plugin::Plugin;
pub use progress::ProgressReporter;
pub use registry::{
    CompletedJobs, DEFAULT_COMPLETED_CAPACITY, JobContextRegistry, PluginRegistry, job_contexts,
    plugin_registry,
};
pub use request::Request;

pub use tower::BoxError;
