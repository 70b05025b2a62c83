//! # Soren Core
//!
//! The wire contract shared by every Soren plugin.
//!
//! This crate owns everything the external agent/gateway depends on byte for
//! byte, and nothing else:
//!
//! - **Identity**: [`PluginIdentity`] decides once, at construction, whether a
//!   plugin is addressed directly or through the gateway.
//! - **Subjects**: the [`subject`] module maps identities and operation names
//!   to transport subjects.
//! - **Payloads**: the JSON bodies exchanged with the agent ([`model`]).
//! - **Registry**: a small concurrent key/value store ([`Registry`]) used for
//!   plugin and job bookkeeping.
//! - **Transport**: the pub/sub surface the coordinator needs ([`Transport`]).
//!
//! ## Addressing Modes
//!
//! ```text
//! standalone  widgets-svc      soren.cpu.widgets-svc.resize
//!                              soren.cpu.widgets-svc.<job>.progress
//!
//! gateway     bin.*.abc123     soren.v2.bin.<entity>.abc123.resize
//!                              soren.v2.bin.<entity>.abc123.<job>.done
//! ```

pub mod error;
pub mod identity;
pub mod model;
pub mod registry;
pub mod subject;
pub mod transport;

pub use error::{IdentityError, TransportError, TransportResult};
pub use identity::PluginIdentity;
pub use model::{
    ActionDescriptor, ActionForm, ActionRequestContent, Command, EventType, Frame, Icon,
    JobBodyContent, JobId, JobProgress, JsonMap, LogLevel, PROGRESS_COMPLETE, PluginEvent,
    PluginIntro, Requirements, Settings,
};
pub use registry::Registry;
pub use transport::{
    BoxedTransport, Headers, Message, MessageHandler, Subscription, Transport, message_handler,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::identity::PluginIdentity;
    pub use super::model::*;
    pub use super::transport::{Message, Transport, message_handler};
}
