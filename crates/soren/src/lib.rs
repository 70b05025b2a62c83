//! # Soren
//!
//! SDK for plugins that offer actions to the Soren agent, either directly
//! or through the multi-tenant gateway.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  configure  ┌──────────┐  plugin()  ┌────────┐  subscribe  ┌───────────┐
//! │ SorenConfig│────────────▶│ SorenSdk │───────────▶│ Plugin │────────────▶│ Transport │
//! └────────────┘             └──────────┘            └────────┘             └───────────┘
//!                                                        │ Request
//!                                                        ▼
//!                                     accept ─▶ progress ─▶ done (acknowledged)
//! ```
//!
//! - **soren-core**: identities, subject names, payloads and the [`Transport`](core::Transport) trait
//! - **soren-framework**: action routing, the job lifecycle and progress delivery
//! - **soren-runtime**: configuration, logging and the [`SorenSdk`](runtime::SorenSdk) bootstrap
//! - **soren-transport**: the in-process [`LocalBus`](transport::LocalBus)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use soren::prelude::*;
//!
//! async fn resize(req: Request) -> Result<(), SdkError> {
//!     let plugin = plugin_registry().first().expect("plugin registered");
//!     let job = req.accept().await?;
//!     plugin.progress(&job, Command::Progress, &JobProgress::new(50)).await?;
//!     plugin.done(&job, JsonMap::new()).await?;
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sdk = Arc::new(SorenSdk::from_env(transport)?);
//!     let plugin = sdk.plugin();
//!     plugin.set_actions(vec![Action::new("resize", handler_fn(resize))]);
//!
//!     sdk.shutdown_on_signal();
//!     plugin.start().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: read `soren.toml`
//! - `yaml-config`: read `soren.yaml`
//! - `json-log`: JSON log lines in production

pub use soren_core as core;
pub use soren_framework as framework;
pub use soren_runtime as runtime;
pub use soren_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use std::sync::Arc;

    // Bootstrap
    pub use soren_runtime::{ConfigLoader, SorenConfig, SorenSdk};

    // Plugin surface
    pub use soren_framework::{
        Action, BoxError, Delivery, Plugin, Request, RequestHandler, SdkError, SdkResult,
        handler_fn, not_implemented, plugin_registry,
    };

    // Wire types
    pub use soren_core::{
        ActionForm, Command, EventType, JobId, JobProgress, JsonMap, LogLevel, Message,
        PluginIdentity, PluginIntro, Requirements, Settings, Transport,
    };

    pub use soren_transport::LocalBus;
}
