//! SDK bootstrap.
//!
//! [`SorenSdk`] turns a validated [`SorenConfig`] and a connected transport
//! into plugins that serve until the SDK is closed:
//!
//! ```rust,ignore
//! let sdk = SorenSdk::from_env(Arc::new(bus))?;
//! let plugin = sdk.plugin();
//! plugin.set_actions(vec![resize]);
//!
//! sdk.shutdown_on_signal();
//! plugin.start().await?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use soren_core::BoxedTransport;
use soren_framework::{Plugin, SorenContext, job_contexts, plugin_registry};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{ConfigLoader, SorenConfig, validate_config};
use crate::credentials::Credentials;
use crate::error::RuntimeResult;
use crate::logging;

/// A configured Soren SDK instance.
pub struct SorenSdk {
    config: SorenConfig,
    context: Arc<SorenContext>,
    shutdown: CancellationToken,
    plugins: Mutex<Vec<Arc<Plugin>>>,
}

impl SorenSdk {
    /// Validates `config`, initializes logging and binds the coordinator to
    /// `transport`.
    pub fn new(config: SorenConfig, transport: BoxedTransport) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        let identity = config.identity()?;
        let context = SorenContext::builder(transport, identity)
            .with_job_contexts(job_contexts())
            .with_events(config.event_settings())
            .with_delivery(config.delivery_config())
            .build();

        info!(
            plugin = %context.plugin_id(),
            agent = %config.agent_uri,
            gateway = context.identity().is_gateway(),
            events = context.events().resolved().is_some(),
            "Soren SDK initialized"
        );

        Ok(Self {
            config,
            context,
            shutdown: CancellationToken::new(),
            plugins: Mutex::new(Vec::new()),
        })
    }

    /// Loads configuration from the default sources, then calls [`new`](Self::new).
    pub fn from_env(transport: BoxedTransport) -> RuntimeResult<Self> {
        let config = ConfigLoader::new().load()?;
        Self::new(config, transport)
    }

    pub fn config(&self) -> &SorenConfig {
        &self.config
    }

    pub fn context(&self) -> &Arc<SorenContext> {
        &self.context
    }

    /// The decoded agent credential, for embedders that open the connection.
    pub fn credentials(&self) -> RuntimeResult<Option<Credentials>> {
        Ok(self.config.credentials()?)
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Creates a plugin on this SDK's context and registers it process-wide.
    ///
    /// Registry lookups without an id resolve to the first plugin registered.
    pub fn plugin(&self) -> Arc<Plugin> {
        let plugin = Arc::new(Plugin::new(
            Arc::clone(&self.context),
            self.shutdown.child_token(),
        ));
        if let Some(previous) = plugin_registry().register(Arc::clone(&plugin)) {
            debug!(plugin = %previous.id(), "Replaced previously registered plugin");
        }
        self.plugins.lock().push(Arc::clone(&plugin));
        plugin
    }

    /// Stops every plugin of this SDK and removes them from the registry.
    ///
    /// `Plugin::start` returns once its endpoints are dropped. Closing twice
    /// is a no-op.
    pub fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!(plugin = %self.context.plugin_id(), "Closing Soren SDK");
        self.shutdown.cancel();

        for plugin in self.plugins.lock().drain(..) {
            let id = plugin.id().into_owned();
            if plugin_registry()
                .get(&id)
                .is_some_and(|registered| Arc::ptr_eq(&registered, &plugin))
            {
                plugin_registry().unregister(&id);
            }
        }
    }

    /// Closes the SDK on Ctrl+C or SIGTERM.
    pub fn shutdown_on_signal(self: &Arc<Self>) -> JoinHandle<()> {
        let sdk = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                result = wait_for_signal() => match result {
                    Ok(()) => sdk.close(),
                    Err(e) => error!(error = %e, "Failed to install signal handlers"),
                },
                _ = sdk.shutdown.cancelled() => {}
            }
        })
    }
}

impl Drop for SorenSdk {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SorenSdk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SorenSdk")
            .field("plugin_id", &self.config.plugin_id)
            .field("agent_uri", &self.config.agent_uri)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn wait_for_signal() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeError;
    use crate::config::ConfigError;
    use soren_core::{Message, Transport};
    use soren_framework::{Action, Request, handler_fn};
    use soren_transport::LocalBus;
    use std::time::Duration;
    use tokio_test::assert_ok;

    fn config(plugin_id: &str) -> SorenConfig {
        SorenConfig {
            agent_uri: "nats://127.0.0.1:4222".into(),
            plugin_id: plugin_id.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bus = LocalBus::new();
        let err = SorenSdk::new(config(""), Arc::new(bus)).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Config(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_plugin_registered_and_released_on_close() {
        let bus = LocalBus::new();
        let sdk = SorenSdk::new(config("sdk-registry-test"), Arc::new(bus)).unwrap();

        let plugin = sdk.plugin();
        let registered = plugin_registry().get("sdk-registry-test").unwrap();
        assert!(Arc::ptr_eq(&registered, &plugin));

        sdk.close();
        assert!(sdk.is_closed());
        assert!(plugin.shutdown_token().is_cancelled());
        assert!(plugin_registry().get("sdk-registry-test").is_none());

        sdk.close();
    }

    #[test]
    fn test_gateway_identity_from_config() {
        let bus = LocalBus::new();
        let sdk = SorenSdk::new(config("bin.*.sdk-gw"), Arc::new(bus)).unwrap();
        assert!(sdk.context().identity().is_gateway());
        assert_eq!(sdk.context().identity().subject_id(), "bin.*.sdk-gw");
    }

    #[tokio::test]
    async fn test_close_unblocks_start() {
        let bus = LocalBus::new();
        let sdk = Arc::new(SorenSdk::new(config("sdk-serve-test"), Arc::new(bus.clone())).unwrap());
        let plugin = sdk.plugin();
        plugin.set_actions(vec![Action::new(
            "ping",
            handler_fn(|req: Request| async move { req.respond(b"pong".to_vec()).await }),
        )]);

        let serving = tokio::spawn({
            let plugin = Arc::clone(&plugin);
            async move { plugin.start().await }
        });

        let mut reply = None;
        for _ in 0..50 {
            let request = Message::new("soren.cpu.sdk-serve-test.ping", Vec::new());
            if let Ok(message) = bus.request(request, Duration::from_millis(200)).await {
                reply = Some(message);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reply.unwrap().payload, b"pong");

        sdk.close();
        let result = tokio::time::timeout(Duration::from_secs(1), serving)
            .await
            .unwrap()
            .unwrap();
        assert_ok!(result);
        assert!(!bus.has_subscriber("soren.cpu.sdk-serve-test.ping"));
    }
}
