//! The plugin facade.
//!
//! A [`Plugin`] is what an embedding application programs against: declare
//! intro metadata, settings and actions, then [`start`](Plugin::start)
//! serving until the shutdown token fires.
//!
//! ```rust,ignore
//! let plugin = sdk.plugin();
//! plugin.set_intro(PluginIntro { name: "Widgets".into(), ..Default::default() }, None);
//! plugin.set_actions(vec![Action::new("resize", handler_fn(resize))]);
//! plugin.start().await?;
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use soren_core::{
    ActionDescriptor, Command, JobId, JobProgress, JsonMap, LogLevel, PluginIdentity, PluginIntro,
    Settings,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::action::Action;
use crate::context::SorenContext;
use crate::delivery::Delivery;
use crate::dispatcher::{
    ActionDispatcher, DEFAULT_SETTINGS_REPLY_TO, Declaration, Registration, SharedDeclaration,
    StartupWarning,
};
use crate::error::SdkResult;
use crate::events::EventEmitter;
use crate::handler::RequestHandler;
use crate::jobs::JobLifecycle;
use crate::progress::ProgressReporter;
use crate::request::Request;

/// Source of the event announcing a started plugin.
const STARTUP_EVENT_SOURCE: &str = "soren-sdk-init";

/// A live plugin instance.
///
/// `Plugin` is `Send + Sync`; declaration setters may be called from any
/// thread, but are meant to run before [`start`](Self::start).
pub struct Plugin {
    ctx: Arc<SorenContext>,
    shutdown: CancellationToken,
    declaration: SharedDeclaration,
    registration: Mutex<Option<Registration>>,
}

impl Plugin {
    /// Creates a plugin serving on `ctx` until `shutdown` is cancelled.
    pub fn new(ctx: Arc<SorenContext>, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            shutdown,
            declaration: Arc::new(RwLock::new(Declaration::default())),
            registration: Mutex::new(None),
        }
    }

    /// The configured plugin id.
    pub fn id(&self) -> Cow<'_, str> {
        self.ctx.plugin_id()
    }

    pub fn identity(&self) -> &PluginIdentity {
        self.ctx.identity()
    }

    pub fn context(&self) -> &Arc<SorenContext> {
        &self.ctx
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Whether endpoints are currently subscribed.
    pub fn is_registered(&self) -> bool {
        self.registration.lock().is_some()
    }

    // ─── Declaration ────────────────────────────────────────────────────────

    /// Sets the intro metadata and the handler for requirement submissions.
    pub fn set_intro(&self, intro: PluginIntro, requirements_handler: Option<RequestHandler>) {
        let mut decl = self.declaration.write();
        decl.intro = intro;
        decl.requirements_handler = requirements_handler;
    }

    /// Sets the settings schema and the handler for settings submissions.
    ///
    /// A blank `replyTo` becomes `_settings.config.submit`.
    pub fn set_settings(&self, settings: Option<Settings>, handler: Option<RequestHandler>) {
        let settings = settings.map(|mut settings| {
            if settings.reply_to.trim().is_empty() {
                settings.reply_to = DEFAULT_SETTINGS_REPLY_TO.to_string();
            }
            settings
        });

        let mut decl = self.declaration.write();
        decl.settings = settings;
        decl.settings_handler = handler;
    }

    /// Replaces the current settings values.
    ///
    /// Served immediately on the settings endpoint; a no-op when no settings
    /// are declared.
    pub fn update_settings_data(&self, data: JsonMap) {
        if let Some(settings) = self.declaration.write().settings.as_mut() {
            settings.data = data;
        }
    }

    /// Replaces all actions.
    pub fn set_actions(&self, actions: Vec<Action>) {
        self.declaration.write().actions = actions;
    }

    /// Appends actions.
    pub fn add_actions(&self, actions: impl IntoIterator<Item = Action>) {
        self.declaration.write().actions.extend(actions);
    }

    pub fn intro(&self) -> PluginIntro {
        self.declaration.read().intro.clone()
    }

    pub fn settings(&self) -> Option<Settings> {
        self.declaration.read().settings.clone()
    }

    /// The action catalogue, without handlers.
    pub fn catalogue(&self) -> Vec<ActionDescriptor> {
        self.declaration.read().catalogue()
    }

    // ─── Serving ────────────────────────────────────────────────────────────

    /// Subscribes every declared endpoint, replacing earlier subscriptions.
    ///
    /// Returns the actions that could not be wired.
    pub async fn register(&self) -> SdkResult<Vec<StartupWarning>> {
        let mut registration = ActionDispatcher::new(Arc::clone(&self.ctx))
            .register(&self.declaration)
            .await?;

        let warnings = registration.take_warnings();
        for warning in &warnings {
            warn!(plugin = %self.id(), "{warning}");
        }

        *self.registration.lock() = Some(registration);
        Ok(warnings)
    }

    /// Registers all endpoints, announces the plugin on the event channel and
    /// serves until the shutdown token is cancelled.
    ///
    /// In-flight handler invocations are not cancelled.
    pub async fn start(&self) -> SdkResult<()> {
        self.register().await?;
        self.announce().await;

        self.shutdown.cancelled().await;

        let name = self.declaration.read().intro.name.clone();
        info!(plugin = %self.id(), name = %name, "Shutdown requested, plugin exiting");
        self.registration.lock().take();
        Ok(())
    }

    async fn announce(&self) {
        let catalogue = self.catalogue();
        let mut details = JsonMap::new();
        match serde_json::to_value(&catalogue) {
            Ok(actions) => {
                details.insert("actions".to_string(), actions);
            }
            Err(e) => warn!(error = %e, "Failed to encode action catalogue"),
        }

        if let Err(e) = self
            .events()
            .log(STARTUP_EVENT_SOURCE, LogLevel::Info, "start plugin", details)
            .await
        {
            warn!(plugin = %self.id(), error = %e, "Failed to emit startup event");
        }
        info!(plugin = %self.id(), actions = catalogue.len(), "Plugin started");
    }

    // ─── Jobs ───────────────────────────────────────────────────────────────

    pub fn jobs(&self) -> JobLifecycle {
        self.ctx.lifecycle()
    }

    pub fn reporter(&self) -> ProgressReporter {
        self.ctx.reporter()
    }

    pub fn events(&self) -> EventEmitter {
        self.ctx.emitter()
    }

    /// Accepts `request` as a new job.
    pub async fn accept(&self, request: Request) -> SdkResult<JobId> {
        request.accept().await
    }

    /// Rejects `request` with `detail`.
    pub async fn reject(&self, request: Request, detail: Value) -> SdkResult<()> {
        request.reject(&detail).await
    }

    /// Reports progress of a job.
    pub async fn progress(
        &self,
        job_id: &JobId,
        command: Command,
        payload: &JobProgress,
    ) -> SdkResult<Delivery> {
        self.reporter().progress(job_id, command, payload).await
    }

    /// Reports completion of a job.
    pub async fn done(&self, job_id: &JobId, details: JsonMap) -> SdkResult<Delivery> {
        self.reporter().done(job_id, details).await
    }

    /// Drops the routing binding of a job that will never complete.
    pub fn release(&self, job_id: &JobId) -> bool {
        self.jobs().release(job_id)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("identity", self.identity())
            .field("registered", &self.is_registered())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::test_support::{ScriptedTransport, standalone_context};
    use crate::{SdkError, SorenContext};
    use serde_json::json;
    use soren_core::{Message, Transport, message_handler};
    use soren_transport::LocalBus;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    const WAIT: Duration = Duration::from_secs(1);

    fn plugin_on(bus: &LocalBus, id: &str) -> Arc<Plugin> {
        let ctx = SorenContext::builder(
            Arc::new(bus.clone()),
            PluginIdentity::parse(id).unwrap(),
        )
        .build();
        Arc::new(Plugin::new(ctx, CancellationToken::new()))
    }

    /// Simulated agent: acknowledges every job update and records it.
    async fn agent(
        bus: &LocalBus,
        pattern: &str,
    ) -> (mpsc::UnboundedReceiver<Message>, soren_core::Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let responder = bus.clone();
        let sub = bus
            .subscribe(
                pattern,
                message_handler(move |msg: Message| {
                    let tx = tx.clone();
                    let responder = responder.clone();
                    async move {
                        if let Some(reply) = msg.reply.clone() {
                            let _ = responder
                                .publish(Message::new(reply, br#"{"status":"ok"}"#.to_vec()))
                                .await;
                        }
                        let _ = tx.send(msg);
                    }
                }),
            )
            .await
            .unwrap();
        (rx, sub)
    }

    /// Registers an action whose handler only accepts and hands the job id out.
    fn accepting_action(method: &str) -> (Action, mpsc::UnboundedReceiver<JobId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = handler_fn(move |req: Request| {
            let tx = tx.clone();
            async move {
                let job_id = req.accept().await?;
                let _ = tx.send(job_id);
                Ok::<_, SdkError>(())
            }
        });
        (Action::new(method, handler), rx)
    }

    #[tokio::test]
    async fn test_standalone_scenario() {
        let bus = LocalBus::new();
        let plugin = plugin_on(&bus, "widgets-svc");
        let (action, mut jobs) = accepting_action("resize");
        plugin.set_actions(vec![action]);
        assert_ok!(plugin.register().await);

        let (mut updates, _agent) = agent(&bus, "soren.cpu.widgets-svc.*.progress").await;

        let reply = bus
            .request(
                Message::new("soren.cpu.widgets-svc.resize", br#"{"body":{}}"#.to_vec()),
                WAIT,
            )
            .await
            .unwrap();
        let accepted: soren_core::JobBodyContent = reply.json().unwrap();
        let job_id = jobs.recv().await.unwrap();
        assert_eq!(accepted.job_id, job_id.as_str());

        let delivery = plugin
            .progress(&job_id, Command::Progress, &JobProgress::new(40))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Published);

        let update = updates.recv().await.unwrap();
        assert_eq!(
            update.subject,
            format!("soren.cpu.widgets-svc.{job_id}.progress")
        );
        assert!(plugin.context().job_contexts().is_empty());
    }

    #[tokio::test]
    async fn test_gateway_scenario() {
        let bus = LocalBus::new();
        let plugin = plugin_on(&bus, "bin.*.abc123");
        let (action, mut jobs) = accepting_action("resize");
        plugin.set_actions(vec![action]);
        assert_ok!(plugin.register().await);

        let (mut updates, _agent) = agent(&bus, "soren.v2.bin.tenant-9.abc123.*.done").await;

        bus.request(
            Message::new("soren.v2.bin.tenant-9.abc123.resize", b"{}".to_vec()),
            WAIT,
        )
        .await
        .unwrap();
        let job_id = jobs.recv().await.unwrap();
        assert_eq!(
            plugin.jobs().entity_of(&job_id).as_deref(),
            Some("tenant-9")
        );

        let mut details = JsonMap::new();
        details.insert("width".into(), json!(640));
        let delivery = plugin.done(&job_id, details).await.unwrap();
        assert!(matches!(delivery, Delivery::Acknowledged(_)));

        let update = updates.recv().await.unwrap();
        assert_eq!(
            update.subject,
            format!("soren.v2.bin.tenant-9.abc123.{job_id}.done")
        );
        assert!(plugin.jobs().entity_of(&job_id).is_none());

        // Completing again goes to the same gateway subject.
        let again = plugin.done(&job_id, JsonMap::new()).await.unwrap();
        assert!(matches!(again, Delivery::Acknowledged(_)));
        let repeat = updates.recv().await.unwrap();
        assert_eq!(repeat.subject, update.subject);
    }

    #[tokio::test]
    async fn test_metadata_endpoints() {
        let bus = LocalBus::new();
        let plugin = plugin_on(&bus, "widgets-svc");
        plugin.set_intro(
            PluginIntro {
                name: "Widgets".into(),
                author: "ops".into(),
                version: "1.2.0".into(),
                requirements: None,
            },
            None,
        );
        plugin.set_actions(vec![accepting_action("resize").0.with_title("Resize")]);
        plugin.register().await.unwrap();

        let intro = bus
            .request(Message::new("soren.v2.widgets-svc.@intro", Vec::new()), WAIT)
            .await
            .unwrap();
        assert_eq!(intro.json::<PluginIntro>().unwrap().version, "1.2.0");

        // No settings declared: empty answer.
        let settings = bus
            .request(Message::new("soren.v2.widgets-svc.@settings", Vec::new()), WAIT)
            .await
            .unwrap();
        assert!(settings.payload.is_empty());

        let actions = bus
            .request(Message::new("soren.v2.widgets-svc.@actions", Vec::new()), WAIT)
            .await
            .unwrap();
        let catalogue: Vec<ActionDescriptor> = actions.json().unwrap();
        assert_eq!(catalogue, plugin.catalogue());
        assert_eq!(catalogue[0].title, "Resize");
    }

    #[tokio::test]
    async fn test_settings_default_endpoint_and_live_data() {
        let bus = LocalBus::new();
        let plugin = plugin_on(&bus, "widgets-svc");
        plugin.set_settings(Some(Settings::default()), None);
        plugin.register().await.unwrap();

        let mut data = JsonMap::new();
        data.insert("quality".into(), json!(90));
        plugin.update_settings_data(data);

        let settings: Settings = bus
            .request(Message::new("soren.v2.widgets-svc.@settings", Vec::new()), WAIT)
            .await
            .unwrap()
            .json()
            .unwrap();
        assert_eq!(settings.reply_to, DEFAULT_SETTINGS_REPLY_TO);
        assert_eq!(settings.data["quality"], 90);

        // Submit endpoint without a handler answers "not implemented".
        let submit = bus
            .request(
                Message::new("soren.v2.widgets-svc._settings.config.submit", b"{}".to_vec()),
                WAIT,
            )
            .await
            .unwrap();
        assert_eq!(submit.payload, crate::handler::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_panicking_action_keeps_serving() {
        let bus = LocalBus::new();
        let plugin = plugin_on(&bus, "widgets-svc");
        let (good, mut jobs) = accepting_action("resize");
        let bad = Action::new(
            "explode",
            handler_fn(|req: Request| async move {
                if req.subject().ends_with("explode") {
                    panic!("handler bug");
                }
            }),
        );
        plugin.set_actions(vec![bad, good]);
        plugin.register().await.unwrap();

        let err = bus
            .request(Message::new("soren.cpu.widgets-svc.explode", Vec::new()), WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, soren_core::TransportError::Timeout { .. }));

        bus.request(Message::new("soren.cpu.widgets-svc.resize", Vec::new()), WAIT)
            .await
            .unwrap();
        assert!(jobs.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_start_returns_after_shutdown() {
        let transport = ScriptedTransport::new();
        let ctx = standalone_context(&transport, "widgets-svc");
        let token = CancellationToken::new();
        let plugin = Arc::new(Plugin::new(ctx, token.clone()));
        plugin.set_actions(vec![accepting_action("resize").0]);

        let serving = tokio::spawn({
            let plugin = Arc::clone(&plugin);
            async move { plugin.start().await }
        });

        tokio::task::yield_now().await;
        token.cancel();
        assert_ok!(serving.await.unwrap());
        assert!(!plugin.is_registered());

        // The startup event carried the catalogue.
        let event = transport
            .requests()
            .into_iter()
            .find(|msg| msg.subject == "ops-events.widgets-svc.log")
            .unwrap();
        let events: Vec<soren_core::PluginEvent> = event.json().unwrap();
        assert_eq!(events[0].message, "start plugin");
        assert_eq!(events[0].details["actions"][0]["method"], "resize");
    }

    #[tokio::test]
    async fn test_release_delegates() {
        let transport = ScriptedTransport::new();
        let ctx = standalone_context(&transport, "widgets-svc");
        ctx.job_contexts()
            .insert(JobId::from("job-1"), "tenant-1".to_string());
        let plugin = Plugin::new(ctx, CancellationToken::new());

        assert!(plugin.release(&JobId::from("job-1")));
        assert!(!plugin.release(&JobId::from("job-1")));
    }
}
