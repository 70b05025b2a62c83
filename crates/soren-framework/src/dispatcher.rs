//! Subject wiring for a plugin's declaration.
//!
//! [`ActionDispatcher::register`] subscribes every endpoint the agent talks
//! to:
//!
//! | Subject | Answer |
//! |---------|--------|
//! | `soren.v2.<id>.@intro` | intro metadata |
//! | `soren.v2.<id>.<requirements.replyTo>` | forwarded to the requirements handler |
//! | `soren.v2.<id>.@settings` | settings schema, or an empty reply |
//! | `soren.v2.<id>.<settings.replyTo>` | forwarded to the settings handler |
//! | `soren.v2.<id>.@actions` | action catalogue |
//! | `soren.v2.<id>.<method>.@form` | the action's form |
//! | execute subject of `<method>` | forwarded to the action's handler |
//!
//! The three metadata endpoints read the declaration at request time, so
//! intro, settings and catalogue changes are visible without re-registering.
//! Submit endpoints and per-action subjects are wired from the declaration
//! as it was at registration.
//!
//! Failing to wire the metadata or submit endpoints aborts registration.
//! Failing to wire one action only drops that action and is reported as a
//! [`StartupWarning`].

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use soren_core::subject::{
    actions_list_subject, form_subject, intro_subject, plugin_subject, settings_subject,
};
use soren_core::{
    ActionDescriptor, Message, MessageHandler, PluginIntro, Settings, Subscription,
    message_handler,
};
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::context::SorenContext;
use crate::error::{SdkError, SdkResult};
use crate::handler::{RequestHandler, invoke, not_implemented};
use crate::request::Request;

/// Settings submit endpoint used when the declaration names none.
pub const DEFAULT_SETTINGS_REPLY_TO: &str = "_settings.config.submit";

// =============================================================================
// Declaration
// =============================================================================

/// Everything a plugin declares to the agent.
#[derive(Clone, Default)]
pub struct Declaration {
    pub intro: PluginIntro,
    /// Receives submissions of the intro requirements form.
    pub requirements_handler: Option<RequestHandler>,
    pub settings: Option<Settings>,
    /// Receives submissions of the settings form.
    pub settings_handler: Option<RequestHandler>,
    pub actions: Vec<Action>,
}

impl Declaration {
    /// The action catalogue, without handlers.
    pub fn catalogue(&self) -> Vec<ActionDescriptor> {
        self.actions
            .iter()
            .map(|action| action.descriptor().clone())
            .collect()
    }

    /// Requirements submit endpoint, if one is declared.
    pub fn requirements_endpoint(&self) -> Option<&str> {
        self.intro
            .requirements
            .as_ref()
            .map(|requirements| requirements.reply_to.trim())
            .filter(|endpoint| !endpoint.is_empty())
    }

    /// Settings submit endpoint, if settings are declared.
    pub fn settings_endpoint(&self) -> Option<&str> {
        self.settings.as_ref().map(|settings| {
            let endpoint = settings.reply_to.trim();
            if endpoint.is_empty() {
                DEFAULT_SETTINGS_REPLY_TO
            } else {
                endpoint
            }
        })
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("intro", &self.intro)
            .field("settings", &self.settings)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

/// A declaration shared between the plugin and its live endpoints.
pub type SharedDeclaration = Arc<RwLock<Declaration>>;

// =============================================================================
// Registration
// =============================================================================

/// An action that could not be wired.
#[derive(Debug)]
pub struct StartupWarning {
    /// The action's method.
    pub method: String,
    /// The subject that failed.
    pub subject: String,
    pub error: SdkError,
}

impl fmt::Display for StartupWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action '{}' unreachable on '{}': {}",
            self.method, self.subject, self.error
        )
    }
}

/// Live subscriptions of a registered plugin.
///
/// Dropping the registration unsubscribes everything.
#[derive(Debug, Default)]
pub struct Registration {
    subscriptions: Vec<Subscription>,
    warnings: Vec<StartupWarning>,
}

impl Registration {
    /// Subscribed subjects, in subscription order.
    pub fn subjects(&self) -> Vec<&str> {
        self.subscriptions.iter().map(Subscription::subject).collect()
    }

    pub fn warnings(&self) -> &[StartupWarning] {
        &self.warnings
    }

    /// Moves the warnings out, keeping the subscriptions.
    pub fn take_warnings(&mut self) -> Vec<StartupWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// `true` when every declared action was wired.
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

// =============================================================================
// ActionDispatcher
// =============================================================================

/// Binds a declaration to transport subjects.
#[derive(Debug, Clone)]
pub struct ActionDispatcher {
    ctx: Arc<SorenContext>,
}

impl ActionDispatcher {
    pub fn new(ctx: Arc<SorenContext>) -> Self {
        Self { ctx }
    }

    /// Subscribes all endpoints of `declaration`.
    pub async fn register(&self, declaration: &SharedDeclaration) -> SdkResult<Registration> {
        let snapshot = declaration.read().clone();
        let id = self.ctx.identity().subject_id().into_owned();
        let mut registration = Registration::default();

        // Intro and requirements.
        let intro = self.metadata_reply(declaration, |decl| serde_json::to_vec(&decl.intro));
        registration
            .subscriptions
            .push(self.subscribe(intro_subject(&id), intro).await?);

        match snapshot.requirements_endpoint() {
            Some(endpoint) => {
                let handler = snapshot
                    .requirements_handler
                    .clone()
                    .unwrap_or_else(not_implemented);
                registration.subscriptions.push(
                    self.subscribe(plugin_subject(&id, endpoint), self.forward(handler))
                        .await?,
                );
            }
            None => debug!(plugin = %id, "No requirements endpoint declared"),
        }

        // Settings.
        let settings = self.metadata_reply(declaration, |decl| match &decl.settings {
            Some(settings) => serde_json::to_vec(settings),
            None => Ok(Vec::new()),
        });
        registration
            .subscriptions
            .push(self.subscribe(settings_subject(&id), settings).await?);

        if let Some(endpoint) = snapshot.settings_endpoint() {
            let handler = snapshot
                .settings_handler
                .clone()
                .unwrap_or_else(not_implemented);
            registration.subscriptions.push(
                self.subscribe(plugin_subject(&id, endpoint), self.forward(handler))
                    .await?,
            );
        }

        // Catalogue and actions.
        let catalogue =
            self.metadata_reply(declaration, |decl| serde_json::to_vec(&decl.catalogue()));
        registration
            .subscriptions
            .push(self.subscribe(actions_list_subject(&id), catalogue).await?);

        for action in &snapshot.actions {
            match self.wire_action(&id, action).await {
                Ok(subscriptions) => registration.subscriptions.extend(subscriptions),
                Err(warning) => {
                    warn!(
                        method = %warning.method,
                        subject = %warning.subject,
                        error = %warning.error,
                        "Action could not be wired"
                    );
                    registration.warnings.push(warning);
                }
            }
        }

        info!(
            plugin = %id,
            subscriptions = registration.len(),
            warnings = registration.warnings.len(),
            "Plugin endpoints registered"
        );
        Ok(registration)
    }

    async fn wire_action(
        &self,
        id: &str,
        action: &Action,
    ) -> Result<[Subscription; 2], StartupWarning> {
        let method = action.method();
        let form_subject = form_subject(id, method);
        let warning = |subject: &str, error: SdkError| StartupWarning {
            method: method.to_string(),
            subject: subject.to_string(),
            error,
        };

        let form_payload =
            serde_json::to_vec(action.form()).map_err(|e| warning(&form_subject, e.into()))?;
        let form = self
            .subscribe(form_subject.clone(), self.static_reply(form_payload))
            .await
            .map_err(|e| warning(&form_subject, e))?;
        info!(subject = %form_subject, "Form endpoint subscribed");

        let execute_subject = self.ctx.identity().execute_subscription(method);
        let execute = self
            .subscribe(
                execute_subject.clone(),
                self.forward(action.handler().clone()),
            )
            .await
            .map_err(|e| warning(&execute_subject, e))?;
        info!(subject = %execute_subject, "Action subscribed");

        Ok([form, execute])
    }

    async fn subscribe(&self, subject: String, handler: MessageHandler) -> SdkResult<Subscription> {
        match self.ctx.transport().subscribe(&subject, handler).await {
            Ok(subscription) => {
                debug!(subject = %subject, "Subscribed");
                Ok(subscription)
            }
            Err(source) => Err(SdkError::Subscribe { subject, source }),
        }
    }

    /// Answers every request with a payload rendered from the live declaration.
    fn metadata_reply<F>(&self, declaration: &SharedDeclaration, render: F) -> MessageHandler
    where
        F: Fn(&Declaration) -> serde_json::Result<Vec<u8>> + Send + Sync + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        let declaration = Arc::clone(declaration);
        message_handler(move |msg: Message| {
            let ctx = Arc::clone(&ctx);
            let rendered = render(&declaration.read());
            async move {
                let payload = match rendered {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(subject = %msg.subject, error = %e, "Failed to encode metadata");
                        return;
                    }
                };
                if let Err(e) = ctx.reply(&msg, payload).await {
                    warn!(subject = %msg.subject, error = %e, "Failed to answer metadata request");
                }
            }
        })
    }

    /// Answers every request with `payload`.
    fn static_reply(&self, payload: Vec<u8>) -> MessageHandler {
        let ctx = Arc::clone(&self.ctx);
        let payload: Arc<[u8]> = payload.into();
        message_handler(move |msg: Message| {
            let ctx = Arc::clone(&ctx);
            let payload = Arc::clone(&payload);
            async move {
                if let Err(e) = ctx.reply(&msg, payload.to_vec()).await {
                    warn!(subject = %msg.subject, error = %e, "Failed to answer form request");
                }
            }
        })
    }

    /// Hands every message to `handler` as a [`Request`].
    fn forward(&self, handler: RequestHandler) -> MessageHandler {
        let ctx = Arc::clone(&self.ctx);
        message_handler(move |msg: Message| {
            let ctx = Arc::clone(&ctx);
            let handler = handler.clone();
            async move {
                let plugin = ctx.plugin_id().into_owned();
                invoke(handler, Request::new(msg, ctx), &plugin).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use crate::test_support::{ScriptedTransport, gateway_context, standalone_context};
    use soren_core::{ActionForm, Requirements};

    fn declaration(actions: &[&str]) -> SharedDeclaration {
        let actions = actions
            .iter()
            .map(|method| Action::new(*method, not_implemented()))
            .collect();
        Arc::new(RwLock::new(Declaration {
            intro: PluginIntro {
                name: "Widgets".into(),
                author: "ops".into(),
                version: "1.0.0".into(),
                requirements: None,
            },
            actions,
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_standalone_subjects() {
        let transport = ScriptedTransport::new();
        let ctx = standalone_context(&transport, "widgets-svc");
        let decl = declaration(&["resize"]);

        let registration = ActionDispatcher::new(ctx).register(&decl).await.unwrap();

        assert!(registration.is_clean());
        assert_eq!(
            registration.subjects(),
            vec![
                "soren.v2.widgets-svc.@intro",
                "soren.v2.widgets-svc.@settings",
                "soren.v2.widgets-svc.@actions",
                "soren.v2.widgets-svc.resize.@form",
                "soren.cpu.widgets-svc.resize",
            ]
        );
        assert_eq!(transport.subscribed(), registration.subjects());
    }

    #[tokio::test]
    async fn test_gateway_subjects_and_submit_endpoints() {
        let transport = ScriptedTransport::new();
        let ctx = gateway_context(&transport, "abc123");
        let decl = declaration(&["resize"]);
        {
            let mut decl = decl.write();
            decl.intro.requirements = Some(Requirements {
                reply_to: "setup.submit".into(),
                ..Default::default()
            });
            decl.settings = Some(Settings::default());
        }

        let registration = ActionDispatcher::new(ctx).register(&decl).await.unwrap();

        assert_eq!(
            registration.subjects(),
            vec![
                "soren.v2.bin.*.abc123.@intro",
                "soren.v2.bin.*.abc123.setup.submit",
                "soren.v2.bin.*.abc123.@settings",
                "soren.v2.bin.*.abc123._settings.config.submit",
                "soren.v2.bin.*.abc123.@actions",
                "soren.v2.bin.*.abc123.resize.@form",
                "soren.v2.bin.*.abc123.resize",
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_action_becomes_warning() {
        let transport = ScriptedTransport::new();
        transport.fail_subscribe("soren.cpu.widgets-svc.broken");
        let ctx = standalone_context(&transport, "widgets-svc");
        let decl = declaration(&["broken", "resize"]);

        let registration = ActionDispatcher::new(ctx).register(&decl).await.unwrap();

        assert_eq!(registration.warnings().len(), 1);
        let warning = &registration.warnings()[0];
        assert_eq!(warning.method, "broken");
        assert_eq!(warning.subject, "soren.cpu.widgets-svc.broken");
        // The broken action's form was subscribed before its execute subject
        // failed, and is not kept. The other action is still wired.
        assert_eq!(
            transport.subscribed(),
            vec![
                "soren.v2.widgets-svc.@intro",
                "soren.v2.widgets-svc.@settings",
                "soren.v2.widgets-svc.@actions",
                "soren.v2.widgets-svc.broken.@form",
                "soren.v2.widgets-svc.resize.@form",
                "soren.cpu.widgets-svc.resize",
            ]
        );
        assert_eq!(
            registration.subjects(),
            vec![
                "soren.v2.widgets-svc.@intro",
                "soren.v2.widgets-svc.@settings",
                "soren.v2.widgets-svc.@actions",
                "soren.v2.widgets-svc.resize.@form",
                "soren.cpu.widgets-svc.resize",
            ]
        );
    }

    #[tokio::test]
    async fn test_metadata_failure_is_fatal() {
        let transport = ScriptedTransport::new();
        transport.fail_subscribe("soren.v2.widgets-svc.@actions");
        let ctx = standalone_context(&transport, "widgets-svc");

        let err = ActionDispatcher::new(ctx)
            .register(&declaration(&["resize"]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SdkError::Subscribe { ref subject, .. } if subject == "soren.v2.widgets-svc.@actions"
        ));
    }

    #[test]
    fn test_endpoints() {
        let mut decl = Declaration::default();
        assert_eq!(decl.settings_endpoint(), None);
        assert_eq!(decl.requirements_endpoint(), None);

        decl.settings = Some(Settings {
            reply_to: "  ".into(),
            ..Default::default()
        });
        decl.intro.requirements = Some(Requirements::default());
        assert_eq!(decl.settings_endpoint(), Some(DEFAULT_SETTINGS_REPLY_TO));
        assert_eq!(decl.requirements_endpoint(), None);

        decl.actions.push(
            Action::new("resize", handler_fn(|_req: Request| async {}))
                .with_form(ActionForm::default()),
        );
        assert_eq!(decl.catalogue()[0].method, "resize");
    }
}
