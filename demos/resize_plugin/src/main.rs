//! Resize Plugin Demo
//!
//! A plugin offering a `resize` action, served against a simulated agent on
//! an in-process bus.
//!
//! ```text
//! agent ──execute──▶ resize handler ──accept──▶ {"jobId": …}
//!                         │
//!                         └─ background job ── progress 25/50/75 ──▶ agent
//!                                            └─ done (acknowledged) ──▶ agent
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package resize-plugin -- --jobs 3
//! ENV=development cargo run --package resize-plugin -- --plugin-id bin.*.demo42
//! ```

use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde::Deserialize;
use serde_json::{Value, json};
use soren::core::subject::{gateway_execute_subject, gateway_job_subject, job_subject};
use soren::core::{JobBodyContent, PluginIdentity, Subscription, message_handler};
use soren::framework::ProgressReporter;
use soren::prelude::*;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(about = "Serve a demo resize action against a simulated agent")]
struct Args {
    /// Plugin id; `bin.*.<uuid>` serves through the gateway.
    #[arg(long, default_value = "resize-demo")]
    plugin_id: String,

    /// Number of resize requests the simulated agent sends.
    #[arg(long, default_value_t = 2)]
    jobs: usize,

    /// Pause between progress steps, in milliseconds.
    #[arg(long, default_value_t = 200)]
    step_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ResizeParams {
    width: u32,
    height: u32,
}

// ============================================================================
// Plugin side
// ============================================================================

fn resize_action(step: Duration) -> Action {
    let handler = handler_fn(move |req: Request| async move {
        let content = req.content()?;
        let params: ResizeParams = match serde_json::from_value(Value::Object(content.body)) {
            Ok(params) => params,
            Err(e) => return req.reject(&json!(format!("invalid parameters: {e}"))).await,
        };
        if params.width == 0 || params.height == 0 {
            return req.reject(&json!("width and height must be positive")).await;
        }

        let reporter = req.reporter();
        let job = req.accept().await?;
        info!(job = %job, width = params.width, height = params.height, "Resize accepted");
        tokio::spawn(run_job(reporter, job, params, step));
        Ok::<_, SdkError>(())
    });

    Action::new("resize", handler)
        .with_title("Resize")
        .with_description("Resize an image to the given dimensions")
        .with_icon("material", "photo_size_select_large")
        .with_form(ActionForm {
            jsonschema: object(json!({
                "type": "object",
                "required": ["width", "height"],
                "properties": {
                    "width": { "type": "integer", "minimum": 1 },
                    "height": { "type": "integer", "minimum": 1 }
                }
            })),
            ..Default::default()
        })
}

async fn run_job(reporter: ProgressReporter, job: JobId, params: ResizeParams, step: Duration) {
    for percent in [25, 50, 75] {
        tokio::time::sleep(step).await;
        let update = JobProgress::new(percent).with_frame("Resizing", format!("{percent}% done"));
        if let Err(e) = reporter.progress(&job, Command::Progress, &update).await {
            warn!(job = %job, error = %e, "Progress update dropped");
        }
    }

    tokio::time::sleep(step).await;
    let details = object(json!({ "width": params.width, "height": params.height }));
    if let Err(e) = reporter.done(&job, details).await {
        error!(job = %job, error = %e, "Completion was not delivered");
    }
}

fn object(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        _ => JsonMap::new(),
    }
}

// ============================================================================
// Simulated agent
// ============================================================================

/// Acknowledges every job update and forwards completions to `done`.
async fn agent_updates(
    bus: &LocalBus,
    identity: &PluginIdentity,
    done: mpsc::UnboundedSender<Message>,
) -> Result<Vec<Subscription>> {
    let mut subscriptions = Vec::new();
    for command in [Command::Progress, Command::Done] {
        let pattern = match identity {
            PluginIdentity::GatewayHosted { uuid } => {
                gateway_job_subject("*", uuid, "*", command.as_str())
            }
            PluginIdentity::Standalone { id } => job_subject(id, "*", command.as_str()),
        };
        let responder = bus.clone();
        let done = done.clone();
        let is_done = command == Command::Done;
        let sub = bus
            .subscribe(
                &pattern,
                message_handler(move |msg: Message| {
                    let responder = responder.clone();
                    let done = done.clone();
                    async move {
                        info!(
                            subject = %msg.subject,
                            body = %String::from_utf8_lossy(&msg.payload),
                            "Agent received update"
                        );
                        if let Some(reply) = &msg.reply {
                            let ack = Message::new(reply.as_str(), br#"{"status":"ok"}"#.to_vec());
                            let _ = responder.publish(ack).await;
                        }
                        if is_done {
                            let _ = done.send(msg);
                        }
                    }
                }),
            )
            .await?;
        subscriptions.push(sub);
    }
    Ok(subscriptions)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigLoader::new()
        .set("agent_uri", "local://in-process")
        .set("plugin_id", &args.plugin_id)
        .load()?;
    let bus = LocalBus::new();
    let sdk = Arc::new(SorenSdk::new(config, Arc::new(bus.clone()))?);
    let identity = sdk.context().identity().clone();

    let plugin = sdk.plugin();
    plugin.set_intro(
        PluginIntro {
            name: "Resize".into(),
            author: "Soren".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            requirements: None,
        },
        None,
    );
    plugin.set_actions(vec![resize_action(Duration::from_millis(args.step_ms))]);

    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let _agent = agent_updates(&bus, &identity, done_tx).await?;

    let _signals = sdk.shutdown_on_signal();
    let serving = tokio::spawn({
        let plugin = Arc::clone(&plugin);
        async move { plugin.start().await }
    });

    let execute = match &identity {
        PluginIdentity::GatewayHosted { uuid } => {
            gateway_execute_subject("tenant-1", uuid, "resize")
        }
        PluginIdentity::Standalone { .. } => identity.execute_subscription("resize"),
    };
    for n in 0..args.jobs {
        let body = json!({ "body": { "width": 640 + n * 10, "height": 480 } });
        let reply = send_when_ready(&bus, &execute, serde_json::to_vec(&body)?).await?;
        let accepted: JobBodyContent = reply.json().context("unexpected accept reply")?;
        info!(job = %accepted.job_id, "Agent started job");
    }

    for _ in 0..args.jobs {
        let Some(done) = done_rx.recv().await else {
            bail!("agent stopped before all jobs completed");
        };
        let body: JobBodyContent = done.json()?;
        info!(job = %body.job_id, details = ?body.details, "Job finished");
    }

    sdk.close();
    serving.await??;
    Ok(())
}

/// Retries the execute request until the plugin's endpoints are up.
async fn send_when_ready(bus: &LocalBus, subject: &str, payload: Vec<u8>) -> Result<Message> {
    for _ in 0..50 {
        match bus
            .request(Message::new(subject, payload.clone()), Duration::from_secs(2))
            .await
        {
            Ok(reply) => return Ok(reply),
            Err(e) if e.is_no_responders() => tokio::time::sleep(Duration::from_millis(20)).await,
            Err(e) => return Err(e.into()),
        }
    }
    bail!("plugin never subscribed to {subject}")
}
