//! Progress and completion reporting.
//!
//! The target subject depends on whether the job was bound to an entity when
//! it was accepted:
//!
//! | Identity | Binding | Subject |
//! |----------|---------|---------|
//! | standalone | none | `soren.cpu.<id>.<job>.<command>` |
//! | gateway | `job → tenant-9` | `soren.v2.bin.tenant-9.<uuid>.<job>.<command>` |
//! | gateway | none | no subject: completions are skipped, progress fails |
//!
//! Each update is delivered according to the [`DeliveryConfig`] policy of its
//! class. A delivered 100 % update releases the job's binding but keeps its
//! entity in the context's completed-jobs record, so reporting completion
//! twice reaches the same gateway subject.

use std::sync::Arc;

use soren_core::subject::{gateway_job_subject, job_subject};
use soren_core::{
    Command, JobBodyContent, JobId, JobProgress, JsonMap, Message, PROGRESS_COMPLETE,
    PluginIdentity,
};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::context::SorenContext;
use crate::delivery::{Delivery, DeliveryConfig, DeliveryMode};
use crate::error::{SdkError, SdkResult};

/// Failed attempts beyond this many are logged at `warn`.
const QUIET_ATTEMPTS: u32 = 3;

/// Sends job updates to the agent.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    ctx: Arc<SorenContext>,
}

impl ProgressReporter {
    pub fn new(ctx: Arc<SorenContext>) -> Self {
        Self { ctx }
    }

    /// The subject an update for `job_id` with `command` goes to.
    ///
    /// `None` for a gateway-hosted job whose entity is unknown.
    pub fn subject_for(&self, job_id: &JobId, command: &Command) -> Option<String> {
        match self.ctx.identity() {
            PluginIdentity::Standalone { id } => {
                Some(job_subject(id, job_id.as_str(), command.as_str()))
            }
            PluginIdentity::GatewayHosted { uuid } => {
                let entity = self
                    .ctx
                    .job_contexts()
                    .get(job_id)
                    .or_else(|| self.ctx.completed_jobs().entity_of(job_id))?;
                Some(gateway_job_subject(
                    &entity,
                    uuid,
                    job_id.as_str(),
                    command.as_str(),
                ))
            }
        }
    }

    /// Reports progress of `job_id` on the `command` subject.
    ///
    /// Updates of 100 % use the completion policy and release the job's
    /// binding once delivered. Percentages above 100 are refused.
    pub async fn progress(
        &self,
        job_id: &JobId,
        command: Command,
        payload: &JobProgress,
    ) -> SdkResult<Delivery> {
        if !payload.is_in_range() {
            return Err(SdkError::ProgressOutOfRange(payload.progress));
        }
        let body = serde_json::to_vec(payload)?;
        self.deliver(job_id, &command, body, payload.is_complete())
            .await
    }

    /// Reports completion of `job_id` with `details` on the `done` subject.
    pub async fn done(&self, job_id: &JobId, details: JsonMap) -> SdkResult<Delivery> {
        let envelope = JobBodyContent {
            job_id: job_id.to_string(),
            progress: PROGRESS_COMPLETE,
            details,
            commit_on: String::new(),
        };
        let body = serde_json::to_vec(&envelope)?;
        self.deliver(job_id, &Command::Done, body, true).await
    }

    async fn deliver(
        &self,
        job_id: &JobId,
        command: &Command,
        body: Vec<u8>,
        complete: bool,
    ) -> SdkResult<Delivery> {
        let Some(subject) = self.subject_for(job_id, command) else {
            if complete {
                warn!(job_id = %job_id, "No gateway route for completed job, skipping update");
                return Ok(Delivery::Skipped);
            }
            return Err(SdkError::UnboundJob {
                job_id: job_id.to_string(),
            });
        };
        let delivery: &DeliveryConfig = self.ctx.delivery();

        let outcome = match delivery.mode_for(complete) {
            DeliveryMode::BestEffort => self.publish(&subject, job_id, body).await,
            DeliveryMode::Acknowledged => self.request(&subject, job_id, body).await,
        }?;

        if complete && self.ctx.lifecycle().complete(job_id) {
            debug!(job_id = %job_id, "Released binding of completed job");
        }
        Ok(outcome)
    }

    async fn publish(&self, subject: &str, job_id: &JobId, body: Vec<u8>) -> SdkResult<Delivery> {
        match self
            .ctx
            .transport()
            .publish(Message::new(subject, body))
            .await
        {
            Ok(()) => {
                debug!(subject, job_id = %job_id, "Progress published");
                Ok(Delivery::Published)
            }
            Err(e) => {
                warn!(subject, job_id = %job_id, error = %e, "Failed to publish progress");
                Err(e.into())
            }
        }
    }

    async fn request(&self, subject: &str, job_id: &JobId, body: Vec<u8>) -> SdkResult<Delivery> {
        let transport = self.ctx.transport();
        let policy = self.ctx.delivery().retry;

        for attempt in 0..policy.max_attempts {
            let message = Message::new(subject, body.clone());
            match transport.request(message, policy.timeout).await {
                Ok(reply) => {
                    if let Err(e) = transport.flush().await {
                        error!(
                            subject,
                            job_id = %job_id,
                            error = %e,
                            "Flush after delivery failed"
                        );
                        return Err(e.into());
                    }
                    info!(
                        subject,
                        job_id = %job_id,
                        attempt = attempt + 1,
                        reply = %String::from_utf8_lossy(&reply.payload),
                        "Job update acknowledged"
                    );
                    return Ok(Delivery::Acknowledged(reply));
                }
                Err(e) if e.is_no_responders() => {
                    let delay = policy.delay(attempt);
                    let attempt = attempt + 1;
                    if attempt > QUIET_ATTEMPTS {
                        warn!(subject, attempt, ?delay, "No responders for job update");
                    } else {
                        debug!(subject, attempt, ?delay, "No responders for job update");
                    }
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        subject,
                        job_id = %job_id,
                        body = %String::from_utf8_lossy(&body),
                        error = %e,
                        "Job update failed"
                    );
                    return Err(e.into());
                }
            }
        }

        error!(
            subject,
            job_id = %job_id,
            body = %String::from_utf8_lossy(&body),
            attempts = policy.max_attempts,
            "Giving up on job update"
        );
        Err(SdkError::DeliveryExhausted {
            subject: subject.to_string(),
            attempts: policy.max_attempts,
        })
    }
}
