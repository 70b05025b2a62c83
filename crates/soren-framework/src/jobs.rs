//! Job lifecycle: accept, reject and binding cleanup.
//!
//! Accepting a request mints a [`JobId`]. For gateway-hosted plugins the
//! job is also bound to the entity id found in the inbound subject, so that
//! later progress updates can be routed back through the gateway:
//!
//! ```text
//! soren.v2.bin.tenant-9.abc123.resize   ──accept──▶  job-7f… → tenant-9
//! done(job-7f…)                         ──────────▶  soren.v2.bin.tenant-9.abc123.job-7f….done
//! ```
//!
//! A binding is removed when a 100 % update for the job has been delivered,
//! or explicitly through [`JobLifecycle::release`]. Jobs that end any other
//! way keep their binding until released. A delivered completion keeps the
//! entity in the context's [`CompletedJobs`](crate::CompletedJobs) record, so
//! repeating it still reaches the gateway.

use std::sync::Arc;

use serde_json::Value;
use soren_core::{JobBodyContent, JobId, JsonMap, Message, PluginIdentity};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::SorenContext;
use crate::error::SdkResult;

/// Accepts and rejects execute requests and owns job bindings.
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    ctx: Arc<SorenContext>,
}

impl JobLifecycle {
    pub fn new(ctx: Arc<SorenContext>) -> Self {
        Self { ctx }
    }

    /// Mints a job for `message` and answers it with `{"jobId": …}`.
    ///
    /// Gateway-hosted plugins bind the new job to the entity id that follows
    /// the `bin` segment of the inbound subject. If the answer cannot be
    /// sent, the binding is dropped again and the error returned: from the
    /// caller's point of view no job exists.
    pub async fn accept(&self, message: &Message) -> SdkResult<JobId> {
        let job_id = JobId::new(Uuid::new_v4().to_string());
        let bound = self.bind(&job_id, &message.subject);

        let body = JobBodyContent {
            job_id: job_id.to_string(),
            ..Default::default()
        };
        let sent = match serde_json::to_vec(&body) {
            Ok(payload) => self.ctx.reply(message, payload).await,
            Err(e) => Err(e.into()),
        };

        if let Err(e) = sent {
            if bound {
                self.release(&job_id);
            }
            warn!(
                subject = %message.subject,
                job_id = %job_id,
                error = %e,
                "Failed to answer accepted request"
            );
            return Err(e);
        }

        debug!(subject = %message.subject, job_id = %job_id, bound, "Job accepted");
        Ok(job_id)
    }

    /// Answers `message` with `{"details": {"error": detail}}`.
    ///
    /// No job is minted and no binding is touched.
    pub async fn reject(&self, message: &Message, detail: Value) -> SdkResult<()> {
        let mut details = JsonMap::new();
        details.insert("error".to_string(), detail);
        let body = JobBodyContent {
            details,
            ..Default::default()
        };

        let payload = serde_json::to_vec(&body)?;
        self.ctx.reply(message, payload).await?;
        debug!(subject = %message.subject, "Request rejected");
        Ok(())
    }

    /// The entity id `job_id` is bound to, if any.
    pub fn entity_of(&self, job_id: &JobId) -> Option<String> {
        self.ctx.job_contexts().get(job_id)
    }

    /// Drops the binding of `job_id`.
    ///
    /// Returns `true` if a binding existed. Releasing an unbound job is a
    /// no-op.
    pub fn release(&self, job_id: &JobId) -> bool {
        let released = self.ctx.job_contexts().remove(job_id).is_some();
        if released {
            debug!(job_id = %job_id, "Job binding released");
        }
        released
    }

    /// Moves the binding of a completed job to the completed-jobs record.
    ///
    /// Returns `true` if a binding existed.
    pub(crate) fn complete(&self, job_id: &JobId) -> bool {
        match self.ctx.job_contexts().remove(job_id) {
            Some(entity) => {
                self.ctx.completed_jobs().record(job_id.clone(), entity);
                true
            }
            None => false,
        }
    }

    fn bind(&self, job_id: &JobId, subject: &str) -> bool {
        if !self.ctx.identity().is_gateway() {
            return false;
        }

        match PluginIdentity::entity_from_subject(subject) {
            Some(entity) => {
                self.ctx
                    .job_contexts()
                    .insert(job_id.clone(), entity.to_string());
                true
            }
            None => {
                warn!(subject, job_id = %job_id, "Gateway request carries no entity id");
                false
            }
        }
    }
}
