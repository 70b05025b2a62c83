//! Process-wide plugin and job registries.
//!
//! Both registries are created lazily on first access and live for the rest
//! of the process. Components never reach for them directly: the SDK
//! bootstrap injects them into each [`SorenContext`](crate::SorenContext),
//! and tests build isolated instances instead.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use soren_core::{JobId, Registry};

use crate::plugin::Plugin;

/// Job id → entity id of the caller that started the job.
///
/// Only gateway-routed jobs have an entry.
pub type JobContextRegistry = Registry<JobId, String>;

/// Number of completed jobs whose entity is remembered by default.
pub const DEFAULT_COMPLETED_CAPACITY: usize = 1024;

/// Entity ids of recently completed gateway jobs.
///
/// A delivered completion moves the job's binding here, so a repeated
/// completion still reaches the entity that started the job. The oldest
/// entry is evicted once `capacity` jobs are remembered.
#[derive(Debug)]
pub struct CompletedJobs {
    capacity: usize,
    inner: Mutex<CompletedInner>,
}

#[derive(Debug, Default)]
struct CompletedInner {
    order: VecDeque<JobId>,
    entities: HashMap<JobId, String>,
}

impl CompletedJobs {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CompletedInner::default()),
        }
    }

    /// Remembers that `job_id` completed for `entity`.
    pub fn record(&self, job_id: JobId, entity: String) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        if inner.entities.insert(job_id.clone(), entity).is_some() {
            return;
        }
        inner.order.push_back(job_id);
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.entities.remove(&evicted);
            }
        }
    }

    /// The entity a completed job was routed to.
    pub fn entity_of(&self, job_id: &JobId) -> Option<String> {
        self.inner.lock().entities.get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entities.is_empty()
    }
}

impl Default for CompletedJobs {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETED_CAPACITY)
    }
}

/// Live plugins keyed by their configured plugin id.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Registry<String, Arc<Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `plugin` under its plugin id, returning any plugin it replaced.
    pub fn register(&self, plugin: Arc<Plugin>) -> Option<Arc<Plugin>> {
        let id = plugin.id().into_owned();
        self.plugins.insert(id, plugin)
    }

    /// Looks up a plugin by id.
    pub fn get(&self, plugin_id: &str) -> Option<Arc<Plugin>> {
        self.plugins.get(plugin_id)
    }

    /// The earliest registered plugin still present.
    pub fn first(&self) -> Option<Arc<Plugin>> {
        self.plugins.first().map(|(_, plugin)| plugin)
    }

    /// Looks up `plugin_id`, or the first registered plugin when `None`.
    pub fn resolve(&self, plugin_id: Option<&str>) -> Option<Arc<Plugin>> {
        match plugin_id {
            Some(id) => self.get(id),
            None => self.first(),
        }
    }

    pub fn unregister(&self, plugin_id: &str) -> Option<Arc<Plugin>> {
        self.plugins.remove(plugin_id)
    }

    /// Plugin ids in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.plugins.keys()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

static PLUGINS: LazyLock<PluginRegistry> = LazyLock::new(PluginRegistry::new);

static JOB_CONTEXTS: LazyLock<Arc<JobContextRegistry>> = LazyLock::new(Default::default);

/// The process-wide plugin registry.
pub fn plugin_registry() -> &'static PluginRegistry {
    &PLUGINS
}

/// The process-wide job context registry.
pub fn job_contexts() -> Arc<JobContextRegistry> {
    Arc::clone(&JOB_CONTEXTS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SorenContext;
    use soren_core::PluginIdentity;
    use soren_transport::LocalBus;
    use tokio_util::sync::CancellationToken;

    fn plugin(id: &str) -> Arc<Plugin> {
        let identity = PluginIdentity::parse(id).unwrap();
        let ctx = SorenContext::builder(Arc::new(LocalBus::new()), identity).build();
        Arc::new(Plugin::new(ctx, CancellationToken::new()))
    }

    #[test]
    fn test_first_registered_wins() {
        let registry = PluginRegistry::new();
        registry.register(plugin("widgets-svc"));
        registry.register(plugin("bin.*.abc123"));

        let first = registry.resolve(None).unwrap();
        assert_eq!(first.id(), "widgets-svc");
        let gateway = registry.resolve(Some("bin.*.abc123")).unwrap();
        assert!(gateway.identity().is_gateway());
        assert!(registry.get("unknown").is_none());
        assert_eq!(registry.ids(), vec!["widgets-svc", "bin.*.abc123"]);
    }

    #[test]
    fn test_completed_jobs_evict_oldest() {
        let completed = CompletedJobs::new(2);
        completed.record(JobId::from("job-1"), "tenant-1".into());
        completed.record(JobId::from("job-2"), "tenant-2".into());
        // Recording a job twice does not push out older entries.
        completed.record(JobId::from("job-2"), "tenant-2".into());
        assert_eq!(completed.len(), 2);

        completed.record(JobId::from("job-3"), "tenant-3".into());
        assert!(completed.entity_of(&JobId::from("job-1")).is_none());
        assert_eq!(
            completed.entity_of(&JobId::from("job-3")).as_deref(),
            Some("tenant-3")
        );
        assert_eq!(completed.len(), 2);
    }

    #[test]
    fn test_global_accessors_return_one_instance() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (
                        plugin_registry() as *const PluginRegistry as usize,
                        Arc::as_ptr(&job_contexts()) as usize,
                    )
                })
            })
            .collect();

        let seen: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(seen.windows(2).all(|pair| pair[0] == pair[1]));
        assert!(Arc::ptr_eq(&job_contexts(), &job_contexts()));
    }
}
