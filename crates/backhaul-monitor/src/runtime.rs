use std::sync::Arc;

use tracing::info;

use crate::client::{resolve_reflectors, ReflectorClient};
use crate::config::MonitorConfig;
use crate::diag::DiagKind;
use crate::error::{ConfigError, MonitorError};
use crate::metrics::BackhaulMetrics;
use crate::scheduler::Scheduler;
use crate::store::{BackhaulAggregates, MetricsStore, ReflectorSet};
use crate::worker::{JobQueue, Worker, WorkerState};

/// Everything a component needs, passed explicitly instead of living in
/// process-wide state. Cheap to clone.
#[derive(Clone)]
pub struct MonitorContext {
    pub config: Arc<MonitorConfig>,
    pub store: Arc<MetricsStore>,
    pub client: Arc<dyn ReflectorClient>,
}

impl MonitorContext {
    /// Builds a fresh store from `config.buffers`.
    pub fn new(config: MonitorConfig, client: Arc<dyn ReflectorClient>) -> Result<Self, ConfigError> {
        let store = MetricsStore::new(&config.buffers)?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            client,
        })
    }
}

/// Running monitor: one worker thread and one scheduler thread sharing a
/// metrics store.
///
/// Dropping the runtime shuts both threads down.
pub struct MonitorRuntime {
    ctx: MonitorContext,
    worker: Option<Worker>,
    scheduler: Option<Scheduler>,
}

impl MonitorRuntime {
    /// Validates buffers, resolves reflectors and starts the threads. Any
    /// failure here is fatal for the process.
    pub fn start(config: MonitorConfig, client: Arc<dyn ReflectorClient>) -> Result<Self, MonitorError> {
        let ctx = MonitorContext::new(config, client)?;

        let reflectors = resolve_reflectors(&ctx.config.reflectors, ctx.client.as_ref())
            .map_err(MonitorError::Reflectors)?;
        ctx.store.set_reflectors(reflectors);

        let queue = JobQueue::new(ctx.config.buffers.queue_capacity);
        let worker = Worker::spawn(ctx.clone(), queue.clone())?;
        let scheduler = Scheduler::spawn(ctx.clone(), queue)?;
        info!(
            queue_capacity = ctx.config.buffers.queue_capacity,
            tick_ms = ctx.config.schedule.tick.as_millis() as u64,
            "backhaul monitor started"
        );

        Ok(Self {
            ctx,
            worker: Some(worker),
            scheduler: Some(scheduler),
        })
    }

    pub fn context(&self) -> &MonitorContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<MetricsStore> {
        &self.ctx.store
    }

    pub fn snapshot(&self) -> BackhaulMetrics {
        self.ctx.store.snapshot()
    }

    pub fn aggregates(&self) -> BackhaulAggregates {
        self.ctx.store.aggregates()
    }

    pub fn reflectors(&self) -> Arc<ReflectorSet> {
        self.ctx.store.reflectors()
    }

    /// Returns immediately; the diagnostic runs after the next scheduler
    /// tick.
    pub fn request_diag(&self, kind: DiagKind) {
        self.ctx.store.request_diag(kind);
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker
            .as_ref()
            .map(Worker::state)
            .unwrap_or(WorkerState::Stopped)
    }

    /// Stops the scheduler, then the worker (after its in-flight job).
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.stop();
        }
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
            info!("backhaul monitor stopped");
        }
    }
}

impl Drop for MonitorRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
