//! Periodic producer: enqueues probe and classify jobs at independent
//! cadences, forwards control-plane diagnostic requests and refreshes the
//! reflector set.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::client::resolve_reflectors;
use crate::error::{MonitorError, ProbeError};
use crate::runtime::MonitorContext;
use crate::worker::{JobKind, JobOrigin, JobQueue};

#[derive(Debug)]
struct Cadence {
    kind: JobKind,
    period: Duration,
    /// `None` until the first successful enqueue, so every kind is due on
    /// the first tick.
    last_run: Option<Instant>,
}

impl Cadence {
    fn new(kind: JobKind, period: Duration) -> Self {
        Self {
            kind,
            period,
            last_run: None,
        }
    }

    fn is_due(&self, now: Instant) -> bool {
        self.last_run
            .is_none_or(|t| now.saturating_duration_since(t) >= self.period)
    }
}

/// One scheduler step per [`tick`](SchedulerLoop::tick). Holds no thread,
/// so it can be driven with synthetic instants.
pub struct SchedulerLoop {
    ctx: MonitorContext,
    queue: JobQueue,
    cadences: [Cadence; 4],
    refresh_every: Option<Duration>,
    last_refresh: Instant,
}

impl SchedulerLoop {
    /// `now` counts as the last reflector refresh; start-up has just
    /// resolved them.
    pub fn new(ctx: MonitorContext, queue: JobQueue, now: Instant) -> Self {
        let schedule = &ctx.config.schedule;
        let cadences = [
            Cadence::new(JobKind::MicroProbe, schedule.micro_period),
            Cadence::new(JobKind::MultiReflector, schedule.multi_period),
            Cadence::new(JobKind::Chg, schedule.chg_period),
            Cadence::new(JobKind::Classify, schedule.classify_period),
        ];
        // Static URLs are never replaced by the bootstrap.
        let refresh_every = match ctx.config.reflectors.static_pair() {
            Some(_) => None,
            None => schedule.reflector_refresh,
        };
        Self {
            ctx,
            queue,
            cadences,
            refresh_every,
            last_refresh: now,
        }
    }

    pub fn tick(&mut self, now: Instant) {
        self.forward_diag_request();

        for cadence in &mut self.cadences {
            if !cadence.is_due(now) {
                continue;
            }
            if self.queue.enqueue(cadence.kind, JobOrigin::Scheduled) {
                cadence.last_run = Some(now);
            } else {
                warn!(kind = cadence.kind.as_str(), "job queue full, dropping job");
            }
        }

        // The bootstrap fetch blocks; it runs on the worker, off the tick.
        if let Some(every) = self.refresh_every {
            if now.saturating_duration_since(self.last_refresh) >= every {
                if self.queue.enqueue(JobKind::RefreshReflectors, JobOrigin::Scheduled) {
                    self.last_refresh = now;
                } else {
                    warn!("job queue full, reflector refresh retried next tick");
                }
            }
        }
    }

    fn forward_diag_request(&self) {
        let Some(kind) = self.ctx.store.take_diag_request() else {
            return;
        };
        if self.queue.enqueue(kind.job_kind(), JobOrigin::Requested) {
            debug!(diag = kind.as_str(), "queued requested diagnostic");
        } else if self.ctx.store.restore_diag_request(kind) {
            warn!(diag = kind.as_str(), "job queue full, diagnostic retried next tick");
        } else {
            debug!(diag = kind.as_str(), "diagnostic superseded by a newer request");
        }
    }
}

/// Re-resolves the reflector pair. On any failure, including a pair with
/// an empty URL, the cached set is kept.
pub fn refresh_reflectors(ctx: &MonitorContext) -> Result<(), ProbeError> {
    let set = resolve_reflectors(&ctx.config.reflectors, ctx.client.as_ref())?;
    info!(near = %set.near_url, far = %set.far_url, "reflectors refreshed");
    ctx.store.set_reflectors(set);
    Ok(())
}

/// Handle to the scheduler thread. Dropping it stops the thread.
pub struct Scheduler {
    stop_tx: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Scheduler {
    pub fn spawn(ctx: MonitorContext, queue: JobQueue) -> Result<Self, MonitorError> {
        let tick = ctx.config.schedule.tick;
        let mut step = SchedulerLoop::new(ctx, queue, Instant::now());
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("backhaul-scheduler".into())
            .spawn(move || loop {
                step.tick(Instant::now());
                match stop_rx.recv_timeout(tick) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| MonitorError::Spawn {
                name: "scheduler",
                source,
            })?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.stop_tx.try_send(());
        let _ = handle.join();
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitorConfig, ReflectorConfig};
    use crate::diag::DiagKind;
    use crate::probe::testing::{context, ScriptedClient};
    use crate::store::ReflectorSet;

    fn config() -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.schedule.micro_period = Duration::from_secs(10);
        config.schedule.multi_period = Duration::from_secs(30);
        config.schedule.classify_period = Duration::from_secs(60);
        config.schedule.chg_period = Duration::from_secs(1800);
        config.schedule.reflector_refresh = Some(Duration::from_secs(600));
        config.reflectors = ReflectorConfig {
            bootstrap_url: Some("http://boot".into()),
            ..ReflectorConfig::default()
        };
        config
    }

    fn drain(queue: &JobQueue) -> Vec<(JobKind, JobOrigin)> {
        std::iter::from_fn(|| queue.try_pop())
            .map(|j| (j.kind, j.origin))
            .collect()
    }

    #[test]
    fn everything_is_due_on_first_tick() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(16);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx, queue.clone(), t0);

        step.tick(t0);
        let kinds: Vec<JobKind> = drain(&queue).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                JobKind::MicroProbe,
                JobKind::MultiReflector,
                JobKind::Chg,
                JobKind::Classify
            ]
        );

        step.tick(t0 + Duration::from_secs(5));
        assert!(queue.is_empty());
    }

    #[test]
    fn cadences_are_independent() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(64);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx, queue.clone(), t0);
        step.tick(t0);
        drain(&queue);

        step.tick(t0 + Duration::from_secs(10));
        assert_eq!(drain(&queue), vec![(JobKind::MicroProbe, JobOrigin::Scheduled)]);

        step.tick(t0 + Duration::from_secs(30));
        let kinds: Vec<JobKind> = drain(&queue).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![JobKind::MicroProbe, JobKind::MultiReflector]);

        step.tick(t0 + Duration::from_secs(60));
        let kinds: Vec<JobKind> = drain(&queue).into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![JobKind::MicroProbe, JobKind::MultiReflector, JobKind::Classify]
        );
    }

    #[test]
    fn dropped_job_is_retried_next_tick() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(2);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx, queue.clone(), t0);

        step.tick(t0);
        assert_eq!(queue.len(), 2);
        drain(&queue);

        // chg and classify were dropped; they are still due.
        step.tick(t0 + Duration::from_millis(200));
        let kinds: Vec<JobKind> = drain(&queue).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, vec![JobKind::Chg, JobKind::Classify]);
    }

    #[test]
    fn diag_request_goes_first() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(16);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx.clone(), queue.clone(), t0);
        step.tick(t0);
        drain(&queue);

        ctx.store.request_diag(DiagKind::Chg);
        ctx.store.request_diag(DiagKind::Parallel);
        step.tick(t0 + Duration::from_secs(10));
        assert_eq!(
            drain(&queue),
            vec![
                (JobKind::DiagParallel, JobOrigin::Requested),
                (JobKind::MicroProbe, JobOrigin::Scheduled)
            ]
        );
        assert_eq!(ctx.store.pending_diag(), None);
    }

    #[test]
    fn diag_request_survives_full_queue() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(1);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx.clone(), queue.clone(), t0);
        assert!(queue.enqueue(JobKind::Classify, JobOrigin::Scheduled));

        ctx.store.request_diag(DiagKind::Bufferbloat);
        step.tick(t0);
        assert_eq!(ctx.store.pending_diag(), Some(DiagKind::Bufferbloat));

        drain(&queue);
        step.tick(t0 + Duration::from_millis(200));
        assert_eq!(
            queue.try_pop().map(|j| (j.kind, j.origin)),
            Some((JobKind::DiagBufferbloat, JobOrigin::Requested))
        );
    }

    #[test]
    fn reflector_refresh_is_queued_for_the_worker() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(64);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx.clone(), queue.clone(), t0);
        step.tick(t0);
        drain(&queue);

        step.tick(t0 + Duration::from_secs(599));
        assert!(!drain(&queue)
            .iter()
            .any(|(k, _)| *k == JobKind::RefreshReflectors));

        step.tick(t0 + Duration::from_secs(600));
        assert!(drain(&queue).contains(&(JobKind::RefreshReflectors, JobOrigin::Scheduled)));

        step.tick(t0 + Duration::from_secs(601));
        assert!(queue.is_empty());
    }

    #[test]
    fn static_reflectors_are_never_refreshed() {
        let mut config = config();
        config.reflectors.near_url = Some("http://n".into());
        config.reflectors.far_url = Some("http://f".into());
        let (ctx, _) = context(config, ScriptedClient::new());
        let queue = JobQueue::new(64);
        let t0 = Instant::now();
        let mut step = SchedulerLoop::new(ctx, queue.clone(), t0);

        step.tick(t0 + Duration::from_secs(3600));
        assert!(!drain(&queue)
            .iter()
            .any(|(k, _)| *k == JobKind::RefreshReflectors));
    }

    #[test]
    fn refresh_replaces_cached_set() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        ctx.store
            .set_reflectors(ReflectorSet::new("http://old-near", "http://old-far"));

        refresh_reflectors(&ctx).unwrap();
        let set = ctx.store.reflectors();
        assert_eq!(set.near_url, crate::probe::testing::NEAR);
        assert_eq!(set.far_url, crate::probe::testing::FAR);
    }

    #[test]
    fn refresh_with_empty_far_keeps_cached_set() {
        let mut client = ScriptedClient::new();
        client.bootstrap = ReflectorSet::new("http://new-near", "");
        let (ctx, _) = context(config(), client);
        ctx.store
            .set_reflectors(ReflectorSet::new("http://old-near", "http://old-far"));

        let err = refresh_reflectors(&ctx).unwrap_err();
        assert!(matches!(err, ProbeError::MissingReflector("far")));
        let set = ctx.store.reflectors();
        assert_eq!(set.near_url, "http://old-near");
        assert_eq!(set.far_url, "http://old-far");
    }

    #[test]
    fn thread_stops_promptly() {
        let (ctx, _) = context(config(), ScriptedClient::new());
        let queue = JobQueue::new(16);
        let mut scheduler = Scheduler::spawn(ctx, queue.clone()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while queue.is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!queue.is_empty());
        scheduler.stop();
        scheduler.stop();
    }
}
