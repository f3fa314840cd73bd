//! Bounded job queue and its single consumer thread.
//!
//! The worker strictly serializes probes and classification. Enqueueing
//! never blocks: a full queue drops the new job and the scheduler tries
//! again on its next cadence.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use quanta::Instant;
use tracing::{debug, info, warn};

use crate::classifier;
use crate::error::MonitorError;
use crate::probe::{bufferbloat, chg, micro, multi, parallel};
use crate::runtime::MonitorContext;
use crate::scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    MicroProbe,
    MultiReflector,
    Chg,
    Classify,
    DiagParallel,
    DiagBufferbloat,
    RefreshReflectors,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::MicroProbe => "micro",
            JobKind::MultiReflector => "multi",
            JobKind::Chg => "chg",
            JobKind::Classify => "classify",
            JobKind::DiagParallel => "diag-parallel",
            JobKind::DiagBufferbloat => "diag-bufferbloat",
            JobKind::RefreshReflectors => "refresh-reflectors",
        }
    }
}

/// Who asked for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOrigin {
    /// Periodic cadence.
    Scheduled,
    /// Control-plane diagnostic request.
    Requested,
}

#[derive(Debug, Clone, Copy)]
pub struct Job {
    pub kind: JobKind,
    pub origin: JobOrigin,
    pub enqueued_at: Instant,
}

/// FIFO of fixed capacity shared by the scheduler (producer) and the
/// worker (consumer).
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
    capacity: usize,
}

impl JobQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Appends a job stamped now. Returns `false`, leaving the queue
    /// untouched, when it is full.
    pub fn enqueue(&self, kind: JobKind, origin: JobOrigin) -> bool {
        let job = Job {
            kind,
            origin,
            enqueued_at: Instant::now(),
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn try_pop(&self) -> Option<Job> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards everything queued, returning how many jobs were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl WorkerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkerState::Idle,
            1 => WorkerState::Running,
            2 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// Handle to the consumer thread. Dropping it stops the thread.
pub struct Worker {
    queue: JobQueue,
    stop_tx: Sender<()>,
    stopping: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(ctx: MonitorContext, queue: JobQueue) -> Result<Self, MonitorError> {
        let (stop_tx, stop_rx) = bounded(1);
        let stopping = Arc::new(AtomicBool::new(false));
        let state = Arc::new(AtomicU8::new(WorkerState::Idle as u8));

        let job_rx = queue.rx.clone();
        let stopping_clone = stopping.clone();
        let state_clone = state.clone();
        let handle = thread::Builder::new()
            .name("backhaul-worker".into())
            .spawn(move || worker_loop(ctx, job_rx, stop_rx, stopping_clone, state_clone))
            .map_err(|source| MonitorError::Spawn {
                name: "worker",
                source,
            })?;

        Ok(Self {
            queue,
            stop_tx,
            stopping,
            state,
            handle: Some(handle),
        })
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Waits for the in-flight job, then joins the thread. Queued jobs are
    /// discarded. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stopping.store(true, Ordering::Release);
        self.state
            .store(WorkerState::Stopping as u8, Ordering::Release);
        let _ = self.stop_tx.try_send(());
        let _ = handle.join();
        let discarded = self.queue.clear();
        self.state
            .store(WorkerState::Stopped as u8, Ordering::Release);
        info!(discarded, "worker stopped");
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    ctx: MonitorContext,
    job_rx: Receiver<Job>,
    stop_rx: Receiver<()>,
    stopping: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
) {
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(job_rx) -> msg => {
                let Ok(job) = msg else { break };
                if stopping.load(Ordering::Acquire) {
                    break;
                }
                // Never overwrite Stopping.
                let _ = state.compare_exchange(
                    WorkerState::Idle as u8,
                    WorkerState::Running as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                execute(&ctx, &job);
                let _ = state.compare_exchange(
                    WorkerState::Running as u8,
                    WorkerState::Idle as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
            }
        }
    }
}

/// Runs one job on the calling thread. Probe failures are logged; the
/// next cadence retries.
pub fn execute(ctx: &MonitorContext, job: &Job) {
    let wait_ms = job.enqueued_at.elapsed().as_millis() as u64;
    let result = match job.kind {
        JobKind::MicroProbe => micro::run(ctx).map(drop),
        JobKind::MultiReflector => multi::run(ctx),
        JobKind::Chg => chg::run(ctx, job.origin == JobOrigin::Requested).map(drop),
        JobKind::Classify => {
            classifier::run(ctx);
            Ok(())
        }
        JobKind::DiagParallel => parallel::run(ctx).map(drop),
        JobKind::DiagBufferbloat => bufferbloat::run(ctx).map(drop),
        JobKind::RefreshReflectors => scheduler::refresh_reflectors(ctx),
    };
    match result {
        Ok(()) => debug!(kind = job.kind.as_str(), origin = ?job.origin, wait_ms, "job done"),
        Err(e) => warn!(kind = job.kind.as_str(), wait_ms, error = %e, "job failed"),
    }
}
