//! Shared metrics store: sample rings, the published snapshot, the
//! reflector cache and the diagnostic request slot.
//!
//! Each piece of shared state has its own guard and no method holds more
//! than one of them at a time. Locks cover only a ring mutation or a copy;
//! statistics are computed after the lock is released.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::BufferConfig;
use crate::diag::{DiagKind, DiagSlot};
use crate::error::ConfigError;
use crate::metrics::BackhaulMetrics;
use crate::ring::SampleRing;
use crate::sample::{unix_now, ChgSample, MicroSample};
use crate::stats;

/// Near/far reflector base URLs and when they were resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectorSet {
    pub near_url: String,
    pub far_url: String,
    pub ts: i64,
}

impl ReflectorSet {
    pub fn new(near_url: impl Into<String>, far_url: impl Into<String>) -> Self {
        Self {
            near_url: near_url.into(),
            far_url: far_url.into(),
            ts: unix_now(),
        }
    }

    /// Which side, if any, has no URL.
    pub fn missing_side(&self) -> Option<&'static str> {
        if self.near_url.is_empty() {
            Some("near")
        } else if self.far_url.is_empty() {
            Some("far")
        } else {
            None
        }
    }
}

// ── Aggregates ──────────────────────────────────────────────────────

/// Latency statistics over one ping ring.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyAggregates {
    pub count: usize,
    pub ok_count: usize,
    pub stall_count: usize,
    pub ttfb_median_ms: f64,
    pub ttfb_p95_ms: f64,
    pub ttfb_p99_ms: f64,
    pub success_rate_pct: f64,
    pub stall_rate_pct: f64,
    pub newest_ts: i64,
}

impl LatencyAggregates {
    fn from_samples(samples: &[MicroSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let count = samples.len();
        let ok_count = samples.iter().filter(|s| s.ok).count();
        let stall_count = samples.iter().filter(|s| s.stalled).count();
        let sorted = stats::sorted_copy(samples.iter().map(|s| s.ttfb_ms));
        Self {
            count,
            ok_count,
            stall_count,
            ttfb_median_ms: stats::percentile(&sorted, 0.5),
            ttfb_p95_ms: stats::percentile(&sorted, 0.95),
            ttfb_p99_ms: stats::percentile(&sorted, 0.99),
            success_rate_pct: stats::pct(ok_count, count),
            stall_rate_pct: stats::pct(stall_count, count),
            newest_ts: samples.last().map(|s| s.ts).unwrap_or(0),
        }
    }

    /// p95 minus median; a cheap jitter figure.
    pub fn spread_ms(&self) -> f64 {
        (self.ttfb_p95_ms - self.ttfb_median_ms).max(0.0)
    }

    pub fn loss_pct(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            100.0 - self.success_rate_pct
        }
    }
}

/// Throughput figures over the CHG ring.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputAggregates {
    pub count: usize,
    pub ok_count: usize,
    /// Successful, positive download figures, ascending.
    pub dl_mbps: Vec<f64>,
    /// Successful, positive upload figures, ascending.
    pub ul_mbps: Vec<f64>,
    pub newest_ts: i64,
}

impl ThroughputAggregates {
    fn from_samples(samples: &[ChgSample]) -> Self {
        let ok = samples.iter().filter(|s| s.ok);
        Self {
            count: samples.len(),
            ok_count: ok.clone().count(),
            dl_mbps: stats::sorted_copy(ok.clone().map(|s| s.dl_mbps).filter(|v| *v > 0.0)),
            ul_mbps: stats::sorted_copy(ok.map(|s| s.ul_mbps).filter(|v| *v > 0.0)),
            newest_ts: samples.last().map(|s| s.ts).unwrap_or(0),
        }
    }
}

/// Fresh statistics over the current ring contents. Never stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackhaulAggregates {
    pub micro: LatencyAggregates,
    pub near: LatencyAggregates,
    pub far: LatencyAggregates,
    pub chg: ThroughputAggregates,
    /// Multi-reflector runs recorded since start-up.
    pub multi_runs: u64,
    /// Outcome (near ok AND far ok) of the runs still held in the rings,
    /// oldest first.
    #[serde(skip)]
    pub multi_outcomes: Vec<bool>,
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct SampleBuffers {
    micro: SampleRing<MicroSample>,
    near: SampleRing<MicroSample>,
    far: SampleRing<MicroSample>,
    chg: SampleRing<ChgSample>,
}

struct RawSamples {
    micro: Vec<MicroSample>,
    near: Vec<MicroSample>,
    far: Vec<MicroSample>,
    chg: Vec<ChgSample>,
    multi_runs: u64,
}

#[derive(Debug)]
pub struct MetricsStore {
    samples: Mutex<SampleBuffers>,
    published: Mutex<BackhaulMetrics>,
    reflectors: ArcSwap<ReflectorSet>,
    diag: DiagSlot,
}

fn ring<T: Copy + Default>(capacity: usize, name: &'static str) -> Result<SampleRing<T>, ConfigError> {
    SampleRing::with_capacity(capacity).ok_or(ConfigError::ZeroCapacity(name))
}

impl MetricsStore {
    pub fn new(buffers: &BufferConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            samples: Mutex::new(SampleBuffers {
                micro: ring(buffers.micro_capacity, "micro_capacity")?,
                near: ring(buffers.multi_capacity, "multi_capacity")?,
                far: ring(buffers.multi_capacity, "multi_capacity")?,
                chg: ring(buffers.chg_capacity, "chg_capacity")?,
            }),
            published: Mutex::new(BackhaulMetrics::default()),
            reflectors: ArcSwap::from_pointee(ReflectorSet::default()),
            diag: DiagSlot::new(),
        })
    }

    fn with_samples<R>(&self, f: impl FnOnce(&mut SampleBuffers) -> R) -> R {
        let mut guard = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn with_published<R>(&self, f: impl FnOnce(&mut BackhaulMetrics) -> R) -> R {
        let mut guard = self.published.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn add_micro(&self, sample: MicroSample) {
        self.with_samples(|b| b.micro.push(sample));
    }

    pub fn add_near(&self, sample: MicroSample) {
        self.with_samples(|b| b.near.push(sample));
    }

    pub fn add_far(&self, sample: MicroSample) {
        self.with_samples(|b| b.far.push(sample));
    }

    pub fn add_chg(&self, sample: ChgSample) {
        self.with_samples(|b| b.chg.push(sample));
    }

    /// Value copy of the published metrics.
    pub fn snapshot(&self) -> BackhaulMetrics {
        self.with_published(|m| m.clone())
    }

    /// Replaces the published record as a whole.
    pub fn publish(&self, metrics: BackhaulMetrics) {
        self.with_published(|m| *m = metrics);
    }

    /// Marks `kind` as the diagnostic currently running.
    pub fn tag_diagnostic(&self, kind: DiagKind) {
        let now = unix_now();
        self.with_published(|m| {
            m.last_diag_name = kind.as_str().to_string();
            m.last_diag_ts = now;
        });
    }

    pub fn set_bufferbloat(&self, factor: f64) {
        self.with_published(|m| m.bufferbloat_inflation_factor = factor);
    }

    pub fn aggregates(&self) -> BackhaulAggregates {
        let raw = self.with_samples(|b| RawSamples {
            micro: b.micro.to_vec(),
            near: b.near.to_vec(),
            far: b.far.to_vec(),
            chg: b.chg.to_vec(),
            multi_runs: b.near.total_pushed().min(b.far.total_pushed()),
        });

        let held = raw.near.len().min(raw.far.len());
        let multi_outcomes = raw.near[raw.near.len() - held..]
            .iter()
            .zip(&raw.far[raw.far.len() - held..])
            .map(|(n, f)| n.ok && f.ok)
            .collect();

        BackhaulAggregates {
            micro: LatencyAggregates::from_samples(&raw.micro),
            near: LatencyAggregates::from_samples(&raw.near),
            far: LatencyAggregates::from_samples(&raw.far),
            chg: ThroughputAggregates::from_samples(&raw.chg),
            multi_runs: raw.multi_runs,
            multi_outcomes,
        }
    }

    pub fn set_reflectors(&self, set: ReflectorSet) {
        self.reflectors.store(Arc::new(set));
    }

    pub fn reflectors(&self) -> Arc<ReflectorSet> {
        self.reflectors.load_full()
    }

    /// Returns the request this one replaced, if any.
    pub fn request_diag(&self, kind: DiagKind) -> Option<DiagKind> {
        self.diag.request(kind)
    }

    pub fn take_diag_request(&self) -> Option<DiagKind> {
        self.diag.take()
    }

    /// Re-arms a request that could not be queued. A newer request wins.
    pub fn restore_diag_request(&self, kind: DiagKind) -> bool {
        self.diag.restore(kind)
    }

    pub fn pending_diag(&self) -> Option<DiagKind> {
        self.diag.pending()
    }
}
