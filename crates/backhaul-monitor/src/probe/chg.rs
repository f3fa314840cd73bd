//! CHG throughput test: sized from the previous goodput, a few sequential
//! trials per direction, median of the successful ones.

use tracing::debug;

use crate::config::{ChgConfig, MAX_CHG_SAMPLES};
use crate::diag::DiagKind;
use crate::error::ProbeError;
use crate::runtime::MonitorContext;
use crate::sample::{unix_now, ChgSample};
use crate::stats::selection_median;

/// Below this previous goodput the minimum transfer size is used.
const MIN_SIZING_MBPS: f64 = 0.1;

/// Transfer size that should take about `target_seconds` at `prev_mbps`.
pub fn pick_bytes_for_target(prev_mbps: f64, cfg: &ChgConfig) -> u64 {
    if !(prev_mbps > MIN_SIZING_MBPS) {
        return cfg.min_bytes;
    }
    let bytes = prev_mbps / 8.0 * cfg.target_seconds * 1e6;
    (bytes as u64).clamp(cfg.min_bytes, cfg.max_bytes)
}

/// Successful trial figures for one direction.
#[derive(Default)]
struct Trials {
    mbps: Vec<f64>,
    seconds: Vec<f64>,
}

impl Trials {
    fn medians(mut self) -> (f64, f64) {
        (
            selection_median(&mut self.mbps),
            selection_median(&mut self.seconds),
        )
    }
}

/// Runs the test and records one sample. `on_demand` runs are tagged as
/// the `chg` diagnostic first.
pub fn run(ctx: &MonitorContext, on_demand: bool) -> Result<ChgSample, ProbeError> {
    let reflectors = ctx.store.reflectors();
    let near = super::near_url(&reflectors)?;
    if on_demand {
        ctx.store.tag_diagnostic(DiagKind::Chg);
    }

    let cfg = &ctx.config.chg;
    let prev = ctx.store.snapshot();
    let dl_bytes = pick_bytes_for_target(prev.dl_goodput_mbps, cfg);
    let ul_bytes = pick_bytes_for_target(prev.ul_goodput_mbps, cfg);
    let n = cfg.samples.clamp(1, MAX_CHG_SAMPLES);

    if cfg.warmup_bytes > 0 {
        let _ = ctx.client.download(near, cfg.warmup_bytes);
    }

    let mut dl = Trials::default();
    for _ in 0..n {
        let res = ctx.client.download(near, dl_bytes);
        if res.ok && res.mbps > 0.0 {
            dl.mbps.push(res.mbps);
            dl.seconds.push(res.seconds);
        }
    }
    let mut ul = Trials::default();
    for _ in 0..n {
        let res = ctx.client.upload(near, ul_bytes);
        if res.ok && res.mbps > 0.0 {
            ul.mbps.push(res.mbps);
            ul.seconds.push(res.seconds);
        }
    }

    let (dl_ok, ul_ok) = (dl.mbps.len(), ul.mbps.len());
    let (dl_mbps, dl_seconds) = dl.medians();
    let (ul_mbps, ul_seconds) = ul.medians();
    let sample = ChgSample {
        ts: unix_now(),
        ok: dl_ok > 0 || ul_ok > 0,
        dl_mbps,
        ul_mbps,
        dl_seconds,
        ul_seconds,
    };
    ctx.store.add_chg(sample);
    debug!(
        dl_bytes,
        ul_bytes,
        dl_ok,
        ul_ok,
        dl_mbps,
        ul_mbps,
        "chg speed test"
    );

    if sample.ok {
        Ok(sample)
    } else {
        Err(ProbeError::AllTransfersFailed { attempts: 2 * n })
    }
}
