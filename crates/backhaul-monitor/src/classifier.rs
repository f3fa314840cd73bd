//! Health classifier.
//!
//! Hysteresis is driven by multi-reflector runs: a run succeeds when both
//! reflectors answered. Runs recorded since the previous classification
//! are applied oldest first, re-evaluating the state after each one, so a
//! burst of runs between two classify jobs still needs the configured
//! number of consecutive outcomes to flip the state.

use tracing::debug;

use crate::config::{ClassifierConfig, LinkGuessConfig};
use crate::metrics::{BackhaulMetrics, BackhaulState, LinkGuess};
use crate::runtime::MonitorContext;
use crate::sample::unix_now;
use crate::stats::{pct, sorted_median};
use crate::store::{BackhaulAggregates, LatencyAggregates};

/// Reads aggregates and the previous record, publishes the next one.
pub fn run(ctx: &MonitorContext) -> BackhaulMetrics {
    let agg = ctx.store.aggregates();
    let prev = ctx.store.snapshot();
    let next = classify(&ctx.config.classifier, &agg, &prev, unix_now());
    debug!(
        state = next.backhaul_state.as_str(),
        link = next.link_guess.as_str(),
        confidence = next.confidence,
        consec_fails = next.consec_fails,
        consec_ok = next.consec_ok,
        "classified backhaul"
    );
    ctx.store.publish(next.clone());
    next
}

/// Inputs to the state rule besides the hysteresis counters.
struct Health {
    samples: usize,
    success_pct: f64,
    stall_pct: f64,
    cap_mbps: f64,
}

/// Pure classification step.
pub fn classify(
    cfg: &ClassifierConfig,
    agg: &BackhaulAggregates,
    prev: &BackhaulMetrics,
    now: i64,
) -> BackhaulMetrics {
    let dl_goodput = sorted_median(&agg.chg.dl_mbps);
    let ul_goodput = sorted_median(&agg.chg.ul_mbps);

    // Multi-reflector rings when populated, micro otherwise.
    let (samples, ok, stalled) = if agg.near.count + agg.far.count > 0 {
        (
            agg.near.count + agg.far.count,
            agg.near.ok_count + agg.far.ok_count,
            agg.near.stall_count + agg.far.stall_count,
        )
    } else {
        (agg.micro.count, agg.micro.ok_count, agg.micro.stall_count)
    };
    let health = Health {
        samples,
        success_pct: pct(ok, samples),
        stall_pct: pct(stalled, samples),
        cap_mbps: detect_cap(cfg, &agg.chg.dl_mbps),
    };

    let new_runs = agg.multi_runs.saturating_sub(prev.multi_runs_classified);
    let fresh = usize::try_from(new_runs)
        .unwrap_or(usize::MAX)
        .min(agg.multi_outcomes.len());
    let outcomes = &agg.multi_outcomes[agg.multi_outcomes.len() - fresh..];

    let mut consec_fails = prev.consec_fails;
    let mut consec_ok = prev.consec_ok;
    let mut state = prev.backhaul_state;
    for &run_ok in outcomes {
        if run_ok {
            consec_ok = consec_ok.saturating_add(1);
            consec_fails = 0;
        } else {
            consec_fails = consec_fails.saturating_add(1);
            consec_ok = 0;
        }
        state = next_state(cfg, consec_fails, consec_ok, state, &health);
    }
    state = next_state(cfg, consec_fails, consec_ok, state, &health);

    let latency = if agg.near.count > 0 { &agg.near } else { &agg.micro };
    let (link_guess, confidence) = guess_link(&cfg.link_guess, latency, dl_goodput);

    BackhaulMetrics {
        backhaul_state: state,
        link_guess,
        confidence,
        consec_fails,
        consec_ok,
        multi_runs_classified: agg.multi_runs,
        dl_goodput_mbps: dl_goodput,
        ul_goodput_mbps: ul_goodput,
        bufferbloat_inflation_factor: prev.bufferbloat_inflation_factor,
        cap_detected_mbps: health.cap_mbps,
        near_ttfb_median_ms: agg.near.ttfb_median_ms,
        near_ttfb_p95_ms: agg.near.ttfb_p95_ms,
        near_ttfb_p99_ms: agg.near.ttfb_p99_ms,
        far_ttfb_median_ms: agg.far.ttfb_median_ms,
        far_ttfb_p95_ms: agg.far.ttfb_p95_ms,
        far_ttfb_p99_ms: agg.far.ttfb_p99_ms,
        probe_success_rate_pct: health.success_pct,
        stall_rate_pct: health.stall_pct,
        last_micro_ts: agg.micro.newest_ts,
        last_multi_ts: agg.near.newest_ts.max(agg.far.newest_ts),
        last_chg_ts: agg.chg.newest_ts,
        last_classify_ts: now,
        last_diag_ts: prev.last_diag_ts,
        last_diag_name: prev.last_diag_name.clone(),
    }
}

fn next_state(
    cfg: &ClassifierConfig,
    consec_fails: u32,
    consec_ok: u32,
    prev: BackhaulState,
    health: &Health,
) -> BackhaulState {
    if consec_fails >= cfg.down_consec_fails {
        return BackhaulState::Down;
    }
    if consec_ok >= cfg.recover_consec_ok {
        return if health.cap_mbps > 0.0 {
            BackhaulState::Capped
        } else if health.stall_pct > cfg.degraded_stall_pct {
            BackhaulState::Degraded
        } else {
            BackhaulState::Good
        };
    }
    if prev == BackhaulState::Down {
        return BackhaulState::Down;
    }
    if health.samples == 0 {
        return BackhaulState::Unknown;
    }
    if health.success_pct < 100.0 || consec_fails > 0 {
        return BackhaulState::Degraded;
    }
    prev
}

/// Median of the successful download figures when at least
/// `cap_stability_pct` of them sit within `cap_band_pct` of it and it is
/// under the ceiling; `0.0` otherwise.
pub fn detect_cap(cfg: &ClassifierConfig, dl_sorted: &[f64]) -> f64 {
    if dl_sorted.is_empty() || dl_sorted.len() < cfg.cap_min_samples {
        return 0.0;
    }
    let median = sorted_median(dl_sorted);
    if median <= 0.0 || median > cfg.cap_ceiling_mbps {
        return 0.0;
    }
    let band = median * cfg.cap_band_pct / 100.0;
    let within = dl_sorted
        .iter()
        .filter(|v| (**v - median).abs() <= band)
        .count();
    if pct(within, dl_sorted.len()) >= cfg.cap_stability_pct {
        median
    } else {
        0.0
    }
}

/// Medium guess from latency shape, with a confidence scaled by how many
/// samples back it.
pub fn guess_link(
    cfg: &LinkGuessConfig,
    latency: &LatencyAggregates,
    dl_goodput_mbps: f64,
) -> (LinkGuess, f64) {
    if latency.ok_count == 0 {
        return (LinkGuess::Unknown, 0.0);
    }
    let median = latency.ttfb_median_ms;
    let spread = latency.spread_ms();
    let loss = latency.loss_pct();
    let lossy = loss >= cfg.cellular_min_loss_pct;

    let (guess, base) = if median >= cfg.geo_min_ttfb_ms {
        (LinkGuess::SatGeoLike, 0.8)
    } else if median <= cfg.terrestrial_max_ttfb_ms
        && spread <= cfg.terrestrial_max_spread_ms
        && !lossy
    {
        let base = if dl_goodput_mbps >= cfg.terrestrial_min_mbps {
            0.9
        } else {
            0.7
        };
        (LinkGuess::TerrestrialLike, base)
    } else if median <= cfg.leo_max_ttfb_ms && spread >= cfg.leo_min_spread_ms && !lossy {
        (LinkGuess::SatLeoLike, 0.6)
    } else {
        (LinkGuess::CellularLike, if lossy { 0.6 } else { 0.4 })
    };

    let support = (latency.count as f64 / cfg.min_samples.max(1) as f64).min(1.0);
    (guess, base * support)
}
