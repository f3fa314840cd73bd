use tracing::debug;

use crate::diag::DiagKind;
use crate::error::ProbeError;
use crate::runtime::MonitorContext;

/// Baseline TTFB at or below this is too small to divide by.
const MIN_BASELINE_MS: f64 = 1.0;

/// Ping, upload pulse, ping again. The loaded/idle TTFB ratio is written
/// straight into the published metrics; `0.0` when it cannot be computed.
pub fn run(ctx: &MonitorContext) -> Result<f64, ProbeError> {
    let reflectors = ctx.store.reflectors();
    let near = super::near_url(&reflectors)?;
    ctx.store.tag_diagnostic(DiagKind::Bufferbloat);

    let baseline = ctx.client.ping(near);
    let pulse = ctx
        .client
        .upload(near, ctx.config.diagnostics.bufferbloat_pulse_bytes);
    let loaded = ctx.client.ping(near);

    let factor = if baseline.ok && loaded.ok && baseline.ttfb_ms > MIN_BASELINE_MS {
        loaded.ttfb_ms / baseline.ttfb_ms
    } else {
        0.0
    };
    ctx.store.set_bufferbloat(factor);
    debug!(
        baseline_ms = baseline.ttfb_ms,
        loaded_ms = loaded.ttfb_ms,
        pulse_ok = pulse.ok,
        factor,
        "bufferbloat diagnostic"
    );

    if !baseline.ok {
        return Err(ProbeError::PingFailed {
            url: near.to_string(),
            http_code: baseline.http_code,
        });
    }
    if !loaded.ok {
        return Err(ProbeError::PingFailed {
            url: near.to_string(),
            http_code: loaded.http_code,
        });
    }
    Ok(factor)
}
