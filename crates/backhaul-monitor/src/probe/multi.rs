use tracing::debug;

use crate::error::ProbeError;
use crate::runtime::MonitorContext;
use crate::sample::MicroSample;

/// Pings near then far and records both. With either URL missing nothing
/// is recorded.
pub fn run(ctx: &MonitorContext) -> Result<(), ProbeError> {
    let reflectors = ctx.store.reflectors();
    if reflectors.near_url.is_empty() {
        return Err(ProbeError::MissingReflector("near"));
    }
    if reflectors.far_url.is_empty() {
        return Err(ProbeError::MissingReflector("far"));
    }

    let near = ctx.client.ping(&reflectors.near_url);
    let far = ctx.client.ping(&reflectors.far_url);
    ctx.store
        .add_near(MicroSample::new(near.ok, near.ttfb_ms, near.stalled));
    ctx.store
        .add_far(MicroSample::new(far.ok, far.ttfb_ms, far.stalled));
    debug!(
        near_ok = near.ok,
        near_ttfb_ms = near.ttfb_ms,
        far_ok = far.ok,
        far_ttfb_ms = far.ttfb_ms,
        "multi-reflector probe"
    );

    if !near.ok {
        return Err(ProbeError::PingFailed {
            url: reflectors.near_url.clone(),
            http_code: near.http_code,
        });
    }
    if !far.ok {
        return Err(ProbeError::PingFailed {
            url: reflectors.far_url.clone(),
            http_code: far.http_code,
        });
    }
    Ok(())
}
