use tracing::debug;

use crate::client::PingResult;
use crate::error::ProbeError;
use crate::runtime::MonitorContext;
use crate::sample::MicroSample;

/// One ping against the near reflector into the micro ring.
pub fn run(ctx: &MonitorContext) -> Result<PingResult, ProbeError> {
    let reflectors = ctx.store.reflectors();
    let near = super::near_url(&reflectors)?;

    let res = ctx.client.ping(near);
    ctx.store
        .add_micro(MicroSample::new(res.ok, res.ttfb_ms, res.stalled));
    debug!(ok = res.ok, ttfb_ms = res.ttfb_ms, stalled = res.stalled, "micro probe");

    if res.ok {
        Ok(res)
    } else {
        Err(ProbeError::PingFailed {
            url: near.to_string(),
            http_code: res.http_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::probe::testing::{context, ScriptedClient, NEAR};
    use crate::store::ReflectorSet;

    #[test]
    fn records_one_sample_per_run() {
        let client = ScriptedClient::new();
        client.script_pings(NEAR, [PingResult::failed(0)]);
        let (ctx, _) = context(MonitorConfig::default(), client);

        assert!(run(&ctx).is_err());
        let res = run(&ctx).unwrap();
        assert_eq!(res.ttfb_ms, 20.0);

        let agg = ctx.store.aggregates().micro;
        assert_eq!(agg.count, 2);
        assert_eq!(agg.ok_count, 1);
        assert_eq!(ctx.store.aggregates().near.count, 0);
    }

    #[test]
    fn missing_near_records_nothing() {
        let (ctx, _) = context(MonitorConfig::default(), ScriptedClient::new());
        ctx.store.set_reflectors(ReflectorSet::default());
        assert!(matches!(run(&ctx), Err(ProbeError::MissingReflector("near"))));
        assert_eq!(ctx.store.aggregates().micro.count, 0);
    }
}
