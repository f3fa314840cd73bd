//! Concurrent-download diagnostic. Streams run on scoped threads and are
//! all joined before the sample is recorded.

use std::io;
use std::thread::{self, ScopedJoinHandle};

use tracing::{debug, warn};

use crate::client::TransferResult;
use crate::config::{MAX_PARALLEL_STREAMS, MIN_PARALLEL_STREAMS};
use crate::diag::DiagKind;
use crate::error::ProbeError;
use crate::runtime::MonitorContext;
use crate::sample::{unix_now, ChgSample};

pub fn run(ctx: &MonitorContext) -> Result<ChgSample, ProbeError> {
    let reflectors = ctx.store.reflectors();
    let near = super::near_url(&reflectors)?;
    ctx.store.tag_diagnostic(DiagKind::Parallel);

    let diag = &ctx.config.diagnostics;
    let streams = diag
        .parallel_streams
        .clamp(MIN_PARALLEL_STREAMS, MAX_PARALLEL_STREAMS);
    let per_stream = (diag.parallel_max_bytes_total / streams as u64).max(ctx.config.chg.min_bytes);
    let client = ctx.client.as_ref();

    let results: Vec<TransferResult> = thread::scope(|s| {
        let handles: Vec<_> = (0..streams)
            .map(|i| {
                thread::Builder::new()
                    .name(format!("backhaul-parallel-{i}"))
                    .spawn_scoped(s, move || client.download(near, per_stream))
            })
            .collect();
        join_streams(handles)
    });

    let ok: Vec<&TransferResult> = results.iter().filter(|r| r.ok).collect();
    let sample = ChgSample {
        ts: unix_now(),
        ok: !ok.is_empty(),
        dl_mbps: ok.iter().map(|r| r.mbps).sum(),
        ul_mbps: 0.0,
        dl_seconds: ok.iter().map(|r| r.seconds).fold(0.0, f64::max),
        ul_seconds: 0.0,
    };
    ctx.store.add_chg(sample);
    debug!(
        streams,
        per_stream,
        succeeded = ok.len(),
        dl_mbps = sample.dl_mbps,
        "parallel diagnostic"
    );

    if sample.ok {
        Ok(sample)
    } else {
        Err(ProbeError::AllTransfersFailed { attempts: streams })
    }
}

/// A stream whose thread could not be spawned, or that panicked, counts
/// as a failed transfer.
fn join_streams(handles: Vec<io::Result<ScopedJoinHandle<'_, TransferResult>>>) -> Vec<TransferResult> {
    handles
        .into_iter()
        .map(|spawned| match spawned {
            Ok(handle) => handle.join().unwrap_or_else(|_| TransferResult::failed(0)),
            Err(e) => {
                warn!(error = %e, "could not spawn parallel stream");
                TransferResult::failed(0)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MonitorConfig;
    use crate::probe::testing::{context, transfer, ScriptedClient};

    fn config(streams: usize, total: u64) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.diagnostics.parallel_streams = streams;
        config.diagnostics.parallel_max_bytes_total = total;
        config.chg.min_bytes = 1000;
        config
    }

    #[test]
    fn sums_successful_streams() {
        let client = ScriptedClient::new();
        client.script_downloads([
            transfer(true, 12.0),
            transfer(false, 0.0),
            transfer(true, 12.0),
            transfer(true, 12.0),
        ]);
        let (ctx, client) = context(config(4, 400_000), client);

        let sample = run(&ctx).unwrap();
        assert!(sample.ok);
        assert_eq!(sample.dl_mbps, 36.0);
        assert_eq!(sample.ul_mbps, 0.0);
        assert_eq!(*client.download_sizes.lock().unwrap(), vec![100_000; 4]);
        assert_eq!(ctx.store.snapshot().last_diag_name, "parallel");
    }

    #[test]
    fn stream_count_and_size_are_clamped() {
        let (ctx, client) = context(config(1, 500), ScriptedClient::new());
        run(&ctx).unwrap();
        // two streams minimum, each floored to the minimum transfer size
        assert_eq!(*client.download_sizes.lock().unwrap(), vec![1000, 1000]);
    }

    #[test]
    fn all_streams_failing_is_a_failed_sample() {
        let mut client = ScriptedClient::new();
        client.default_transfer = transfer(false, 0.0);
        let (ctx, _) = context(config(3, 300_000), client);

        assert!(matches!(
            run(&ctx),
            Err(ProbeError::AllTransfersFailed { attempts: 3 })
        ));
        let chg = ctx.store.aggregates().chg;
        assert_eq!((chg.count, chg.ok_count), (1, 0));
    }

    #[test]
    fn stream_that_cannot_spawn_counts_as_failed() {
        let results = thread::scope(|s| {
            let handles = vec![
                Ok(s.spawn(|| transfer(true, 15.0))),
                Err(io::Error::other("thread limit reached")),
            ];
            join_streams(handles)
        });
        assert_eq!(results.len(), 2);
        assert!(results[0].ok);
        assert_eq!(results[0].mbps, 15.0);
        assert!(!results[1].ok);
    }
}
