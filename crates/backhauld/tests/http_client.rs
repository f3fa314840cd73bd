//! The blocking reflector client against the test reflector on a real
//! socket.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use backhaul_monitor::config::{MonitorConfig, ReflectorConfig, TransportConfig};
use backhaul_monitor::{BackhaulState, MonitorRuntime, ProbeError, ReflectorClient};
use backhauld::http_client::HttpReflectorClient;
use backhauld::reflector::{self, Faults, ReflectorState};

/// Binds `127.0.0.1:0` and serves the reflector from a background runtime.
fn spawn_reflector(configure: impl FnOnce(&mut ReflectorState)) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let mut state = ReflectorState::new(format!("http://{addr}"));
    configure(&mut state);

    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, reflector::router(state)).await.unwrap();
        });
    });
    addr
}

fn client() -> HttpReflectorClient {
    HttpReflectorClient::new(&TransportConfig {
        connect_timeout: Duration::from_secs(2),
        total_timeout: Duration::from_secs(5),
        stall_threshold_ms: 1000.0,
    })
    .unwrap()
}

#[test]
fn ping_download_upload_round_trip() {
    let addr = spawn_reflector(|_| {});
    let base = format!("http://{addr}/reflector");
    let client = client();

    let ping = client.ping(&base);
    assert!(ping.ok, "{ping:?}");
    assert_eq!(ping.http_code, 200);
    assert!(ping.ttfb_ms > 0.0);
    assert!(ping.total_ms >= ping.ttfb_ms);
    assert!(!ping.stalled);

    let dl = client.download(&base, 256 * 1024);
    assert!(dl.ok, "{dl:?}");
    assert!(dl.mbps > 0.0);
    assert!(dl.seconds > 0.0);

    let ul = client.upload(&base, 128 * 1024);
    assert!(ul.ok, "{ul:?}");
    assert!(ul.mbps > 0.0);
}

#[test]
fn bootstrap_returns_reflector_pair() {
    let addr = spawn_reflector(|_| {});
    let set = client()
        .fetch_reflectors(&format!("http://{addr}/reflector"))
        .unwrap();
    assert_eq!(set.near_url, format!("http://{addr}/reflector"));
    assert_eq!(set.far_url, set.near_url);
    assert!(set.ts > 0);
}

#[test]
fn oversized_download_is_refused() {
    let addr = spawn_reflector(|s| s.max_download_bytes = 1024);
    let dl = client().download(&format!("http://{addr}/reflector"), 4096);
    assert!(!dl.ok);
    assert_eq!(dl.http_code, 413);
}

#[test]
fn oversized_upload_is_refused() {
    let addr = spawn_reflector(|s| s.max_upload_bytes = 1024);
    let ul = client().upload(&format!("http://{addr}/reflector"), 16 * 1024);
    assert!(!ul.ok);
    assert_eq!(ul.http_code, 413);
}

#[test]
fn injected_loss_fails_pings() {
    let addr = spawn_reflector(|s| {
        s.faults = Faults {
            loss_pct: Some(100.0),
            ..Faults::default()
        }
    });
    let ping = client().ping(&format!("http://{addr}/reflector"));
    assert!(!ping.ok);
    assert_eq!(ping.http_code, 503);
}

#[test]
fn injected_latency_marks_stall() {
    let addr = spawn_reflector(|s| {
        s.faults = Faults {
            latency_ms: Some(150),
            ..Faults::default()
        }
    });
    let client = HttpReflectorClient::new(&TransportConfig {
        stall_threshold_ms: 100.0,
        ..TransportConfig::default()
    })
    .unwrap();
    let ping = client.ping(&format!("http://{addr}/reflector"));
    assert!(ping.ok);
    assert!(ping.ttfb_ms >= 150.0);
    assert!(ping.stalled);
}

#[test]
fn unreachable_reflector_is_a_failed_ping() {
    // Bind then drop to get a port nobody listens on.
    let addr = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let ping = client().ping(&format!("http://{addr}/reflector"));
    assert!(!ping.ok);
    assert_eq!(ping.http_code, 0);

    let err = client()
        .fetch_reflectors(&format!("http://{addr}/reflector"))
        .unwrap_err();
    assert!(matches!(err, ProbeError::Bootstrap(_)));
}

#[test]
fn monitor_against_live_reflector_reports_good() {
    let addr = spawn_reflector(|_| {});
    let mut config = MonitorConfig::default();
    config.reflectors = ReflectorConfig {
        bootstrap_url: Some(format!("http://{addr}/reflector")),
        ..ReflectorConfig::default()
    };
    config.schedule.tick = Duration::from_millis(10);
    config.schedule.micro_period = Duration::from_millis(50);
    config.schedule.multi_period = Duration::from_millis(50);
    config.schedule.classify_period = Duration::from_millis(100);
    config.chg.warmup_bytes = 0;
    config.chg.min_bytes = 64 * 1024;
    config.chg.samples = 1;

    let mut runtime = MonitorRuntime::start(config, Arc::new(client())).unwrap();
    let deadline = Instant::now() + Duration::from_secs(15);
    while runtime.snapshot().backhaul_state != BackhaulState::Good && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    let snap = runtime.snapshot();
    assert_eq!(snap.backhaul_state, BackhaulState::Good);
    assert!(snap.near_ttfb_median_ms > 0.0);
    runtime.shutdown();
}
