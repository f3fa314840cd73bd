//! Control API tests through axum's tower service interface (no TCP).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use backhaul_monitor::config::BufferConfig;
use backhaul_monitor::sample::MicroSample;
use backhaul_monitor::{BackhaulMetrics, BackhaulState, DiagKind, LinkGuess, MetricsStore, ReflectorSet};
use http_body_util::BodyExt;
use tower::ServiceExt;

fn store() -> Arc<MetricsStore> {
    Arc::new(MetricsStore::new(&BufferConfig::default()).unwrap())
}

async fn json_body(resp: axum::response::Response) -> serde_json::Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        let text = String::from_utf8_lossy(&bytes);
        panic!("not valid JSON: {text}");
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let app = backhauld::control::router(store());
    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["status"], "ok");
}

#[tokio::test]
async fn status_serves_published_snapshot() {
    let store = store();
    store.publish(BackhaulMetrics {
        backhaul_state: BackhaulState::Degraded,
        link_guess: LinkGuess::CellularLike,
        confidence: 0.6,
        probe_success_rate_pct: 90.0,
        ..BackhaulMetrics::default()
    });
    let app = backhauld::control::router(store);

    let resp = app.oneshot(get("/v1/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["backhaulState"], "DEGRADED");
    assert_eq!(body["linkGuess"], "CELLULAR_LIKE");
    assert_eq!(body["confidence"], 0.6);
    assert_eq!(body["probeSuccessRatePct"], 90.0);
    assert_eq!(body["lastDiagName"], "");
}

#[tokio::test]
async fn metrics_include_counts_aggregates_and_status() {
    let store = store();
    for ttfb in [10.0, 20.0, 30.0] {
        store.add_near(MicroSample::new(true, ttfb, false));
    }
    store.add_micro(MicroSample::new(false, 0.0, false));
    let app = backhauld::control::router(store);

    let body = json_body(app.oneshot(get("/v1/metrics")).await.unwrap()).await;
    assert_eq!(body["multiNearSampleCount"], 3);
    assert_eq!(body["multiFarSampleCount"], 0);
    assert_eq!(body["microSampleCount"], 1);
    assert_eq!(body["chgSampleCount"], 0);
    assert_eq!(body["near"]["ttfbMedianMs"], 20.0);
    assert_eq!(body["micro"]["successRatePct"], 0.0);
    assert_eq!(body["status"]["backhaulState"], "UNKNOWN");
}

#[tokio::test]
async fn reflectors_are_exposed() {
    let store = store();
    store.set_reflectors(ReflectorSet::new("http://near/reflector", "http://far/reflector"));
    let app = backhauld::control::router(store);

    let body = json_body(app.oneshot(get("/v1/reflectors")).await.unwrap()).await;
    assert_eq!(body["nearUrl"], "http://near/reflector");
    assert_eq!(body["farUrl"], "http://far/reflector");
}

#[tokio::test]
async fn diag_request_is_accepted_and_queued_in_slot() {
    let store = store();
    let app = backhauld::control::router(store.clone());

    let resp = app.clone().oneshot(post("/v1/diag/chg")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    let body = json_body(resp).await;
    assert_eq!(body["accepted"], "chg");
    assert!(body["replaced"].is_null());

    let resp = app.oneshot(post("/v1/diag/bufferbloat")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(resp).await["replaced"], "chg");

    assert_eq!(store.take_diag_request(), Some(DiagKind::Bufferbloat));
}

#[tokio::test]
async fn unknown_diag_is_rejected() {
    let store = store();
    let app = backhauld::control::router(store.clone());

    let resp = app.oneshot(post("/v1/diag/speedtest")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("speedtest"));
    assert_eq!(store.pending_diag(), None);
}
