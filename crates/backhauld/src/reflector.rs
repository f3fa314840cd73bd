//! Fault-injecting reflector server for local testing.
//!
//! Serves the bootstrap endpoint and the reflector protocol under
//! `/reflector`. Latency, jitter and loss can be set server-wide and
//! overridden per request with `?latency_ms=&jitter_ms=&loss_pct=`.

use std::time::Duration;

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

pub const DEFAULT_MAX_TRANSFER_BYTES: u64 = 64 * 1024 * 1024;

/// Impairments applied before answering.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct Faults {
    pub latency_ms: Option<u64>,
    pub jitter_ms: Option<u64>,
    pub loss_pct: Option<f64>,
}

impl Faults {
    /// Per-request values win over the server defaults.
    fn or(self, defaults: Faults) -> Faults {
        Faults {
            latency_ms: self.latency_ms.or(defaults.latency_ms),
            jitter_ms: self.jitter_ms.or(defaults.jitter_ms),
            loss_pct: self.loss_pct.or(defaults.loss_pct),
        }
    }

    /// Sleeps for the configured delay. Returns `false` when the request
    /// should be dropped.
    async fn apply(self) -> bool {
        let (drop_it, delay_ms) = {
            let mut rng = rand::rng();
            let loss = self.loss_pct.unwrap_or(0.0).clamp(0.0, 100.0);
            let drop_it = loss > 0.0 && rng.random_range(0.0..100.0) < loss;
            let jitter = match self.jitter_ms {
                Some(j) if j > 0 => rng.random_range(0..=j),
                _ => 0,
            };
            (drop_it, self.latency_ms.unwrap_or(0) + jitter)
        };
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        !drop_it
    }
}

#[derive(Debug, Clone)]
pub struct ReflectorState {
    /// Externally reachable origin, e.g. `http://10.0.0.5:8088`.
    pub public_base: String,
    pub faults: Faults,
    pub max_download_bytes: u64,
    pub max_upload_bytes: usize,
}

impl ReflectorState {
    pub fn new(public_base: impl Into<String>) -> Self {
        Self {
            public_base: public_base.into().trim_end_matches('/').to_string(),
            faults: Faults::default(),
            max_download_bytes: DEFAULT_MAX_TRANSFER_BYTES,
            max_upload_bytes: DEFAULT_MAX_TRANSFER_BYTES as usize,
        }
    }

    fn reflector_url(&self) -> String {
        format!("{}/reflector", self.public_base)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Bootstrap {
    reflector_near_url: String,
    reflector_far_url: String,
}

fn dropped() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "dropped by fault injection").into_response()
}

pub fn router(state: ReflectorState) -> Router {
    let upload_limit = state.max_upload_bytes;
    Router::new()
        .route("/reflector", get(bootstrap))
        .route("/reflector/v1/ping", get(ping))
        .route("/reflector/v1/download/{bytes}", get(download))
        .route(
            "/reflector/v1/upload",
            post(upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Single-host deployment: the same server answers as near and far.
async fn bootstrap(State(state): State<ReflectorState>) -> Json<Bootstrap> {
    Json(Bootstrap {
        reflector_near_url: state.reflector_url(),
        reflector_far_url: state.reflector_url(),
    })
}

async fn ping(State(state): State<ReflectorState>, Query(faults): Query<Faults>) -> Response {
    if !faults.or(state.faults).apply().await {
        return dropped();
    }
    Json(serde_json::json!({ "pong": true })).into_response()
}

async fn download(
    State(state): State<ReflectorState>,
    Path(bytes): Path<u64>,
    Query(faults): Query<Faults>,
) -> Response {
    if bytes > state.max_download_bytes {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("download limited to {} bytes", state.max_download_bytes),
        )
            .into_response();
    }
    if !faults.or(state.faults).apply().await {
        return dropped();
    }
    let Ok(len) = usize::try_from(bytes) else {
        return StatusCode::PAYLOAD_TOO_LARGE.into_response();
    };
    (
        [(axum::http::header::CONTENT_TYPE, "application/octet-stream")],
        Bytes::from(vec![0u8; len]),
    )
        .into_response()
}

async fn upload(
    State(state): State<ReflectorState>,
    Query(faults): Query<Faults>,
    body: Bytes,
) -> Response {
    if !faults.or(state.faults).apply().await {
        return dropped();
    }
    Json(serde_json::json!({ "received": body.len() })).into_response()
}
