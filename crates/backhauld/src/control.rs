//! Control API over the monitor's metrics store.
//!
//! ```text
//! GET  /health
//! GET  /v1/status          published health snapshot
//! GET  /v1/metrics         live aggregates + status
//! GET  /v1/reflectors      cached near/far pair
//! POST /v1/diag/{kind}     chg | parallel | bufferbloat → 202
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use backhaul_monitor::{
    BackhaulAggregates, BackhaulMetrics, DiagKind, MetricsStore, ReflectorSet, UnknownDiagKind,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ── Responses ───────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsResponse {
    micro_sample_count: usize,
    multi_near_sample_count: usize,
    multi_far_sample_count: usize,
    chg_sample_count: usize,
    #[serde(flatten)]
    aggregates: BackhaulAggregates,
    status: BackhaulMetrics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DiagAccepted {
    accepted: &'static str,
    /// Earlier request that had not run yet and was overwritten.
    replaced: Option<&'static str>,
}

// ── Router ──────────────────────────────────────────────────────────

pub fn router(store: Arc<MetricsStore>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/status", get(status))
        .route("/v1/metrics", get(metrics))
        .route("/v1/reflectors", get(reflectors))
        .route("/v1/diag/{kind}", post(request_diag))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// Serves the control API until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    store: Arc<MetricsStore>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("control API on http://{}", listener.local_addr()?);
    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn status(State(store): State<Arc<MetricsStore>>) -> Json<BackhaulMetrics> {
    Json(store.snapshot())
}

async fn metrics(State(store): State<Arc<MetricsStore>>) -> Json<MetricsResponse> {
    let aggregates = store.aggregates();
    Json(MetricsResponse {
        micro_sample_count: aggregates.micro.count,
        multi_near_sample_count: aggregates.near.count,
        multi_far_sample_count: aggregates.far.count,
        chg_sample_count: aggregates.chg.count,
        aggregates,
        status: store.snapshot(),
    })
}

async fn reflectors(State(store): State<Arc<MetricsStore>>) -> Json<ReflectorSet> {
    Json(store.reflectors().as_ref().clone())
}

async fn request_diag(
    State(store): State<Arc<MetricsStore>>,
    Path(kind): Path<String>,
) -> Result<(StatusCode, Json<DiagAccepted>), ApiError> {
    let kind: DiagKind = kind
        .parse()
        .map_err(|e: UnknownDiagKind| ApiError::bad_request(e.to_string()))?;
    let replaced = store.request_diag(kind);
    tracing::info!(diag = kind.as_str(), replaced = ?replaced, "diagnostic requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(DiagAccepted {
            accepted: kind.as_str(),
            replaced: replaced.map(DiagKind::as_str),
        }),
    ))
}
