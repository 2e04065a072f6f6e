//! HTTP API for ingestion, analytics queries, health checks and Prometheus metrics

use crate::validation::{MetricPayload, ValidationError};
use analytics_lib::{
    health::{CacheStatus, ComponentStatus, HealthRegistry, ReadinessResponse},
    AnalyticsEngine, AnomalyRecord, EngineError, EngineMetrics, Observation,
};
use axum::{
    body::Bytes,
    extract::{MatchedPath, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

const DEFAULT_ANOMALY_LIMIT: usize = 10;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnalyticsEngine>,
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
}

impl AppState {
    pub fn new(
        engine: Arc<AnalyticsEngine>,
        health_registry: HealthRegistry,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            engine,
            health_registry,
            metrics,
        }
    }
}

/// Errors returned to HTTP clients as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::InvalidJson(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Engine(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub rolling_avg: f64,
    /// Always null: detection runs after the request returns
    pub is_anomaly: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_metrics: u64,
    pub anomalies_detected: u64,
    pub anomaly_rate_percent: f64,
    pub rolling_average_rps: f64,
    pub window_size: usize,
    pub current_window: Vec<Observation>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnomaliesResponse {
    pub recent_anomalies: Vec<AnomalyRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub cache_size_bytes: u64,
    pub cache_size_mb: f64,
}

#[derive(Debug, Deserialize)]
pub struct AnomaliesQuery {
    limit: Option<usize>,
}

/// Accept one observation for asynchronous processing
///
/// The body is parsed by hand so that every malformed payload maps to 400.
async fn submit_metric(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    let payload: MetricPayload = serde_json::from_slice(&body)?;
    let observation = payload.into_observation()?;
    let timestamp = observation.timestamp;

    let ack = state.engine.submit(observation).await?;

    Ok(Json(SubmitResponse {
        status: "processed".to_string(),
        timestamp,
        rolling_avg: ack.rolling_average,
        is_anomaly: ack.is_anomaly,
    }))
}

async fn analytics_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.engine.stats().await;
    let window = state.engine.current_window().await;

    Json(StatsResponse {
        total_metrics: stats.total_processed,
        anomalies_detected: stats.anomalies_detected,
        anomaly_rate_percent: stats.anomaly_rate_percent,
        rolling_average_rps: stats.rolling_average,
        window_size: window.len(),
        current_window: window,
    })
}

async fn recent_anomalies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AnomaliesQuery>,
) -> Json<AnomaliesResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_ANOMALY_LIMIT);
    Json(AnomaliesResponse {
        recent_anomalies: state.engine.recent_anomalies(limit).await,
    })
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Json<CacheStatsResponse> {
    let bytes = state.engine.cache_footprint().await;
    Json(CacheStatsResponse {
        cache_size_bytes: bytes,
        cache_size_mb: bytes as f64 / 1024.0 / 1024.0,
    })
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = CacheStatus::from_probe(state.engine.store_healthy().await);
    let health = state.health_registry.health(cache).await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = if state.engine.is_running().await {
        state.health_registry.readiness().await
    } else {
        ReadinessResponse {
            ready: false,
            reason: Some("Analytics engine not running".to_string()),
        }
    };

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Count and time every routed request, labelled by its route template
async fn track_http(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let started = Instant::now();
    let response = next.run(request).await;

    state.metrics.observe_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/analytics/metrics", post(submit_metric))
        .route("/api/analytics/stats", get(analytics_stats))
        .route("/api/analytics/anomalies", get(recent_anomalies))
        .route("/api/analytics/cache/stats", get(cache_stats))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(state.clone(), track_http))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves and in-flight
/// requests have finished
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API listener on {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
