//! API client for communicating with the analytics server

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Status { status: StatusCode, message: String },
}

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// API client for the analytics server
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let base_url = Url::parse(base_url)?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path)?;
        let response = self.client.get(url).send().await?;
        Self::decode(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path)?;
        let response = self.client.post(url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Err(ApiError::Status { status, message })
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        self.get("api/analytics/stats").await
    }

    pub async fn anomalies(&self, limit: usize) -> Result<AnomaliesResponse> {
        self.get(&format!("api/analytics/anomalies?limit={}", limit))
            .await
    }

    pub async fn cache_stats(&self) -> Result<CacheStatsResponse> {
        self.get("api/analytics/cache/stats").await
    }

    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse> {
        self.post("api/analytics/metrics", request).await
    }

    /// Fetch the health report; an unhealthy service still returns its report
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.base_url.join("healthz")?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(response.json().await?);
        }
        Self::decode(response).await
    }

    pub async fn readiness(&self) -> Result<ReadinessResponse> {
        let url = self.base_url.join("readyz")?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(response.json().await?);
        }
        Self::decode(response).await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub device_id: String,
    pub cpu_usage: f64,
    pub memory_mb: f64,
    pub rps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total_metrics: u64,
    pub anomalies_detected: u64,
    pub anomaly_rate_percent: f64,
    pub rolling_average_rps: f64,
    pub window_size: usize,
    pub current_window: Vec<Observation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub metric: Observation,
    pub timestamp: DateTime<Utc>,
    pub rolling_avg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomaliesResponse {
    pub recent_anomalies: Vec<AnomalyRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsResponse {
    pub cache_size_bytes: u64,
    pub cache_size_mb: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub device_id: String,
    pub cpu_usage: f64,
    pub memory_mb: f64,
    pub rps: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub rolling_avg: f64,
    pub is_anomaly: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub components: HashMap<String, ComponentHealth>,
    pub cache: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
