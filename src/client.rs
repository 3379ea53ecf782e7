//! Dashboard REST API Client
//!
//! HTTP client for the analytics backend. Covers the endpoints the job
//! tracking flow needs: report uploads, OCA sync triggers, job status and
//! the dashboard data refetched after a sync.
//!
//! All paths are relative to `<base_url>/api/`. The session cookie set by the
//! backend is kept in the client's cookie store.

use crate::jobs::{JobId, JobState, OperationKind, ReportType, StatusSource, SyncRange};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Backend REST API client
#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: Client,
    config: ClientConfig,
}

/// Configuration for the backend client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend host, without the `/api` suffix (e.g., "http://localhost:3001")
    pub base_url: String,
    /// Per-request timeout; `None` waits for the connection to resolve
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001".to_string(),
            request_timeout: None,
        }
    }
}

/// Query parameters for dashboard data
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl DashboardClient {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Upload a report file; the backend answers with the processing job id
    pub async fn upload_report(
        &self,
        report: ReportType,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<JobAccepted, ClientError> {
        let url = self.url(report.kind().start_endpoint());
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        tracing::debug!(report = %report, file = %file_name, "Uploading report");
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    /// Start a manual OCA sync for a date range
    pub async fn trigger_oca_sync(&self, range: &SyncRange) -> Result<JobAccepted, ClientError> {
        let url = self.url(OperationKind::ManualSync.start_endpoint());

        let response = self
            .client
            .post(&url)
            .json(range)
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    /// Start the daily OCA sync
    ///
    /// The backend may finish synchronously, in which case no job id is
    /// returned.
    pub async fn sync_daily_oca(&self) -> Result<DailySyncResponse, ClientError> {
        let url = self.url(OperationKind::DailySync.start_endpoint());

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    /// Fetch the raw status of a job
    pub async fn job_status(
        &self,
        kind: OperationKind,
        id: &JobId,
    ) -> Result<StatusResponse, ClientError> {
        let url = self.url(&kind.status_endpoint(id));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_send_error)?;

        read_json(response).await
    }

    /// When the backend last completed a sync (display string, WIB)
    pub async fn last_sync(&self) -> Result<LastSyncResponse, ClientError> {
        self.get_json("schedule/last-sync", None).await
    }

    /// Dashboard summary figures (opaque to this crate)
    pub async fn dashboard_summary(
        &self,
        range: Option<&DashboardRange>,
    ) -> Result<serde_json::Value, ClientError> {
        self.get_json("dashboard/summary", range).await
    }

    /// Per-channel breakdown (opaque to this crate)
    pub async fn dashboard_channels(
        &self,
        range: Option<&DashboardRange>,
    ) -> Result<serde_json::Value, ClientError> {
        self.get_json("dashboard/channels", range).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        range: Option<&DashboardRange>,
    ) -> Result<T, ClientError> {
        let mut request = self.client.get(self.url(path));
        if let Some(range) = range {
            request = request.query(range);
        }

        let response = request.send().await.map_err(map_send_error)?;
        read_json(response).await
    }
}

#[async_trait]
impl StatusSource for DashboardClient {
    async fn job_status(&self, kind: OperationKind, id: &JobId) -> Result<JobState, ClientError> {
        DashboardClient::job_status(self, kind, id)
            .await
            .map(StatusResponse::into_state)
    }
}

fn map_send_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_connect() {
        ClientError::Unavailable
    } else {
        ClientError::Request(e)
    }
}

/// Decode a success body, or turn the `{message}` error body into an error
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let text = response.text().await.map_err(map_send_error)?;

    if status.is_success() {
        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    } else {
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.message);
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

// ============================================
// Request/Response DTOs
// ============================================

/// Response to a request that starts a job
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
}

/// Response to the daily sync trigger
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySyncResponse {
    pub job_id: Option<JobId>,
    pub last_sync: Option<String>,
    pub message: Option<String>,
}

/// Raw job status as returned by the status endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    /// Interpret the status; anything other than `completed`/`failed` means
    /// the job is still running
    pub fn into_state(self) -> JobState {
        match self.status.as_str() {
            "completed" => JobState::Completed {
                result: self.result.unwrap_or(serde_json::Value::Null),
            },
            "failed" => JobState::Failed {
                error: self.error.unwrap_or_else(|| "Processing failed".to_string()),
            },
            _ => JobState::Active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSyncResponse {
    pub last_sync_wib: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ============================================
// Errors
// ============================================

/// Errors that can occur when talking to the backend
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Backend unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Api { status: u16, message: Option<String> },

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Request timeout")]
    Timeout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Message supplied by the backend in its error body, if any
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            ClientError::Api {
                message: Some(message),
                ..
            } if !message.is_empty() => Some(message.as_str()),
            _ => None,
        }
    }
}
