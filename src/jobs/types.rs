//! Core data types for background job tracking
//!
//! This module defines the types shared by the submitter, registry and poller:
//! - `Job`: One tracked asynchronous backend operation
//! - `JobState`: Tagged lifecycle state carrying the result or error
//! - `OperationKind` and `ReportType`: What started the job and where it is polled
//! - `SyncRange`: Date range payload for manual OCA syncs

use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Backend-assigned job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, as shown in the processing queue
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The kind of backend operation a job represents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    UploadCsat,
    UploadOmnix,
    UploadCall,
    UploadOca,
    ManualSync,
    DailySync,
}

impl OperationKind {
    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::UploadCsat,
            OperationKind::UploadOmnix,
            OperationKind::UploadCall,
            OperationKind::UploadOca,
            OperationKind::ManualSync,
            OperationKind::DailySync,
        ]
    }

    /// Human-readable name shown next to the job label
    pub fn display_name(&self) -> &'static str {
        match self {
            OperationKind::UploadCsat => "CSAT Report",
            OperationKind::UploadOmnix => "Omnix Report",
            OperationKind::UploadCall => "Call Report",
            OperationKind::UploadOca => "OCA Report",
            OperationKind::ManualSync => "API Sync",
            OperationKind::DailySync => "Daily Sync",
        }
    }

    /// Endpoint (relative to the API root) that starts this operation
    pub fn start_endpoint(&self) -> &'static str {
        match self {
            OperationKind::UploadCsat => "upload/csat-report",
            OperationKind::UploadOmnix => "upload/omnix-report",
            OperationKind::UploadCall => "upload/call-report",
            OperationKind::UploadOca => "upload/oca-report",
            OperationKind::ManualSync => "schedule/trigger-oca-sync",
            OperationKind::DailySync => "schedule/sync-daily-oca",
        }
    }

    /// Endpoint (relative to the API root) that reports a job's status
    ///
    /// Every job in the processing queue (uploads and manual syncs) is
    /// polled on the upload status route; only the daily sync started from
    /// the dashboard is polled on the scheduler's route.
    pub fn status_endpoint(&self, id: &JobId) -> String {
        let prefix = match self {
            OperationKind::DailySync => "schedule",
            _ => "upload",
        };
        format!("{}/status/{}", prefix, urlencoding::encode(id.as_str()))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::UploadCsat => "upload-csat",
            OperationKind::UploadOmnix => "upload-omnix",
            OperationKind::UploadCall => "upload-call",
            OperationKind::UploadOca => "upload-oca",
            OperationKind::ManualSync => "manual-sync",
            OperationKind::DailySync => "daily-sync",
        };
        f.write_str(name)
    }
}

impl FromStr for OperationKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::all()
            .iter()
            .copied()
            .find(|kind| kind.to_string() == s.to_ascii_lowercase())
            .ok_or_else(|| ParseKindError(s.to_string()))
    }
}

/// Report types accepted by the upload page
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Csat,
    Omnix,
    Call,
    Oca,
}

impl ReportType {
    pub fn all() -> &'static [ReportType] {
        &[
            ReportType::Csat,
            ReportType::Omnix,
            ReportType::Call,
            ReportType::Oca,
        ]
    }

    /// Expected file extension, including the leading dot
    pub fn accept(&self) -> &'static str {
        match self {
            ReportType::Oca => ".csv",
            ReportType::Csat | ReportType::Omnix | ReportType::Call => ".xlsx",
        }
    }

    pub fn label(&self) -> &'static str {
        self.kind().display_name()
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            ReportType::Csat => OperationKind::UploadCsat,
            ReportType::Omnix => OperationKind::UploadOmnix,
            ReportType::Call => OperationKind::UploadCall,
            ReportType::Oca => OperationKind::UploadOca,
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self {
            ReportType::Csat => "csat",
            ReportType::Omnix => "omnix",
            ReportType::Call => "call",
            ReportType::Oca => "oca",
        };
        f.write_str(id)
    }
}

impl FromStr for ReportType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csat" => Ok(ReportType::Csat),
            "omnix" => Ok(ReportType::Omnix),
            "call" => Ok(ReportType::Call),
            "oca" => Ok(ReportType::Oca),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

/// Unrecognised report type or operation kind name
#[derive(Debug, thiserror::Error)]
#[error("unknown kind: {0}")]
pub struct ParseKindError(String);

/// Flat job status, as reported by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Active)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Active => write!(f, "active"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle state of a job
///
/// `Completed` and `Failed` are terminal: once a job holds one of them it
/// never changes again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum JobState {
    Active,
    Completed { result: serde_json::Value },
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Active => JobStatus::Active,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// One tracked asynchronous backend operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// File name or sync description
    pub label: String,
    pub kind: OperationKind,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job in the `active` state
    pub fn new(id: impl Into<JobId>, label: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            state: JobState::Active,
            submitted_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, JobState::Active)
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        match &self.state {
            JobState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Completed { .. } | JobState::Active => None,
            JobState::Failed { error } => Some(error),
        }
    }

    /// Decode the completion payload into an operation-specific type
    ///
    /// Returns `None` while the job has no result (active or failed).
    pub fn decode_result<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        self.result()
            .map(|value| serde_json::from_value(value.clone()))
    }
}

/// Date range for a manual OCA sync, sent as `{startDate, endDate}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRange {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl SyncRange {
    /// Create a range; `None` if `end` is before `start`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self {
            start_date: start,
            end_date: end,
        })
    }

    /// Single-day range covering yesterday (local time)
    pub fn yesterday() -> Self {
        let day = Local::now().date_naive() - Duration::days(1);
        Self {
            start_date: day,
            end_date: day,
        }
    }

    /// Label used for the job this range starts
    pub fn label(&self) -> String {
        format!("OCA Sync ({})", self.start_date.format("%Y-%m-%d"))
    }
}
