//! Job tracking error types

use super::types::{JobId, ReportType};
use crate::client::ClientError;
use thiserror::Error;

/// Errors raised by the job registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A job with this id is already tracked
    #[error("Job already tracked: {0}")]
    Duplicate(JobId),
}

/// Errors that abort a job submission
///
/// No job is registered when any of these is returned.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// File extension does not match the report type
    #[error("Invalid format. Please upload a {accept} file.")]
    InvalidFormat { accept: &'static str },

    /// Sync range ends before it starts
    #[error("Invalid sync range: end date is before start date")]
    InvalidRange,

    /// An upload for this report type is already in flight
    #[error("An upload for {0} is already in progress")]
    SlotBusy(ReportType),

    /// A daily sync is already being tracked
    #[error("A sync is already in progress")]
    SyncInProgress,

    /// The backend rejected the request or could not be reached
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl SubmitError {
    /// Whether the error was raised before any request was sent
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SubmitError::InvalidFormat { .. }
                | SubmitError::InvalidRange
                | SubmitError::SlotBusy(_)
                | SubmitError::SyncInProgress
        )
    }
}
