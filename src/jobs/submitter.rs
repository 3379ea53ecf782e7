//! Job Submitter
//!
//! Turns user actions into backend calls that start asynchronous jobs, and
//! registers the resulting jobs with a poller.
//!
//! Every submission validates its input before touching the network. On any
//! failure no job is registered and the user gets an error notification,
//! carrying the backend's message when it sent one.

use super::error::{RegistryError, SubmitError};
use super::notify::{Notification, Notifier};
use super::poller::{CompletionHook, Poller};
use super::types::{Job, OperationKind, ReportType, SyncRange};
use crate::client::{ClientError, DashboardClient};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

const UPLOAD_FALLBACK: &str = "Failed to upload file.";
const MANUAL_SYNC_FALLBACK: &str = "Manual sync failed";
const DAILY_SYNC_FALLBACK: &str = "Failed to trigger daily sync";

/// Label given to daily sync jobs
pub const DAILY_SYNC_LABEL: &str = "Daily OCA Sync";

/// Outcome of triggering the daily sync
#[derive(Debug, Clone)]
pub enum DailySyncStart {
    /// A job was started and is being tracked
    Tracking {
        job: Job,
        /// Backend's "last sync" marker, shown once the job completes
        last_sync: Option<String>,
    },
    /// The backend finished synchronously; nothing to track
    AlreadyComplete { message: Option<String> },
}

/// Starts backend jobs and hands them to a poller
#[derive(Clone)]
pub struct JobSubmitter {
    client: Arc<DashboardClient>,
    poller: Arc<Poller>,
    uploading: Arc<Mutex<HashSet<ReportType>>>,
}

impl JobSubmitter {
    pub fn new(client: Arc<DashboardClient>, poller: Arc<Poller>) -> Self {
        Self {
            client,
            poller,
            uploading: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn poller(&self) -> &Arc<Poller> {
        &self.poller
    }

    fn notifier(&self) -> &Arc<dyn Notifier> {
        self.poller.notifier()
    }

    /// Check that a file name carries the extension a report type expects
    ///
    /// The comparison is case-insensitive; a name without an extension never
    /// matches.
    pub fn validate_extension(report: ReportType, file_name: &str) -> Result<(), SubmitError> {
        let expected = report.accept().trim_start_matches('.');
        let matches = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.eq_ignore_ascii_case(expected))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            Err(SubmitError::InvalidFormat {
                accept: report.accept(),
            })
        }
    }

    /// Whether an upload for this report type is currently in flight
    pub fn is_uploading(&self, report: ReportType) -> bool {
        self.slots().contains(&report)
    }

    /// Upload a report file and track its processing job
    pub async fn submit_upload(
        &self,
        report: ReportType,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<Job, SubmitError> {
        if let Err(e) = Self::validate_extension(report, file_name) {
            tracing::info!(report = %report, file = %file_name, "Rejected upload with wrong extension");
            self.notifier().notify(Notification::error(e.to_string()));
            return Err(e);
        }

        let Some(_slot) = UploadSlot::claim(&self.uploading, report) else {
            let e = SubmitError::SlotBusy(report);
            self.notifier().notify(Notification::error(e.to_string()));
            return Err(e);
        };

        let accepted = match self.client.upload_report(report, file_name, bytes).await {
            Ok(accepted) => accepted,
            Err(e) => return Err(self.submission_failed(e, UPLOAD_FALLBACK)),
        };

        let job = Job::new(accepted.job_id, file_name, report.kind());
        if let Err(e) = self.poller.track(job.clone(), None).await {
            return Err(self.tracking_failed(e));
        }

        tracing::info!(job_id = %job.id, report = %report, file = %file_name, "Upload accepted");
        self.notifier()
            .notify(Notification::info("Upload finished. Processing started...").job(&job.id));
        Ok(job)
    }

    /// Read a report from disk and upload it
    pub async fn upload_file(&self, report: ReportType, path: &Path) -> Result<Job, SubmitError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        // Validate before reading so a wrong file is never loaded
        if let Err(e) = Self::validate_extension(report, &file_name) {
            self.notifier().notify(Notification::error(e.to_string()));
            return Err(e);
        }

        let bytes = tokio::fs::read(path).await.map_err(ClientError::Io)?;
        self.submit_upload(report, &file_name, bytes).await
    }

    /// Start a manual OCA sync for a date range and track it
    pub async fn trigger_manual_sync(&self, range: SyncRange) -> Result<Job, SubmitError> {
        if range.end_date < range.start_date {
            let e = SubmitError::InvalidRange;
            self.notifier().notify(Notification::error(e.to_string()));
            return Err(e);
        }

        let accepted = match self.client.trigger_oca_sync(&range).await {
            Ok(accepted) => accepted,
            Err(e) => return Err(self.submission_failed(e, MANUAL_SYNC_FALLBACK)),
        };

        let job = Job::new(accepted.job_id, range.label(), OperationKind::ManualSync);
        if let Err(e) = self.poller.track(job.clone(), None).await {
            return Err(self.tracking_failed(e));
        }

        tracing::info!(job_id = %job.id, start = %range.start_date, end = %range.end_date, "OCA sync triggered");
        self.notifier()
            .notify(Notification::success("OCA Sync triggered successfully").job(&job.id));
        Ok(job)
    }

    /// Trigger the daily sync without a completion hook
    pub async fn trigger_daily_sync(&self) -> Result<DailySyncStart, SubmitError> {
        self.trigger_daily_sync_with(|_| None).await
    }

    /// Trigger the daily sync, building the job's completion hook from the
    /// backend's "last sync" marker
    pub async fn trigger_daily_sync_with<F>(&self, make_hook: F) -> Result<DailySyncStart, SubmitError>
    where
        F: FnOnce(Option<&str>) -> Option<Arc<dyn CompletionHook>>,
    {
        let response = match self.client.sync_daily_oca().await {
            Ok(response) => response,
            Err(e) => return Err(self.submission_failed(e, DAILY_SYNC_FALLBACK)),
        };

        let Some(job_id) = response.job_id else {
            tracing::info!("Daily sync finished without a background job");
            let title = response
                .message
                .clone()
                .unwrap_or_else(|| "Sync Complete".to_string());
            self.notifier().notify(Notification::success(title));
            return Ok(DailySyncStart::AlreadyComplete {
                message: response.message,
            });
        };

        let hook = make_hook(response.last_sync.as_deref());
        let job = Job::new(job_id, DAILY_SYNC_LABEL, OperationKind::DailySync);
        if let Err(e) = self.poller.track(job.clone(), hook).await {
            return Err(self.tracking_failed(e));
        }

        tracing::info!(job_id = %job.id, "Daily sync started");
        self.notifier().notify(
            Notification::info("Sync Started")
                .description("Fetching latest batches...")
                .job(&job.id),
        );
        Ok(DailySyncStart::Tracking {
            job,
            last_sync: response.last_sync,
        })
    }

    fn submission_failed(&self, error: ClientError, fallback: &str) -> SubmitError {
        tracing::warn!(error = %error, "Job submission failed");
        let message = error.backend_message().unwrap_or(fallback).to_string();
        self.notifier().notify(Notification::error(message));
        SubmitError::Client(error)
    }

    /// The backend accepted the job but it could not be tracked
    fn tracking_failed(&self, error: RegistryError) -> SubmitError {
        tracing::warn!(error = %error, "Accepted job could not be tracked");
        self.notifier().notify(Notification::error(error.to_string()));
        SubmitError::Registry(error)
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashSet<ReportType>> {
        self.uploading.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Marks a report type as uploading until dropped
struct UploadSlot {
    slots: Arc<Mutex<HashSet<ReportType>>>,
    report: ReportType,
}

impl UploadSlot {
    fn claim(slots: &Arc<Mutex<HashSet<ReportType>>>, report: ReportType) -> Option<Self> {
        let claimed = slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(report);

        claimed.then(|| Self {
            slots: Arc::clone(slots),
            report,
        })
    }
}

impl Drop for UploadSlot {
    fn drop(&mut self) {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.report);
    }
}
