//! Dashboard Sync Tracker
//!
//! The dashboard's "sync now" button starts the daily OCA sync and follows
//! the single resulting job. When that job completes, the dashboard data is
//! refetched and the "last synced at" value is updated. Both happen in a
//! completion hook attached to the job, not in the poller.

use crate::client::{ClientError, DashboardClient, DashboardRange};
use crate::jobs::{
    CompletionHook, DailySyncStart, Job, JobRegistry, JobSubmitter, Notification, Notifier,
    Poller, PollerConfig, SubmitError,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Something that can reload the dashboard's data
#[async_trait]
pub trait DashboardRefresher: Send + Sync {
    async fn refetch(&self) -> Result<(), ClientError>;
}

/// Cached dashboard summary and channel breakdown
pub struct DashboardData {
    client: Arc<DashboardClient>,
    range: RwLock<Option<DashboardRange>>,
    summary: RwLock<Option<serde_json::Value>>,
    channels: RwLock<Option<serde_json::Value>>,
}

impl DashboardData {
    pub fn new(client: Arc<DashboardClient>) -> Self {
        Self {
            client,
            range: RwLock::new(None),
            summary: RwLock::new(None),
            channels: RwLock::new(None),
        }
    }

    /// Change the date range used by the next refetch
    pub async fn set_range(&self, range: Option<DashboardRange>) {
        *self.range.write().await = range;
    }

    pub async fn summary(&self) -> Option<serde_json::Value> {
        self.summary.read().await.clone()
    }

    pub async fn channels(&self) -> Option<serde_json::Value> {
        self.channels.read().await.clone()
    }
}

#[async_trait]
impl DashboardRefresher for DashboardData {
    async fn refetch(&self) -> Result<(), ClientError> {
        let range = self.range.read().await.clone();

        let (summary, channels) = tokio::join!(
            self.client.dashboard_summary(range.as_ref()),
            self.client.dashboard_channels(range.as_ref()),
        );

        *self.summary.write().await = Some(summary?);
        *self.channels.write().await = Some(channels?);
        tracing::debug!("Dashboard data refreshed");
        Ok(())
    }
}

/// Completion hook for the daily sync job
pub struct RefreshOnComplete {
    refresher: Arc<dyn DashboardRefresher>,
    marker: Option<String>,
    last_synced: Arc<RwLock<Option<String>>>,
}

#[async_trait]
impl CompletionHook for RefreshOnComplete {
    async fn on_complete(&self, job: &Job) {
        if let Err(e) = self.refresher.refetch().await {
            tracing::warn!(job_id = %job.id, error = %e, "Dashboard refetch after sync failed");
        }

        if let Some(marker) = &self.marker {
            *self.last_synced.write().await = Some(marker.clone());
        }
    }

    fn completed_notification(&self, _job: &Job) -> Option<Notification> {
        Some(Notification::success("Sync Complete").description("Dashboard data updated."))
    }

    fn failed_notification(&self, _job: &Job, error: &str) -> Option<Notification> {
        Some(Notification::error("Sync Failed").description(error))
    }
}

/// Marks a daily sync as starting until dropped
struct SyncClaim<'a>(&'a AtomicBool);

impl<'a> SyncClaim<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SyncClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tracks the dashboard's daily sync
pub struct DashboardSync {
    client: Arc<DashboardClient>,
    submitter: JobSubmitter,
    refresher: Arc<dyn DashboardRefresher>,
    last_synced: Arc<RwLock<Option<String>>>,
    /// Held from the trigger request until the job is registered
    starting: AtomicBool,
}

impl DashboardSync {
    /// Create a tracker with its own registry and poller
    pub fn new(
        client: Arc<DashboardClient>,
        refresher: Arc<dyn DashboardRefresher>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
    ) -> Self {
        let poller = Poller::new(
            JobRegistry::shared(),
            client.clone(),
            notifier,
            config,
        );

        Self {
            submitter: JobSubmitter::new(client.clone(), poller),
            client,
            refresher,
            last_synced: Arc::new(RwLock::new(None)),
            starting: AtomicBool::new(false),
        }
    }

    pub fn poller(&self) -> &Arc<Poller> {
        self.submitter.poller()
    }

    /// Seed the "last synced at" value from the backend
    pub async fn load_last_sync(&self) -> Result<Option<String>, ClientError> {
        let response = self.client.last_sync().await?;
        if let Some(value) = &response.last_sync_wib {
            *self.last_synced.write().await = Some(value.clone());
        }
        Ok(response.last_sync_wib)
    }

    /// Start the daily sync and follow it until it finishes
    pub async fn sync_now(&self) -> Result<DailySyncStart, SubmitError> {
        let Some(_claim) = SyncClaim::claim(&self.starting) else {
            return Err(SubmitError::SyncInProgress);
        };
        if self.poller().registry().read().await.active_count() > 0 {
            return Err(SubmitError::SyncInProgress);
        }

        let refresher = Arc::clone(&self.refresher);
        let last_synced = Arc::clone(&self.last_synced);

        let start = self
            .submitter
            .trigger_daily_sync_with(move |marker| {
                let hook: Arc<dyn CompletionHook> = Arc::new(RefreshOnComplete {
                    refresher,
                    marker: marker.map(str::to_string),
                    last_synced,
                });
                Some(hook)
            })
            .await?;

        if let DailySyncStart::AlreadyComplete { .. } = &start {
            if let Err(e) = self.refresher.refetch().await {
                tracing::warn!(error = %e, "Dashboard refetch after sync failed");
            }
        }

        Ok(start)
    }

    /// Displayed "last synced at" value
    pub async fn last_synced(&self) -> Option<String> {
        self.last_synced.read().await.clone()
    }

    /// Whether a daily sync is being started or its job is still running
    pub async fn is_processing(&self) -> bool {
        self.starting.load(Ordering::Acquire)
            || self.poller().registry().read().await.active_count() > 0
    }

    /// Stop tracking; called when the dashboard goes away
    pub async fn shutdown(&self) {
        self.poller().shutdown().await;
    }
}
