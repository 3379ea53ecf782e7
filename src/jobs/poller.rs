//! Job Poller
//!
//! Periodically asks the backend for the status of every `active` job and
//! applies terminal transitions to the registry.
//!
//! ## Lifecycle
//!
//! The poller is an explicit object owned by a page or session. `start`
//! spawns the tick loop, `stop` cancels it, and `shutdown` additionally
//! drops every pending completion hook. The loop stops on its own once no
//! job is active and is restarted by `track` when a new job arrives. The
//! loop only holds a weak reference, so dropping the last `Arc<Poller>`
//! also ends it.
//!
//! ## Per-tick behaviour
//!
//! Every tick recomputes the candidate set from the registry. Each active
//! job is queried in its own task, so a slow or failing query never holds
//! up the others. A job whose previous query has not returned yet is skipped
//! rather than queried twice.

use super::error::RegistryError;
use super::notify::{Notification, Notifier};
use super::registry::{SharedRegistry, UpdateOutcome};
use super::types::{Job, JobId, JobState, OperationKind};
use crate::client::ClientError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Where the poller reads job status from
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn job_status(&self, kind: OperationKind, id: &JobId) -> Result<JobState, ClientError>;
}

/// Side effect attached to one job's successful completion
///
/// A hook may also replace the generic transition notifications with its
/// own wording. The completion notification is sent after `on_complete`
/// returns.
#[async_trait]
pub trait CompletionHook: Send + Sync {
    async fn on_complete(&self, job: &Job);

    fn completed_notification(&self, _job: &Job) -> Option<Notification> {
        None
    }

    fn failed_notification(&self, _job: &Job, _error: &str) -> Option<Notification> {
        None
    }
}

/// Configuration for polling behaviour
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Consecutive transport failures before a job is reported as stuck (0 disables)
    pub stuck_after: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            stuck_after: 20,
        }
    }
}

/// Queries dispatched by a single tick
#[derive(Debug)]
pub struct PollRound {
    /// Jobs queried on this tick
    pub queried: Vec<JobId>,
    handles: Vec<JoinHandle<()>>,
}

impl PollRound {
    /// Wait for every query of this round to be applied
    pub async fn settle(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Status query task ended abnormally");
            }
        }
    }
}

/// Timer-driven status poller for a job registry
pub struct Poller {
    registry: SharedRegistry,
    source: Arc<dyn StatusSource>,
    notifier: Arc<dyn Notifier>,
    config: PollerConfig,
    hooks: Mutex<HashMap<JobId, Arc<dyn CompletionHook>>>,
    in_flight: Mutex<HashSet<JobId>>,
    failures: Mutex<HashMap<JobId, u32>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(
        registry: SharedRegistry,
        source: Arc<dyn StatusSource>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            source,
            notifier,
            config,
            hooks: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            failures: Mutex::new(HashMap::new()),
            handle: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Register a new job and make sure it gets polled
    pub async fn track(
        self: &Arc<Self>,
        job: Job,
        hook: Option<Arc<dyn CompletionHook>>,
    ) -> Result<(), RegistryError> {
        let id = job.id.clone();
        {
            // The hook is stored before a tick can resolve the job
            let mut hooks = self.hooks.lock().await;
            self.registry.write().await.register(job)?;
            if let Some(hook) = hook {
                hooks.insert(id, hook);
            }
        }

        self.start().await;
        Ok(())
    }

    /// Spawn the tick loop
    ///
    /// Returns `false` if the loop is already running or there is nothing to
    /// poll.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut slot = self.handle.lock().await;
        if slot.is_some() {
            return false;
        }
        if self.registry.read().await.active_count() == 0 {
            return false;
        }

        tracing::debug!(interval_ms = self.config.interval.as_millis() as u64, "Starting job poller");

        let weak = Arc::downgrade(self);
        let interval = self.config.interval;

        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(poller) = weak.upgrade() else {
                    break;
                };

                {
                    let mut slot = poller.handle.lock().await;
                    if poller.registry.read().await.active_count() == 0 {
                        tracing::debug!("No active jobs, poller idle");
                        *slot = None;
                        break;
                    }
                }

                // Detach; queries outlive the tick that started them
                drop(poller.tick().await);
            }
        }));

        true
    }

    /// Cancel the tick loop; queries already in flight still complete
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
            tracing::debug!("Job poller stopped");
        }
    }

    /// Stop polling and drop all pending completion hooks
    pub async fn shutdown(&self) {
        self.stop().await;
        self.hooks.lock().await.clear();
        self.failures.lock().await.clear();
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Wait until no tracked job is active and every query has been handled
    pub async fn until_idle(&self) {
        loop {
            let active = self.registry.read().await.active_count();
            if active == 0 && self.in_flight.lock().await.is_empty() {
                return;
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Dispatch one status query per active job
    pub async fn tick(self: &Arc<Self>) -> PollRound {
        let active = self.registry.read().await.list_active();
        let mut round = PollRound {
            queried: Vec::with_capacity(active.len()),
            handles: Vec::with_capacity(active.len()),
        };

        for job in active {
            if !self.in_flight.lock().await.insert(job.id.clone()) {
                tracing::trace!(job_id = %job.id, "Previous status query still pending");
                continue;
            }

            round.queried.push(job.id.clone());
            let poller = Arc::clone(self);
            round
                .handles
                .push(tokio::spawn(async move { poller.poll_job(job).await }));
        }

        round
    }

    async fn poll_job(&self, job: Job) {
        match self.source.job_status(job.kind, &job.id).await {
            Ok(state) => {
                self.failures.lock().await.remove(&job.id);
                self.apply(&job, state).await;
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Status check failed");
                self.record_failure(&job).await;
            }
        }

        // Released only after the response (and any hook) has been handled
        self.in_flight.lock().await.remove(&job.id);
    }

    async fn apply(&self, job: &Job, state: JobState) {
        if !state.is_terminal() {
            tracing::trace!(job_id = %job.id, "Job still active");
            return;
        }

        let outcome = self.registry.write().await.update_status(&job.id, state);
        let UpdateOutcome::Applied(updated) = outcome else {
            return;
        };

        let hook = self.hooks.lock().await.remove(&updated.id);
        let notification = match &updated.state {
            JobState::Completed { .. } => {
                tracing::info!(job_id = %updated.id, kind = %updated.kind, "Job completed");
                if let Some(hook) = &hook {
                    hook.on_complete(&updated).await;
                }
                hook.as_ref()
                    .and_then(|hook| hook.completed_notification(&updated))
                    .unwrap_or_else(|| {
                        Notification::success(format!("{} processed successfully", updated.label))
                    })
            }
            JobState::Failed { error } => {
                tracing::warn!(job_id = %updated.id, kind = %updated.kind, error = %error, "Job failed");
                hook.as_ref()
                    .and_then(|hook| hook.failed_notification(&updated, error))
                    .unwrap_or_else(|| {
                        Notification::error(format!("{} processing failed", updated.label))
                            .description(error.clone())
                    })
            }
            JobState::Active => return,
        };
        self.notifier.notify(notification.job(&updated.id));
    }

    async fn record_failure(&self, job: &Job) {
        let mut failures = self.failures.lock().await;
        let count = failures.entry(job.id.clone()).or_insert(0);
        *count += 1;

        if self.config.stuck_after > 0 && *count == self.config.stuck_after {
            tracing::warn!(job_id = %job.id, failures = *count, "Job appears stuck");
            self.notifier.notify(
                Notification::warning(format!("{} appears stuck", job.label))
                    .description(format!("{} consecutive status checks failed", count))
                    .job(&job.id),
            );
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}
