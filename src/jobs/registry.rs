//! Job Registry
//!
//! Session-scoped, in-memory list of tracked jobs. Newest jobs come first.
//! The registry is the only place job state changes, and it only ever moves
//! a job from `active` to a terminal state once.

use super::error::RegistryError;
use super::types::{Job, JobId, JobState, JobStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry shared between the submitter, the poller and readers
pub type SharedRegistry = Arc<RwLock<JobRegistry>>;

/// Ordered collection of jobs keyed by job id
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Vec<Job>,
}

/// Result of applying a status report to the registry
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The job moved from `active` to a terminal state
    Applied(Job),
    /// The job is active and the report was not terminal
    Unchanged,
    /// The job was already terminal; the report agreed or was `active`
    AlreadyTerminal,
    /// The job was already terminal with a different terminal status
    Conflict { current: JobStatus, reported: JobStatus },
    NotFound,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry wrapped for sharing
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Insert a job at the front of the list
    pub fn register(&mut self, job: Job) -> Result<(), RegistryError> {
        if self.get(&job.id).is_some() {
            return Err(RegistryError::Duplicate(job.id));
        }

        tracing::debug!(job_id = %job.id, kind = %job.kind, label = %job.label, "Job registered");
        self.jobs.insert(0, job);
        Ok(())
    }

    /// Apply a status report to a job
    ///
    /// Only an `active` job can change, and only to a terminal state. Every
    /// other combination leaves the registry untouched, so duplicate or late
    /// responses are harmless.
    pub fn update_status(&mut self, id: &JobId, state: JobState) -> UpdateOutcome {
        let Some(job) = self.jobs.iter_mut().find(|job| &job.id == id) else {
            return UpdateOutcome::NotFound;
        };

        let current = job.status();
        let reported = state.status();

        if current.is_terminal() {
            if reported.is_terminal() && reported != current {
                tracing::warn!(
                    job_id = %id,
                    current = %current,
                    reported = %reported,
                    "Conflicting terminal status ignored"
                );
                return UpdateOutcome::Conflict { current, reported };
            }
            return UpdateOutcome::AlreadyTerminal;
        }

        if !reported.is_terminal() {
            return UpdateOutcome::Unchanged;
        }

        job.state = state;
        job.finished_at = Some(Utc::now());
        tracing::debug!(job_id = %id, status = %reported, "Job reached terminal state");
        UpdateOutcome::Applied(job.clone())
    }

    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == id)
    }

    /// Jobs still waiting on the backend, newest first
    pub fn list_active(&self) -> Vec<Job> {
        self.jobs.iter().filter(|job| job.is_active()).cloned().collect()
    }

    /// All jobs, newest first
    pub fn list_all(&self) -> Vec<Job> {
        self.jobs.clone()
    }

    pub fn active_count(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_active()).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
