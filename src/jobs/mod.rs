//! Background Job Tracking
//!
//! Tracks long-running backend operations (report uploads and OCA syncs)
//! from the moment they are started until the backend reports a result.
//!
//! ## Architecture
//!
//! - **JobSubmitter**: Validates input, starts a job, registers it
//! - **JobRegistry**: Session-scoped list of jobs, newest first
//! - **Poller**: Queries status of every active job on a fixed interval
//! - **Notifier**: Where user-facing messages go
//!
//! ## Data Flow
//!
//! 1. A submission reaches the backend and returns a job id
//! 2. The job is registered as `active` and the poller is started
//! 3. Each tick queries every active job independently
//! 4. A terminal response moves the job to `completed` or `failed` once,
//!    emits one notification and runs the job's completion hook
//! 5. The poller goes idle when nothing is active

mod error;
mod notify;
mod poller;
mod registry;
mod submitter;
mod types;

pub use error::{RegistryError, SubmitError};
pub use notify::{ChannelNotifier, Level, LogNotifier, Notification, Notifier};
pub use poller::{CompletionHook, PollRound, Poller, PollerConfig, StatusSource};
pub use registry::{JobRegistry, SharedRegistry, UpdateOutcome};
pub use submitter::{DailySyncStart, JobSubmitter, DAILY_SYNC_LABEL};
pub use types::{
    Job, JobId, JobState, JobStatus, OperationKind, ParseKindError, ReportType, SyncRange,
};
