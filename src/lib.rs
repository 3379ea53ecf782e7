//! # Ticketpulse
//!
//! Client for the customer-service analytics dashboard backend. Starts
//! report uploads and OCA syncs, then follows the resulting background jobs
//! until the backend reports a result.
//!
//! ## Modules
//!
//! - [`jobs`]: Job registry, poller and submitter
//! - [`client`]: REST client for the dashboard backend
//! - [`dashboard`]: Daily sync tracker that refreshes dashboard data
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ticketpulse::client::{ClientConfig, DashboardClient};
//! use ticketpulse::jobs::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Arc::new(DashboardClient::new(ClientConfig::default())?);
//!     let (notifier, mut notifications) = ChannelNotifier::new();
//!
//!     let poller = Poller::new(
//!         JobRegistry::shared(),
//!         client.clone(),
//!         Arc::new(notifier),
//!         PollerConfig::default(),
//!     );
//!     let submitter = JobSubmitter::new(client, poller.clone());
//!
//!     // Upload a report; the processing job is tracked automatically
//!     let job = submitter
//!         .upload_file(ReportType::Csat, "csat-january.xlsx".as_ref())
//!         .await?;
//!     println!("Tracking job {}", job.id);
//!
//!     poller.until_idle().await;
//!     while let Ok(notification) = notifications.try_recv() {
//!         println!("{}", notification);
//!     }
//!
//!     poller.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dashboard;
pub mod jobs;

// Re-export top-level types for convenience
pub use client::{ClientConfig, ClientError, DashboardClient};

pub use config::{ApiConfig, Config, ConfigError, LoggingConfig, PollingConfig};

pub use dashboard::{DashboardData, DashboardRefresher, DashboardSync, RefreshOnComplete};

pub use jobs::{
    ChannelNotifier, CompletionHook, DailySyncStart, Job, JobId, JobRegistry, JobState,
    JobStatus, JobSubmitter, Notification, Notifier, OperationKind, Poller, PollerConfig,
    ReportType, StatusSource, SubmitError, SyncRange,
};
