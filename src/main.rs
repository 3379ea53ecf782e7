//! Ticketpulse CLI
//!
//! Command-line interface for the dashboard backend's background jobs:
//! - Upload reports and follow their processing
//! - Trigger manual and daily OCA syncs
//! - Check the status of a job

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use ticketpulse::config::{generate_default_config, Config, LoggingConfig};
use ticketpulse::dashboard::{DashboardData, DashboardSync};
use ticketpulse::jobs::{
    ChannelNotifier, DailySyncStart, JobId, JobRegistry, JobSubmitter, Notification,
    OperationKind, Poller, ReportType, SyncRange,
};
use ticketpulse::DashboardClient;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ticketpulse")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Upload reports and track background jobs on the dashboard backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend URL, overrides the config file
    #[arg(long, global = true)]
    pub api_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a report and wait for it to be processed
    Upload {
        /// Report type (csat, omnix, call, oca)
        report: ReportType,
        /// Path to the report file
        path: PathBuf,
    },

    /// Trigger a manual OCA sync for a date range
    Sync {
        /// First day (YYYY-MM-DD, default: yesterday)
        #[arg(short, long)]
        start: Option<NaiveDate>,
        /// Last day (YYYY-MM-DD, default: start)
        #[arg(short, long)]
        end: Option<NaiveDate>,
    },

    /// Run the daily OCA sync and refresh dashboard data
    DailySync,

    /// Show the status of a job
    Status {
        /// Operation kind (upload-csat, upload-omnix, upload-call, upload-oca, manual-sync, daily-sync)
        kind: OperationKind,
        /// Job id
        job_id: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = &cli.api_url {
        config.api.base_url = url.clone();
    }

    init_logging(&config.logging);

    let client = Arc::new(
        DashboardClient::new(config.api.client_config()).context("failed to build HTTP client")?,
    );

    match cli.command {
        Commands::Upload { report, path } => {
            let (submitter, mut rx) = upload_session(&client, &config);

            let result = submitter.upload_file(report, &path).await;
            follow(submitter.poller(), &mut rx, result.is_ok()).await;
            print_outcome(&submitter, result.map(|job| job.id)).await
        }

        Commands::Sync { start, end } => {
            let range = match start {
                Some(start) => SyncRange::new(start, end.unwrap_or(start))
                    .context("end date is before start date")?,
                None => SyncRange::yesterday(),
            };

            let (submitter, mut rx) = upload_session(&client, &config);

            let result = submitter.trigger_manual_sync(range).await;
            follow(submitter.poller(), &mut rx, result.is_ok()).await;
            print_outcome(&submitter, result.map(|job| job.id)).await
        }

        Commands::DailySync => {
            let (notifier, mut rx) = ChannelNotifier::new();
            let data = Arc::new(DashboardData::new(client.clone()));
            let tracker = DashboardSync::new(
                client.clone(),
                data,
                Arc::new(notifier),
                config.polling.sync_poller(),
            );

            if let Ok(Some(last)) = tracker.load_last_sync().await {
                println!("Last synced: {}", last);
            }

            let result = tracker.sync_now().await;
            let tracking = matches!(result, Ok(DailySyncStart::Tracking { .. }));
            follow(tracker.poller(), &mut rx, tracking).await;
            result?;

            if let Some(last) = tracker.last_synced().await {
                println!("Last synced: {}", last);
            }
            Ok(())
        }

        Commands::Status { kind, job_id } => {
            let status = client.job_status(kind, &JobId::new(job_id)).await?;
            println!("{}", status.status);
            if let Some(result) = status.result {
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            if let Some(error) = status.error {
                println!("error: {}", error);
            }
            Ok(())
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("Config written to {}", path.display());
                }
                None => print!("{}", content),
            }
            Ok(())
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("ticketpulse={}", config.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn upload_session(
    client: &Arc<DashboardClient>,
    config: &Config,
) -> (JobSubmitter, mpsc::UnboundedReceiver<Notification>) {
    let (notifier, rx) = ChannelNotifier::new();
    let poller = Poller::new(
        JobRegistry::shared(),
        client.clone(),
        Arc::new(notifier),
        config.polling.upload_poller(),
    );
    (JobSubmitter::new(client.clone(), poller), rx)
}

/// Print notifications until the poller is idle, then tear it down
async fn follow(poller: &Arc<Poller>, rx: &mut mpsc::UnboundedReceiver<Notification>, wait: bool) {
    if wait {
        let idle = poller.until_idle();
        tokio::pin!(idle);
        loop {
            tokio::select! {
                Some(notification) = rx.recv() => println!("{}", notification),
                _ = &mut idle => break,
            }
        }
    }

    poller.shutdown().await;
    while let Ok(notification) = rx.try_recv() {
        println!("{}", notification);
    }
}

async fn print_outcome(
    submitter: &JobSubmitter,
    result: Result<JobId, ticketpulse::SubmitError>,
) -> anyhow::Result<()> {
    let id = result?;
    let registry = submitter.poller().registry().read().await;
    if let Some(job) = registry.get(&id) {
        println!("{} [{}] {} ({})", job.label, job.kind.display_name(), job.status(), job.id.short());
        if let Some(result) = job.result() {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        if job.error().is_some() {
            anyhow::bail!("job {} failed", job.id);
        }
    }
    Ok(())
}
