//! End-to-end job tracking against a mock backend

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ticketpulse::client::{ClientConfig, DashboardClient};
use ticketpulse::dashboard::{DashboardData, DashboardSync};
use ticketpulse::jobs::{
    ChannelNotifier, DailySyncStart, Job, JobId, JobRegistry, JobStatus, JobSubmitter, Level,
    Notification, OperationKind, Poller, PollerConfig, ReportType, SubmitError, SyncRange,
};
use tokio::sync::mpsc::UnboundedReceiver;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_polling() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(20),
        stuck_after: 3,
    }
}

fn client(server: &MockServer) -> Arc<DashboardClient> {
    Arc::new(
        DashboardClient::new(ClientConfig {
            base_url: server.uri(),
            request_timeout: Some(Duration::from_secs(5)),
        })
        .unwrap(),
    )
}

fn session(server: &MockServer) -> (JobSubmitter, UnboundedReceiver<Notification>) {
    let client = client(server);
    let (notifier, rx) = ChannelNotifier::new();
    let poller = Poller::new(
        JobRegistry::shared(),
        client.clone(),
        Arc::new(notifier),
        fast_polling(),
    );
    (JobSubmitter::new(client, poller), rx)
}

async fn wait_idle(poller: &Arc<Poller>) {
    tokio::time::timeout(Duration::from_secs(5), poller.until_idle())
        .await
        .expect("poller never went idle");
}

fn drain(rx: &mut UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn test_wrong_extension_never_reaches_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/csat-report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "job-1" })))
        .expect(0)
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    let err = submitter
        .submit_upload(ReportType::Csat, "report.csv", b"a,b,c".to_vec())
        .await
        .unwrap_err();

    assert!(matches!(err, SubmitError::InvalidFormat { accept: ".xlsx" }));
    assert!(submitter.poller().registry().read().await.is_empty());

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, Level::Error);
    assert_eq!(notifications[0].title, "Invalid format. Please upload a .xlsx file.");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_upload_tracked_until_completed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/oca-report"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "jobId": "job-9" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/upload/status/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "active" })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/upload/status/job-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": { "stats": { "inserted": 120 } }
        })))
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    let job = submitter
        .submit_upload(ReportType::Oca, "calls.CSV", b"id,agent\n1,alice\n".to_vec())
        .await
        .unwrap();
    assert_eq!(job.id, JobId::from("job-9"));
    assert_eq!(job.label, "calls.CSV");
    assert!(job.is_active());
    assert!(!submitter.is_uploading(ReportType::Oca));

    wait_idle(submitter.poller()).await;

    let registry = submitter.poller().registry().read().await;
    let tracked = registry.get(&JobId::from("job-9")).unwrap();
    assert_eq!(tracked.status(), JobStatus::Completed);
    assert_eq!(tracked.result(), Some(&json!({ "stats": { "inserted": 120 } })));
    assert!(tracked.finished_at.is_some());

    let notifications = drain(&mut rx);
    let titles: Vec<_> = notifications.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Upload finished. Processing started...", "calls.CSV processed successfully"]
    );
}

#[tokio::test]
async fn test_upload_error_uses_backend_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/call-report"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "message": "Header row missing" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/upload/omnix-report"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);

    let err = submitter
        .submit_upload(ReportType::Call, "calls.xlsx", vec![1, 2, 3])
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Client(_)));

    submitter
        .submit_upload(ReportType::Omnix, "omnix.xlsx", vec![1, 2, 3])
        .await
        .unwrap_err();

    assert!(submitter.poller().registry().read().await.is_empty());
    assert!(!submitter.poller().is_running().await);

    let titles: Vec<_> = drain(&mut rx).into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["Header row missing", "Failed to upload file."]);
}

#[tokio::test]
async fn test_manual_sync_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/trigger-oca-sync"))
        .and(body_json(json!({ "startDate": "2025-01-01", "endDate": "2025-01-01" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "job-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/upload/status/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "completed",
            "result": { "synced": 42 }
        })))
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    let day = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let job = submitter
        .trigger_manual_sync(SyncRange::new(day, day).unwrap())
        .await
        .unwrap();

    {
        let registry = submitter.poller().registry().read().await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_active()[0].id, job.id);
    }

    wait_idle(submitter.poller()).await;

    let registry = submitter.poller().registry().read().await;
    let tracked = registry.get(&JobId::from("job-1")).unwrap();
    assert_eq!(tracked.label, "OCA Sync (2025-01-01)");
    assert_eq!(tracked.result(), Some(&json!({ "synced": 42 })));

    let completions: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|n| n.title == "OCA Sync (2025-01-01) processed successfully")
        .collect();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].job_id, Some(JobId::from("job-1")));

    // Manual syncs share the processing queue's status route
    let requests = server.received_requests().await.unwrap();
    assert!(requests
        .iter()
        .all(|request| !request.url.path().starts_with("/api/schedule/status")));
}

#[tokio::test]
async fn test_failed_job_stays_visible() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/trigger-oca-sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "job-2" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/upload/status/job-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "failed", "error": "OCA API timeout" })),
        )
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    submitter
        .trigger_manual_sync(SyncRange::yesterday())
        .await
        .unwrap();
    wait_idle(submitter.poller()).await;

    let registry = submitter.poller().registry().read().await;
    let tracked = registry.get(&JobId::from("job-2")).unwrap();
    assert_eq!(tracked.error(), Some("OCA API timeout"));

    let failures: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|n| n.level == Level::Error)
        .collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].description.as_deref(), Some("OCA API timeout"));
}

#[tokio::test]
async fn test_transient_status_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/csat-report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "job-3" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/upload/status/job-3"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/upload/status/job-3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "completed" })))
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    submitter
        .submit_upload(ReportType::Csat, "csat.xlsx", vec![0; 16])
        .await
        .unwrap();
    wait_idle(submitter.poller()).await;

    let registry = submitter.poller().registry().read().await;
    assert_eq!(
        registry.get(&JobId::from("job-3")).unwrap().status(),
        JobStatus::Completed
    );

    // Two failures stay below the stuck threshold of three
    let levels: Vec<_> = drain(&mut rx).into_iter().map(|n| n.level).collect();
    assert!(!levels.contains(&Level::Warning));
    assert!(!levels.contains(&Level::Error));
}

#[tokio::test]
async fn test_daily_sync_refreshes_dashboard() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/schedule/last-sync"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "lastSyncWib": "01 Jan 2025 08:00" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/sync-daily-oca"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jobId": "daily-1",
            "lastSync": "02 Jan 2025 08:00"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/schedule/status/daily-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "active" })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/schedule/status/daily-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "completed" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalTickets": 1200 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "name": "Email" }])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let data = Arc::new(DashboardData::new(client.clone()));
    let (notifier, mut rx) = ChannelNotifier::new();
    let tracker = DashboardSync::new(client, data.clone(), Arc::new(notifier), fast_polling());

    assert_eq!(
        tracker.load_last_sync().await.unwrap().as_deref(),
        Some("01 Jan 2025 08:00")
    );

    let start = tracker.sync_now().await.unwrap();
    assert!(matches!(start, DailySyncStart::Tracking { ref last_sync, .. } if last_sync.as_deref() == Some("02 Jan 2025 08:00")));
    assert!(tracker.is_processing().await);

    // A second click while the job runs is rejected without a request
    assert!(matches!(tracker.sync_now().await, Err(SubmitError::SyncInProgress)));

    wait_idle(tracker.poller()).await;

    assert!(!tracker.is_processing().await);
    assert_eq!(tracker.last_synced().await.as_deref(), Some("02 Jan 2025 08:00"));
    assert_eq!(data.summary().await, Some(json!({ "totalTickets": 1200 })));
    assert_eq!(data.channels().await, Some(json!([{ "name": "Email" }])));

    let successes: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|n| n.level == Level::Success)
        .collect();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].title, "Sync Complete");
    assert_eq!(successes[0].description.as_deref(), Some("Dashboard data updated."));

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_daily_sync_without_job_is_complete() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/sync-daily-oca"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": "Already up to date" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/summary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client(&server);
    let (notifier, mut rx) = ChannelNotifier::new();
    let tracker = DashboardSync::new(
        client.clone(),
        Arc::new(DashboardData::new(client)),
        Arc::new(notifier),
        fast_polling(),
    );

    let start = tracker.sync_now().await.unwrap();
    assert!(matches!(start, DailySyncStart::AlreadyComplete { .. }));
    assert!(!tracker.is_processing().await);
    assert!(!tracker.poller().is_running().await);

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, Level::Success);
    assert_eq!(notifications[0].title, "Already up to date");
}

#[tokio::test]
async fn test_daily_sync_trigger_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/sync-daily-oca"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    assert!(submitter.trigger_daily_sync().await.is_err());
    assert!(submitter.poller().registry().read().await.is_empty());

    let titles: Vec<_> = drain(&mut rx).into_iter().map(|n| n.title).collect();
    assert_eq!(titles, vec!["Failed to trigger daily sync"]);
}

#[tokio::test]
async fn test_concurrent_sync_now_sends_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/sync-daily-oca"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jobId": "daily-2" }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/schedule/status/daily-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "active" })))
        .mount(&server)
        .await;

    let client = client(&server);
    let (notifier, _rx) = ChannelNotifier::new();
    let tracker = DashboardSync::new(
        client.clone(),
        Arc::new(DashboardData::new(client)),
        Arc::new(notifier),
        fast_polling(),
    );

    let (first, second) = tokio::join!(tracker.sync_now(), tracker.sync_now());

    assert!(matches!(first, Ok(DailySyncStart::Tracking { .. })));
    assert!(matches!(second, Err(SubmitError::SyncInProgress)));
    assert!(tracker.is_processing().await);
    assert_eq!(tracker.poller().registry().read().await.len(), 1);

    tracker.shutdown().await;
}

#[tokio::test]
async fn test_upload_slot_busy_per_report_type() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/upload/csat-report"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "jobId": "csat-1" }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/upload/omnix-report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "omnix-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    let (first, second, other) = tokio::join!(
        submitter.submit_upload(ReportType::Csat, "csat.xlsx", vec![1]),
        submitter.submit_upload(ReportType::Csat, "csat-again.xlsx", vec![2]),
        submitter.submit_upload(ReportType::Omnix, "omnix.xlsx", vec![3]),
    );
    submitter.poller().shutdown().await;

    assert_eq!(first.unwrap().id, JobId::from("csat-1"));
    assert!(matches!(second, Err(SubmitError::SlotBusy(ReportType::Csat))));
    assert_eq!(other.unwrap().id, JobId::from("omnix-1"));
    assert!(!submitter.is_uploading(ReportType::Csat));

    let registry = submitter.poller().registry().read().await;
    assert_eq!(registry.len(), 2);
    assert!(registry.get(&JobId::from("csat-1")).is_some());

    let busy: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|n| n.level == Level::Error)
        .map(|n| n.title)
        .collect();
    assert_eq!(busy, vec!["An upload for csat is already in progress"]);
}

#[tokio::test]
async fn test_untrackable_job_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/schedule/trigger-oca-sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobId": "job-7" })))
        .mount(&server)
        .await;

    let (submitter, mut rx) = session(&server);
    submitter
        .poller()
        .registry()
        .write()
        .await
        .register(Job::new("job-7", "earlier.xlsx", OperationKind::UploadCsat))
        .unwrap();

    let err = submitter
        .trigger_manual_sync(SyncRange::yesterday())
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::Registry(_)));

    let notifications = drain(&mut rx);
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].level, Level::Error);
    assert_eq!(notifications[0].title, "Job already tracked: job-7");

    let registry = submitter.poller().registry().read().await;
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(&JobId::from("job-7")).unwrap().label, "earlier.xlsx");
}
