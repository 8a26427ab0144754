use std::collections::{BTreeMap, BTreeSet, VecDeque};

use argus_core::crawler::{CrawlSnapshot, FrontierEntry};
use argus_core::job::{ControlFlag, CreateScanJobRequest, JobProgress, JobStatus, LogLevel};
use argus_core::job_store::JobStore;
use argus_core::link::{AuthDecision, LinkRecord, LinkStatus};
use argus_core::{AuthConfig, ScanConfig};
use argus_store::ScanJobRepository;

use crate::common::setup_test_db;

fn test_request() -> CreateScanJobRequest {
    CreateScanJobRequest::new(
        "https://example.com",
        ScanConfig {
            depth: 2,
            concurrency: 4,
            auth: Some(AuthConfig {
                username: "user".into(),
                password: "secret".into(),
            }),
            ..Default::default()
        },
    )
}

fn test_record(url: &str, status: LinkStatus) -> LinkRecord {
    LinkRecord {
        url: url.to_string(),
        status,
        status_code: Some(200),
        content_type: None,
        error_message: None,
        found_on: BTreeSet::from(["https://example.com/".to_string()]),
        used_auth: false,
        auth_decision: AuthDecision::NoAuthCredentials,
    }
}

fn test_snapshot() -> CrawlSnapshot {
    CrawlSnapshot {
        frontier: VecDeque::from([FrontierEntry {
            url: "https://example.com/next".into(),
            display_url: "https://example.com/next".into(),
            depth: 1,
            found_on: "https://example.com/".into(),
        }]),
        visited: BTreeSet::from(["https://example.com/".to_string()]),
        force_excluded: BTreeSet::new(),
        records: vec![test_record("https://example.com/", LinkStatus::Ok)],
        pending: BTreeMap::new(),
        urls_scanned: 1,
    }
}

#[tokio::test]
async fn create_job_and_verify_fields() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();

    assert_eq!(job.url, "https://example.com");
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.config.depth, 2);
    assert_eq!(job.config.concurrency, 4);
    assert_eq!(job.config.auth.as_ref().unwrap().username, "user");
    assert_eq!(job.progress.urls_scanned, 0);
    assert!(job.results.is_none());
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn claim_is_fifo_and_exclusive() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let first = repo.create_job(test_request()).await.unwrap();
    let second = repo.create_job(test_request()).await.unwrap();

    let claimed = repo.claim_pending_job("worker-a").await.unwrap().unwrap();
    assert_eq!(claimed.id, first.id);
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-a"));
    assert!(claimed.started_at.is_some());

    let claimed = repo.claim_pending_job("worker-b").await.unwrap().unwrap();
    assert_eq!(claimed.id, second.id);

    assert!(repo.claim_pending_job("worker-c").await.unwrap().is_none());
}

#[tokio::test]
async fn progress_updates_round_trip() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();
    repo.claim_pending_job("worker-a").await.unwrap();

    let progress = JobProgress {
        progress_percent: 42.5,
        current_url: Some("https://example.com/page".into()),
        urls_scanned: 17,
        total_urls: 40,
        broken_links: 3,
        total_links: 25,
    };
    repo.update_progress(job.id, &progress).await.unwrap();

    let stored = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.progress, progress);
}

#[tokio::test]
async fn control_flag_transitions() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();

    // Pause is a no-op while queued
    repo.set_control_flag(job.id, ControlFlag::Pause).await.unwrap();
    assert_eq!(
        repo.get_job(job.id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );

    repo.claim_pending_job("worker-a").await.unwrap();
    repo.set_control_flag(job.id, ControlFlag::Pause).await.unwrap();
    assert_eq!(
        repo.get_job(job.id).await.unwrap().unwrap().status,
        JobStatus::Pausing
    );

    repo.set_status(job.id, JobStatus::Paused).await.unwrap();
    repo.set_control_flag(job.id, ControlFlag::Resume).await.unwrap();
    assert_eq!(
        repo.get_job(job.id).await.unwrap().unwrap().status,
        JobStatus::Queued
    );

    // Stop while running requests cooperative shutdown
    repo.claim_pending_job("worker-a").await.unwrap();
    repo.set_control_flag(job.id, ControlFlag::Stop).await.unwrap();
    assert_eq!(
        repo.get_job(job.id).await.unwrap().unwrap().status,
        JobStatus::Stopping
    );
}

#[tokio::test]
async fn stop_on_paused_job_recovers_snapshot_results() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();
    repo.claim_pending_job("worker-a").await.unwrap();
    repo.save_snapshot(job.id, &test_snapshot()).await.unwrap();
    repo.set_status(job.id, JobStatus::Paused).await.unwrap();

    repo.set_control_flag(job.id, ControlFlag::Stop).await.unwrap();

    let stopped = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stopped.status, JobStatus::Stopped);
    assert!(stopped.completed_at.is_some());
    let results = stopped.results.expect("partial results from snapshot");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://example.com/");
}

#[tokio::test]
async fn terminal_status_is_immutable() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();
    repo.claim_pending_job("worker-a").await.unwrap();
    repo.set_terminal(
        job.id,
        JobStatus::Completed,
        Some(&[test_record("https://example.com/", LinkStatus::Ok)]),
        None,
    )
    .await
    .unwrap();

    repo.set_status(job.id, JobStatus::Running).await.unwrap();
    repo.set_terminal(job.id, JobStatus::Failed, None, Some("late failure"))
        .await
        .unwrap();
    repo.update_progress(job.id, &JobProgress {
        urls_scanned: 99,
        ..Default::default()
    })
    .await
    .unwrap();

    let stored = repo.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert!(stored.error_message.is_none());
    assert_eq!(stored.progress.urls_scanned, 0);
    assert_eq!(stored.results.unwrap().len(), 1);
}

#[tokio::test]
async fn snapshot_round_trip() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();
    assert!(repo.load_snapshot(job.id).await.unwrap().is_none());

    let snapshot = test_snapshot();
    repo.save_snapshot(job.id, &snapshot).await.unwrap();

    let loaded = repo.load_snapshot(job.id).await.unwrap().unwrap();
    assert_eq!(loaded.frontier, snapshot.frontier);
    assert_eq!(loaded.visited, snapshot.visited);
    assert_eq!(loaded.urls_scanned, 1);
    assert_eq!(loaded.records.len(), 1);
    assert_eq!(loaded.records[0].status, LinkStatus::Ok);
}

#[tokio::test]
async fn logs_append_and_read_back_in_order() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanJobRepository::new(pool);

    let job = repo.create_job(test_request()).await.unwrap();
    repo.append_log(job.id, LogLevel::Info, "Scan started", None)
        .await
        .unwrap();
    repo.append_log(
        job.id,
        LogLevel::Warn,
        "Ignoring invalid regex exclusion pattern",
        Some(serde_json::json!({"pattern": "[unclosed"})),
    )
    .await
    .unwrap();

    let logs = repo.logs(job.id).await.unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0].level, LogLevel::Info);
    assert_eq!(logs[0].message, "Scan started");
    assert_eq!(logs[1].level, LogLevel::Warn);
    assert_eq!(logs[1].data.as_ref().unwrap()["pattern"], "[unclosed");
}
