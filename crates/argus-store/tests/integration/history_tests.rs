use std::collections::BTreeSet;

use argus_core::ScanConfig;
use argus_core::history::{HistoryStore, NewScanHistory};
use argus_core::link::{AuthDecision, LinkRecord, LinkStatus};
use argus_store::ScanHistoryRepository;
use chrono::Utc;

use crate::common::setup_test_db;

fn sample_scan(url: &str) -> NewScanHistory {
    NewScanHistory {
        scan_url: url.to_string(),
        scan_date: Utc::now(),
        duration_seconds: 34,
        config: ScanConfig {
            depth: 1,
            ..Default::default()
        },
        results: vec![LinkRecord {
            url: format!("{url}missing"),
            status: LinkStatus::Broken,
            status_code: Some(404),
            content_type: None,
            error_message: None,
            found_on: BTreeSet::from([url.to_string()]),
            used_auth: false,
            auth_decision: AuthDecision::NoAuthCredentials,
        }],
        broken_count: 1,
        total_count: 1,
    }
}

#[tokio::test]
async fn save_and_get_round_trip() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanHistoryRepository::new(pool);

    let id = repo.save(&sample_scan("https://example.com/")).await.unwrap();
    let stored = repo.get(id).await.unwrap().unwrap();

    assert_eq!(stored.scan_url, "https://example.com/");
    assert_eq!(stored.duration_seconds, 34);
    assert_eq!(stored.broken_count, 1);
    assert_eq!(stored.config.depth, 1);
    assert_eq!(stored.results.len(), 1);
    assert_eq!(stored.results[0].status, LinkStatus::Broken);
    assert_eq!(stored.results[0].status_code, Some(404));
}

#[tokio::test]
async fn get_unknown_id_returns_none() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanHistoryRepository::new(pool);

    assert!(repo.get(uuid::Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_returns_newest_first_with_limit() {
    let (pool, _container) = setup_test_db().await;
    let repo = ScanHistoryRepository::new(pool);

    repo.save(&NewScanHistory {
        scan_date: Utc::now() - chrono::TimeDelta::hours(2),
        ..sample_scan("https://old.example.com/")
    })
    .await
    .unwrap();
    repo.save(&sample_scan("https://new.example.com/")).await.unwrap();

    let listed = repo.list(10).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].scan_url, "https://new.example.com/");
    assert_eq!(listed[1].scan_url, "https://old.example.com/");

    let limited = repo.list(1).await.unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].scan_url, "https://new.example.com/");
}
