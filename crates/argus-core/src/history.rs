use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::ScanConfig;
use crate::error::AuditError;
use crate::link::LinkRecord;

/// A finished scan to be persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScanHistory {
    pub scan_url: String,
    pub scan_date: DateTime<Utc>,
    pub duration_seconds: u64,
    pub config: ScanConfig,
    pub results: Vec<LinkRecord>,
    pub broken_count: u64,
    pub total_count: u64,
}

/// A persisted scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanHistory {
    pub id: Uuid,
    pub scan_url: String,
    pub scan_date: DateTime<Utc>,
    pub duration_seconds: u64,
    pub config: ScanConfig,
    pub results: Vec<LinkRecord>,
    pub broken_count: u64,
    pub total_count: u64,
}

/// Persists completed scans.
pub trait HistoryStore: Send + Sync + Clone {
    /// Save a finished scan. Returns the generated history id.
    fn save(&self, scan: &NewScanHistory) -> impl Future<Output = Result<Uuid, AuditError>> + Send;

    fn get(&self, id: Uuid) -> impl Future<Output = Result<Option<ScanHistory>, AuditError>> + Send;

    /// Most recent scans first.
    fn list(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ScanHistory>, AuditError>> + Send;
}

/// A no-op HistoryStore for use when persistence is not needed.
#[derive(Debug, Clone)]
pub struct NullHistoryStore;

impl HistoryStore for NullHistoryStore {
    async fn save(&self, _scan: &NewScanHistory) -> Result<Uuid, AuditError> {
        Ok(Uuid::nil())
    }

    async fn get(&self, _id: Uuid) -> Result<Option<ScanHistory>, AuditError> {
        Ok(None)
    }

    async fn list(&self, _limit: usize) -> Result<Vec<ScanHistory>, AuditError> {
        Ok(vec![])
    }
}

/// In-memory [`HistoryStore`] for single-process use.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    scans: Arc<Mutex<Vec<ScanHistory>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, scan: &NewScanHistory) -> Result<Uuid, AuditError> {
        let id = Uuid::new_v4();
        self.scans.lock().await.push(ScanHistory {
            id,
            scan_url: scan.scan_url.clone(),
            scan_date: scan.scan_date,
            duration_seconds: scan.duration_seconds,
            config: scan.config.clone(),
            results: scan.results.clone(),
            broken_count: scan.broken_count,
            total_count: scan.total_count,
        });
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScanHistory>, AuditError> {
        Ok(self.scans.lock().await.iter().find(|s| s.id == id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<ScanHistory>, AuditError> {
        let scans = self.scans.lock().await;
        Ok(scans.iter().rev().take(limit).cloned().collect())
    }
}
