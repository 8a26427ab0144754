use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::crawler::CrawlSnapshot;
use crate::error::AuditError;
use crate::job::{
    ControlFlag, CreateScanJobRequest, JobLogEntry, JobProgress, JobStatus, LogLevel, ScanJob,
};
use crate::link::LinkRecord;

/// Persistent store for scan jobs.
///
/// Control flags are written here out-of-band and observed cooperatively by
/// the running orchestrator, so pause/resume/stop survive process restarts.
/// Transitions applied by `set_control_flag`:
///
/// - `pause`: `running` → `pausing`
/// - `resume`: `paused` → `queued` (the snapshot is retained for the next
///   worker invocation)
/// - `stop`: `running`/`pausing` → `stopping`; a `paused` or `queued` job
///   has no worker to observe the flag and goes straight to `stopped`,
///   preserving partial results from the snapshot when one exists.
///
/// Terminal states are immutable: implementations must ignore writes to a
/// job that is already `completed`, `failed` or `stopped`.
pub trait JobStore: Send + Sync + Clone {
    fn create_job(
        &self,
        request: CreateScanJobRequest,
    ) -> impl Future<Output = Result<ScanJob, AuditError>> + Send;

    fn get_job(&self, job_id: Uuid)
    -> impl Future<Output = Result<Option<ScanJob>, AuditError>> + Send;

    /// Atomically claim the oldest queued job for processing.
    ///
    /// Returns `None` if no jobs are available.
    fn claim_pending_job(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<Option<ScanJob>, AuditError>> + Send;

    fn update_progress(
        &self,
        job_id: Uuid,
        progress: &JobProgress,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn set_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    /// Write a final status together with results and/or error message.
    fn set_terminal(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results: Option<&[LinkRecord]>,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn set_control_flag(
        &self,
        job_id: Uuid,
        flag: ControlFlag,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn save_snapshot(
        &self,
        job_id: Uuid,
        snapshot: &CrawlSnapshot,
    ) -> impl Future<Output = Result<(), AuditError>> + Send;

    fn load_snapshot(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<CrawlSnapshot>, AuditError>> + Send;
}

/// In-memory [`JobStore`] for single-process use: direct CLI scans and
/// engine tests. State is shared across clones.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<Mutex<Vec<ScanJob>>>,
    logs: Arc<Mutex<HashMap<Uuid, Vec<JobLogEntry>>>>,
    snapshots: Arc<Mutex<HashMap<Uuid, CrawlSnapshot>>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log lines recorded for a job, oldest first.
    pub async fn logs(&self, job_id: Uuid) -> Vec<JobLogEntry> {
        self.logs
            .lock()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl JobStore for MemoryJobStore {
    async fn create_job(&self, request: CreateScanJobRequest) -> Result<ScanJob, AuditError> {
        let now = Utc::now();
        let job = ScanJob {
            id: Uuid::new_v4(),
            url: request.url,
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            config: request.config,
            results: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            worker_id: None,
        };
        self.jobs.lock().await.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ScanJob>, AuditError> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .find(|j| j.id == job_id)
            .cloned())
    }

    async fn claim_pending_job(&self, worker_id: &str) -> Result<Option<ScanJob>, AuditError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.status == JobStatus::Queued) {
            job.status = JobStatus::Running;
            job.worker_id = Some(worker_id.to_string());
            job.started_at = Some(Utc::now());
            job.updated_at = Utc::now();
            Ok(Some(job.clone()))
        } else {
            Ok(None)
        }
    }

    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), AuditError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if !job.status.is_terminal() {
                job.progress = progress.clone();
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), AuditError> {
        self.logs.lock().await.entry(job_id).or_default().push(JobLogEntry {
            level,
            message: message.to_string(),
            data,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), AuditError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if !job.status.is_terminal() {
                job.status = status;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn set_terminal(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results: Option<&[LinkRecord]>,
        error: Option<&str>,
    ) -> Result<(), AuditError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            if !job.status.is_terminal() {
                job.status = status;
                job.results = results.map(<[LinkRecord]>::to_vec);
                job.error_message = error.map(str::to_string);
                job.completed_at = Some(Utc::now());
                job.updated_at = Utc::now();
                job.worker_id = None;
            }
        }
        Ok(())
    }

    async fn set_control_flag(&self, job_id: Uuid, flag: ControlFlag) -> Result<(), AuditError> {
        let snapshot_results = {
            let snapshots = self.snapshots.lock().await;
            snapshots.get(&job_id).map(|s| s.records.clone())
        };

        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
            return Ok(());
        };
        match (flag, job.status) {
            (ControlFlag::Pause, JobStatus::Running) => job.status = JobStatus::Pausing,
            (ControlFlag::Resume, JobStatus::Paused) => job.status = JobStatus::Queued,
            (ControlFlag::Stop, JobStatus::Running | JobStatus::Pausing) => {
                job.status = JobStatus::Stopping;
            }
            (ControlFlag::Stop, JobStatus::Paused | JobStatus::Queued) => {
                job.status = JobStatus::Stopped;
                if job.results.is_none() {
                    job.results = snapshot_results;
                }
                job.completed_at = Some(Utc::now());
            }
            _ => return Ok(()),
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn save_snapshot(&self, job_id: Uuid, snapshot: &CrawlSnapshot) -> Result<(), AuditError> {
        self.snapshots.lock().await.insert(job_id, snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, job_id: Uuid) -> Result<Option<CrawlSnapshot>, AuditError> {
        Ok(self.snapshots.lock().await.get(&job_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;

    async fn queued_job(store: &MemoryJobStore) -> ScanJob {
        store
            .create_job(CreateScanJobRequest::new(
                "https://example.test/",
                ScanConfig::default(),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let store = MemoryJobStore::new();
        let first = queued_job(&store).await;
        let _second = queued_job(&store).await;

        let claimed = store.claim_pending_job("w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.worker_id.as_deref(), Some("w1"));
        assert!(claimed.started_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_returns_none_when_empty() {
        let store = MemoryJobStore::new();
        assert!(store.claim_pending_job("w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pause_resume_transitions() {
        let store = MemoryJobStore::new();
        let job = queued_job(&store).await;

        // Pause is ignored while queued
        store.set_control_flag(job.id, ControlFlag::Pause).await.unwrap();
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Queued);

        store.claim_pending_job("w1").await.unwrap();
        store.set_control_flag(job.id, ControlFlag::Pause).await.unwrap();
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Pausing);

        store.set_status(job.id, JobStatus::Paused).await.unwrap();
        store.set_control_flag(job.id, ControlFlag::Resume).await.unwrap();
        assert_eq!(store.get_job(job.id).await.unwrap().unwrap().status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_stop_on_paused_job_is_immediately_terminal() {
        let store = MemoryJobStore::new();
        let job = queued_job(&store).await;
        store.claim_pending_job("w1").await.unwrap();
        store.set_status(job.id, JobStatus::Paused).await.unwrap();

        store.set_control_flag(job.id, ControlFlag::Stop).await.unwrap();
        let stopped = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stopped.status, JobStatus::Stopped);
        assert!(stopped.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_status_is_immutable() {
        let store = MemoryJobStore::new();
        let job = queued_job(&store).await;
        store
            .set_terminal(job.id, JobStatus::Completed, Some(&[]), None)
            .await
            .unwrap();

        store.set_status(job.id, JobStatus::Running).await.unwrap();
        store
            .set_terminal(job.id, JobStatus::Failed, None, Some("late"))
            .await
            .unwrap();
        store
            .update_progress(job.id, &JobProgress {
                urls_scanned: 99,
                ..Default::default()
            })
            .await
            .unwrap();

        let unchanged = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, JobStatus::Completed);
        assert!(unchanged.error_message.is_none());
        assert_eq!(unchanged.progress.urls_scanned, 0);
    }

    #[tokio::test]
    async fn test_logs_append_in_order() {
        let store = MemoryJobStore::new();
        let job = queued_job(&store).await;
        store
            .append_log(job.id, LogLevel::Info, "Scan started", None)
            .await
            .unwrap();
        store
            .append_log(
                job.id,
                LogLevel::Warn,
                "Invalid pattern",
                Some(serde_json::json!({"pattern": "[unclosed"})),
            )
            .await
            .unwrap();

        let logs = store.logs(job.id).await;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].level, LogLevel::Info);
        assert_eq!(logs[1].level, LogLevel::Warn);
        assert!(logs[1].data.is_some());
    }
}
