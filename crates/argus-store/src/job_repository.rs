use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use argus_core::crawler::CrawlSnapshot;
use argus_core::error::AuditError;
use argus_core::job::{
    ControlFlag, CreateScanJobRequest, JobLogEntry, JobProgress, JobStatus, LogLevel, ScanJob,
};
use argus_core::job_store::JobStore;
use argus_core::link::LinkRecord;

/// PostgreSQL-backed job store using `SELECT FOR UPDATE SKIP LOCKED` for
/// atomic FIFO claims.
#[derive(Clone)]
pub struct ScanJobRepository {
    pool: Pool<Postgres>,
}

impl ScanJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Log lines recorded for a job, oldest first.
    pub async fn logs(&self, job_id: Uuid) -> Result<Vec<JobLogEntry>, AuditError> {
        let rows = sqlx::query_as::<_, JobLogRow>(
            r#"
            SELECT level, message, data, created_at
            FROM scan_job_logs
            WHERE job_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ScanJobRow {
    id: Uuid,
    url: String,
    status: String,
    progress_percent: f32,
    current_url: Option<String>,
    urls_scanned: i64,
    total_urls: i64,
    broken_links: i64,
    total_links: i64,
    config: serde_json::Value,
    results: Option<serde_json::Value>,
    error_message: Option<String>,
    worker_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ScanJobRow> for ScanJob {
    fn from(row: ScanJobRow) -> Self {
        ScanJob {
            id: row.id,
            url: row.url,
            status: row.status.parse().unwrap_or(JobStatus::Queued),
            progress: JobProgress {
                progress_percent: row.progress_percent,
                current_url: row.current_url,
                urls_scanned: row.urls_scanned as u64,
                total_urls: row.total_urls as u64,
                broken_links: row.broken_links as u64,
                total_links: row.total_links as u64,
            },
            config: serde_json::from_value(row.config).unwrap_or_default(),
            results: row
                .results
                .and_then(|value| serde_json::from_value(value).ok()),
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            worker_id: row.worker_id,
        }
    }
}

#[derive(sqlx::FromRow)]
struct JobLogRow {
    level: String,
    message: String,
    data: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<JobLogRow> for JobLogEntry {
    fn from(row: JobLogRow) -> Self {
        JobLogEntry {
            level: row.level.parse().unwrap_or(LogLevel::Info),
            message: row.message,
            data: row.data,
            created_at: row.created_at,
        }
    }
}

impl JobStore for ScanJobRepository {
    async fn create_job(&self, request: CreateScanJobRequest) -> Result<ScanJob, AuditError> {
        let config = serde_json::to_value(&request.config)?;
        let row = sqlx::query_as::<_, ScanJobRow>(
            r#"
            INSERT INTO scan_jobs (url, config)
            VALUES ($1, $2)
            RETURNING *
            "#,
        )
        .bind(&request.url)
        .bind(config)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(row.into())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<ScanJob>, AuditError> {
        let row = sqlx::query_as::<_, ScanJobRow>("SELECT * FROM scan_jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn claim_pending_job(&self, worker_id: &str) -> Result<Option<ScanJob>, AuditError> {
        let row = sqlx::query_as::<_, ScanJobRow>(
            r#"
            UPDATE scan_jobs
            SET status = 'running', worker_id = $1, started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM scan_jobs
                WHERE status = 'queued'
                ORDER BY created_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn update_progress(&self, job_id: Uuid, progress: &JobProgress) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET progress_percent = $2,
                current_url = $3,
                urls_scanned = $4,
                total_urls = $5,
                broken_links = $6,
                total_links = $7,
                updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('completed', 'failed', 'stopped')
            "#,
        )
        .bind(job_id)
        .bind(progress.progress_percent)
        .bind(progress.current_url.as_deref())
        .bind(progress.urls_scanned as i64)
        .bind(progress.total_urls as i64)
        .bind(progress.broken_links as i64)
        .bind(progress.total_links as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(())
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO scan_job_logs (job_id, level, message, data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(job_id)
        .bind(level.as_str())
        .bind(message)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(())
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = $2, updated_at = NOW()
            WHERE id = $1
              AND status NOT IN ('completed', 'failed', 'stopped')
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(())
    }

    async fn set_terminal(
        &self,
        job_id: Uuid,
        status: JobStatus,
        results: Option<&[LinkRecord]>,
        error: Option<&str>,
    ) -> Result<(), AuditError> {
        let results = results.map(serde_json::to_value).transpose()?;
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = $2,
                results = $3,
                error_message = $4,
                completed_at = NOW(),
                updated_at = NOW(),
                worker_id = NULL
            WHERE id = $1
              AND status NOT IN ('completed', 'failed', 'stopped')
            "#,
        )
        .bind(job_id)
        .bind(status.as_str())
        .bind(results)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(())
    }

    async fn set_control_flag(&self, job_id: Uuid, flag: ControlFlag) -> Result<(), AuditError> {
        let query = match flag {
            ControlFlag::Pause => {
                r#"
                UPDATE scan_jobs
                SET status = 'pausing', updated_at = NOW()
                WHERE id = $1 AND status = 'running'
                "#
            }
            ControlFlag::Resume => {
                r#"
                UPDATE scan_jobs
                SET status = 'queued', updated_at = NOW()
                WHERE id = $1 AND status = 'paused'
                "#
            }
            ControlFlag::Stop => {
                // A running worker observes 'stopping' cooperatively; a
                // paused or still-queued job has no worker, so it becomes
                // terminal right away with the snapshot's partial results.
                r#"
                WITH requested AS (
                    UPDATE scan_jobs
                    SET status = 'stopping', updated_at = NOW()
                    WHERE id = $1 AND status IN ('running', 'pausing')
                    RETURNING id
                )
                UPDATE scan_jobs
                SET status = 'stopped',
                    results = COALESCE(results, snapshot -> 'records'),
                    completed_at = NOW(),
                    updated_at = NOW(),
                    worker_id = NULL
                WHERE id = $1
                  AND status IN ('paused', 'queued')
                  AND NOT EXISTS (SELECT 1 FROM requested)
                "#
            }
        };

        sqlx::query(query)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(())
    }

    async fn save_snapshot(&self, job_id: Uuid, snapshot: &CrawlSnapshot) -> Result<(), AuditError> {
        let snapshot = serde_json::to_value(snapshot)?;
        sqlx::query(
            r#"
            UPDATE scan_jobs
            SET snapshot = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(snapshot)
        .execute(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;
        Ok(())
    }

    async fn load_snapshot(&self, job_id: Uuid) -> Result<Option<CrawlSnapshot>, AuditError> {
        let value: Option<(Option<serde_json::Value>,)> =
            sqlx::query_as("SELECT snapshot FROM scan_jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AuditError::Store(e.to_string()))?;

        match value.and_then(|(snapshot,)| snapshot) {
            Some(snapshot) => Ok(Some(serde_json::from_value(snapshot)?)),
            None => Ok(None),
        }
    }
}
