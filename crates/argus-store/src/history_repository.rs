use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use argus_core::error::AuditError;
use argus_core::history::{HistoryStore, NewScanHistory, ScanHistory};

/// Repository for completed-scan persistence in PostgreSQL.
#[derive(Clone)]
pub struct ScanHistoryRepository {
    pool: Pool<Postgres>,
}

impl ScanHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ScanHistoryRow {
    id: Uuid,
    scan_url: String,
    scan_date: DateTime<Utc>,
    duration_seconds: i64,
    config: serde_json::Value,
    results: serde_json::Value,
    broken_count: i64,
    total_count: i64,
}

impl From<ScanHistoryRow> for ScanHistory {
    fn from(row: ScanHistoryRow) -> Self {
        ScanHistory {
            id: row.id,
            scan_url: row.scan_url,
            scan_date: row.scan_date,
            duration_seconds: row.duration_seconds as u64,
            config: serde_json::from_value(row.config).unwrap_or_default(),
            results: serde_json::from_value(row.results).unwrap_or_default(),
            broken_count: row.broken_count as u64,
            total_count: row.total_count as u64,
        }
    }
}

impl HistoryStore for ScanHistoryRepository {
    async fn save(&self, scan: &NewScanHistory) -> Result<Uuid, AuditError> {
        let config = serde_json::to_value(&scan.config)?;
        let results = serde_json::to_value(&scan.results)?;
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO scan_history
                (scan_url, scan_date, duration_seconds, config, results, broken_count, total_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&scan.scan_url)
        .bind(scan.scan_date)
        .bind(scan.duration_seconds as i64)
        .bind(config)
        .bind(results)
        .bind(scan.broken_count as i64)
        .bind(scan.total_count as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(row.0)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ScanHistory>, AuditError> {
        let row = sqlx::query_as::<_, ScanHistoryRow>(
            r#"
            SELECT id, scan_url, scan_date, duration_seconds, config, results, broken_count, total_count
            FROM scan_history
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list(&self, limit: usize) -> Result<Vec<ScanHistory>, AuditError> {
        let rows = sqlx::query_as::<_, ScanHistoryRow>(
            r#"
            SELECT id, scan_url, scan_date, duration_seconds, config, results, broken_count, total_count
            FROM scan_history
            ORDER BY scan_date DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AuditError::Store(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
