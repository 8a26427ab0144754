use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

/// SQL migration statements, executed one at a time. Mirrors migrations/.
const MIGRATIONS: &[&str] = &[
    // 0001_scan_jobs.sql
    r#"CREATE TABLE IF NOT EXISTS scan_jobs (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        url VARCHAR NOT NULL,
        status VARCHAR(20) NOT NULL DEFAULT 'queued',
        progress_percent REAL NOT NULL DEFAULT 0,
        current_url VARCHAR,
        urls_scanned BIGINT NOT NULL DEFAULT 0,
        total_urls BIGINT NOT NULL DEFAULT 0,
        broken_links BIGINT NOT NULL DEFAULT 0,
        total_links BIGINT NOT NULL DEFAULT 0,
        config JSONB NOT NULL,
        results JSONB,
        error_message TEXT,
        snapshot JSONB,
        worker_id VARCHAR(255),
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        started_at TIMESTAMPTZ,
        completed_at TIMESTAMPTZ,
        CONSTRAINT chk_scan_jobs_status CHECK (
            status IN ('queued', 'running', 'pausing', 'paused', 'stopping', 'stopped', 'completed', 'failed')
        )
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scan_jobs_queued ON scan_jobs(created_at) WHERE status = 'queued'"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scan_jobs_status ON scan_jobs(status, created_at DESC)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scan_jobs_worker ON scan_jobs(worker_id) WHERE status = 'running'"#,
    r#"CREATE TABLE IF NOT EXISTS scan_job_logs (
        id BIGSERIAL PRIMARY KEY,
        job_id UUID NOT NULL REFERENCES scan_jobs(id) ON DELETE CASCADE,
        level VARCHAR(8) NOT NULL,
        message TEXT NOT NULL,
        data JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scan_job_logs_job ON scan_job_logs(job_id, id)"#,
    // 0002_scan_history.sql
    r#"CREATE TABLE IF NOT EXISTS scan_history (
        id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        scan_url VARCHAR NOT NULL,
        scan_date TIMESTAMPTZ NOT NULL,
        duration_seconds BIGINT NOT NULL,
        config JSONB NOT NULL,
        results JSONB NOT NULL,
        broken_count BIGINT NOT NULL,
        total_count BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scan_history_date ON scan_history(scan_date DESC)"#,
    r#"CREATE INDEX IF NOT EXISTS idx_scan_history_url ON scan_history(scan_url, scan_date DESC)"#,
];

/// Spins up a PostgreSQL container and returns a connected pool.
///
/// The `ContainerAsync` must be kept in scope for the test duration —
/// dropping it will stop the container.
pub async fn setup_test_db() -> (PgPool, ContainerAsync<GenericImage>) {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "argus_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let connection_string = format!("postgresql://postgres:postgres@{host}:{port}/argus_test");

    // Retry connection until container is fully ready
    const MAX_RETRIES: u32 = 30;
    let mut retries = 0;
    let pool = loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .connect(&connection_string)
            .await
        {
            Ok(pool) => break pool,
            Err(e) => {
                retries += 1;
                if retries >= MAX_RETRIES {
                    panic!("Failed to connect to database after {MAX_RETRIES} retries: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    // Run migrations one statement at a time
    for migration in MIGRATIONS {
        sqlx::query(migration)
            .execute(&pool)
            .await
            .expect("Failed to run migration");
    }

    (pool, container)
}
