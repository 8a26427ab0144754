use std::time::Instant;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::checker::Fetcher;
use crate::crawler::{CrawlOrchestrator, CrawlOutcome};
use crate::error::AuditError;
use crate::history::{HistoryStore, NewScanHistory};
use crate::job::{JobStatus, LogLevel, ScanJob};
use crate::job_store::JobStore;
use crate::link::LinkRecord;

/// The state a job ended this invocation in, with whatever was aggregated.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub results: Vec<LinkRecord>,
}

/// Wraps one crawl with persistence: progress and log lines during the run,
/// terminal status/results/error at the end, and a History Store entry for
/// completed scans.
///
/// Store failures during the crawl are logged and swallowed; only the final
/// terminal/history write surfaces an error to the caller.
pub struct JobController<S, H, F>
where
    S: JobStore,
    H: HistoryStore,
    F: Fetcher,
{
    store: S,
    history: H,
    fetcher: F,
}

impl<S, H, F> JobController<S, H, F>
where
    S: JobStore,
    H: HistoryStore,
    F: Fetcher + 'static,
{
    pub fn new(store: S, history: H, fetcher: F) -> Self {
        Self {
            store,
            history,
            fetcher,
        }
    }

    /// Run a claimed job to completion or suspension.
    ///
    /// Returns an error only on a fatal orchestrator problem (unparsable
    /// seed, rejected configuration) — persisted as `failed` first — or
    /// when the final terminal/history write fails.
    pub async fn run(
        &self,
        job: &ScanJob,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, AuditError> {
        let started = Instant::now();
        let scan_date = Utc::now();

        let snapshot = match self.store.load_snapshot(job.id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to load snapshot; starting fresh");
                None
            }
        };
        let resumed = snapshot.is_some();

        let built = match snapshot {
            Some(snapshot) => CrawlOrchestrator::from_snapshot(
                &job.url,
                job.config.clone(),
                self.fetcher.clone(),
                snapshot,
            ),
            None => CrawlOrchestrator::new(&job.url, job.config.clone(), self.fetcher.clone()),
        };
        let (mut orchestrator, warnings) = match built {
            Ok(built) => built,
            Err(e) => {
                let message = e.to_string();
                self.log(job, LogLevel::Error, &message, None).await;
                self.store
                    .set_terminal(job.id, JobStatus::Failed, None, Some(&message))
                    .await?;
                return Err(e);
            }
        };

        for warning in &warnings {
            self.log(
                job,
                LogLevel::Warn,
                &format!("Ignoring invalid {} exclusion pattern", warning.kind),
                Some(serde_json::json!({
                    "pattern": warning.pattern,
                    "reason": warning.reason,
                })),
            )
            .await;
        }

        self.log(
            job,
            LogLevel::Info,
            if resumed { "Scan resumed" } else { "Scan started" },
            Some(serde_json::json!({ "url": job.url })),
        )
        .await;

        let outcome = orchestrator.run(&self.store, job.id, cancel).await;
        let results = orchestrator.results();

        match outcome {
            CrawlOutcome::Completed => {
                self.log(
                    job,
                    LogLevel::Info,
                    "Scan completed",
                    Some(serde_json::json!({
                        "totalLinks": orchestrator.total_links(),
                        "brokenLinks": orchestrator.broken_count(),
                    })),
                )
                .await;
                self.store
                    .set_terminal(job.id, JobStatus::Completed, Some(&results), None)
                    .await?;

                let history = NewScanHistory {
                    scan_url: job.url.clone(),
                    scan_date,
                    duration_seconds: started.elapsed().as_secs(),
                    config: job.config.clone(),
                    results: results.clone(),
                    broken_count: orchestrator.broken_count(),
                    total_count: orchestrator.total_links(),
                };
                if let Err(e) = self.history.save(&history).await {
                    self.log(
                        job,
                        LogLevel::Error,
                        &format!("Failed to save scan history: {e}"),
                        None,
                    )
                    .await;
                    return Err(e);
                }

                Ok(JobOutcome {
                    status: JobStatus::Completed,
                    results,
                })
            }
            CrawlOutcome::Stopped => {
                self.log(
                    job,
                    LogLevel::Info,
                    "Scan stopped; partial results preserved",
                    Some(serde_json::json!({ "totalLinks": results.len() })),
                )
                .await;
                self.store
                    .set_terminal(job.id, JobStatus::Stopped, Some(&results), None)
                    .await?;
                Ok(JobOutcome {
                    status: JobStatus::Stopped,
                    results,
                })
            }
            CrawlOutcome::Paused => {
                // The snapshot is the resume state; losing it silently would
                // turn the pause into data loss, so this write may fail the
                // invocation.
                self.store.save_snapshot(job.id, &orchestrator.snapshot()).await?;
                self.store.set_status(job.id, JobStatus::Paused).await?;
                self.log(
                    job,
                    LogLevel::Info,
                    "Scan paused",
                    Some(serde_json::json!({
                        "urlsScanned": orchestrator.progress().urls_scanned,
                    })),
                )
                .await;
                Ok(JobOutcome {
                    status: JobStatus::Paused,
                    results,
                })
            }
        }
    }

    async fn log(
        &self,
        job: &ScanJob,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) {
        if let Err(e) = self.store.append_log(job.id, level, message, data).await {
            tracing::warn!(job_id = %job.id, error = %e, "Failed to append job log");
        }
    }
}
