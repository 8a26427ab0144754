use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::checker::Fetcher;
use crate::controller::{JobController, JobOutcome};
use crate::error::AuditError;
use crate::history::HistoryStore;
use crate::job::{JobStatus, ScanJob, WorkerConfig};
use crate::job_store::JobStore;

/// Events emitted by the worker for monitoring/logging.
#[derive(Debug, Clone)]
pub enum WorkerEvent<'a> {
    Started {
        worker_id: &'a str,
    },
    Polling,
    JobClaimed {
        job: &'a ScanJob,
    },
    JobFinished {
        job_id: Uuid,
        status: JobStatus,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
    },
    Stopped {
        worker_id: &'a str,
    },
}

/// Trait for receiving worker events (decoupled logging).
pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(%worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::debug!("Polling for jobs");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(job_id = %job.id, url = %job.url, "Job claimed");
            }
            WorkerEvent::JobFinished { job_id, status } => {
                tracing::info!(%job_id, %status, "Job finished");
            }
            WorkerEvent::JobFailed { job_id, error } => {
                tracing::warn!(%job_id, %error, "Job failed");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(%worker_id, "Worker stopped");
            }
        }
    }
}

/// Worker Dispatcher: pulls the next queued job and drives it to completion
/// or suspension.
///
/// [`run`](Self::run) is the always-on loop; [`run_once`](Self::run_once)
/// is the single-poll entry for trigger-style deployments. Cancelling the
/// token mid-scan suspends the active job like a pause (snapshot persisted),
/// so a shut-down worker never loses progress.
pub struct WorkerService<S, H, F>
where
    S: JobStore,
    H: HistoryStore,
    F: Fetcher,
{
    store: S,
    history: H,
    fetcher: F,
    config: WorkerConfig,
}

impl<S, H, F> WorkerService<S, H, F>
where
    S: JobStore,
    H: HistoryStore,
    F: Fetcher + 'static,
{
    pub fn new(store: S, history: H, fetcher: F, config: WorkerConfig) -> Self {
        Self {
            store,
            history,
            fetcher,
            config,
        }
    }

    /// Run the worker loop until cancellation.
    pub async fn run<WR: WorkerReporter>(
        &self,
        cancel_token: CancellationToken,
        reporter: &WR,
    ) -> Result<(), AuditError> {
        reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            if cancel_token.is_cancelled() {
                break;
            }

            reporter.report(WorkerEvent::Polling);

            match self.store.claim_pending_job(&self.config.worker_id).await {
                Ok(Some(job)) => {
                    reporter.report(WorkerEvent::JobClaimed { job: &job });
                    self.process_job(&job, &cancel_token, reporter).await;
                }
                Ok(None) => {
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job");
                    tokio::select! {
                        () = tokio::time::sleep(self.config.poll_interval * 2) => {}
                        () = cancel_token.cancelled() => break,
                    }
                }
            }
        }

        reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });

        Ok(())
    }

    /// Claim and process at most one queued job (polling-trigger contract).
    ///
    /// Returns `Ok(None)` when nothing was queued. A job that fails is
    /// reported and also yields `Ok(None)` — claim errors are the only ones
    /// surfaced, matching the loop's behavior.
    pub async fn run_once<WR: WorkerReporter>(
        &self,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) -> Result<Option<JobOutcome>, AuditError> {
        match self.store.claim_pending_job(&self.config.worker_id).await? {
            Some(job) => {
                reporter.report(WorkerEvent::JobClaimed { job: &job });
                Ok(self.process_job(&job, cancel_token, reporter).await)
            }
            None => Ok(None),
        }
    }

    async fn process_job<WR: WorkerReporter>(
        &self,
        job: &ScanJob,
        cancel_token: &CancellationToken,
        reporter: &WR,
    ) -> Option<JobOutcome> {
        let controller = JobController::new(
            self.store.clone(),
            self.history.clone(),
            self.fetcher.clone(),
        );
        match controller.run(job, cancel_token).await {
            Ok(outcome) => {
                reporter.report(WorkerEvent::JobFinished {
                    job_id: job.id,
                    status: outcome.status,
                });
                Some(outcome)
            }
            Err(e) => {
                let error = e.to_string();
                reporter.report(WorkerEvent::JobFailed {
                    job_id: job.id,
                    error: &error,
                });
                None
            }
        }
    }
}
