pub mod aggregator;
pub mod checker;
pub mod config;
pub mod controller;
pub mod crawler;
pub mod error;
pub mod exclusion;
pub mod extract;
pub mod history;
pub mod job;
pub mod job_store;
pub mod link;
pub mod testutil;
pub mod worker;

pub use checker::{Fetcher, recheck_url};
pub use config::{AuthConfig, ScanConfig};
pub use controller::{JobController, JobOutcome};
pub use crawler::{CrawlOrchestrator, CrawlOutcome, CrawlSnapshot};
pub use error::AuditError;
pub use history::{HistoryStore, MemoryHistoryStore, NewScanHistory, NullHistoryStore, ScanHistory};
pub use job::{ControlFlag, CreateScanJobRequest, JobStatus, LogLevel, ScanJob, WorkerConfig};
pub use job_store::{JobStore, MemoryJobStore};
pub use link::{AuthDecision, LinkRecord, LinkStatus};
pub use worker::{TracingWorkerReporter, WorkerService};
