use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::aggregator::ResultAggregator;
use crate::checker::{self, CheckOutcome, FetchMode, Fetcher, is_external_host};
use crate::config::ScanConfig;
use crate::error::AuditError;
use crate::exclusion::{ExclusionRules, PatternWarning};
use crate::extract::{self, DiscoveredLink};
use crate::job::{JobProgress, JobStatus};
use crate::job_store::JobStore;
use crate::link::{INITIAL_PROVENANCE, LinkRecord, LinkStatus, normalize_url};

/// One not-yet-visited URL awaiting crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontierEntry {
    /// Normalized URL (identity key).
    pub url: String,
    /// First-seen form, fragment preserved.
    pub display_url: String,
    /// BFS hops from the seed.
    pub depth: u32,
    /// Page that referenced this URL ([`INITIAL_PROVENANCE`] for the seed).
    pub found_on: String,
}

/// Serializable crawl state, persisted on pause so a later invocation can
/// resume exactly where the scan suspended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlSnapshot {
    pub frontier: VecDeque<FrontierEntry>,
    pub visited: BTreeSet<String>,
    pub force_excluded: BTreeSet<String>,
    pub records: Vec<LinkRecord>,
    pub pending: BTreeMap<String, BTreeSet<String>>,
    pub urls_scanned: u64,
}

/// How a crawl run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Frontier exhausted.
    Completed,
    /// Suspended by a pause request or worker shutdown; state snapshot-able.
    Paused,
    /// Terminated by a stop request; partial results preserved.
    Stopped,
}

enum Control {
    Continue,
    Pause,
    Stop,
}

/// Breadth-first crawl of one site, bounded by `config.depth`, with a
/// worker pool of `config.concurrency` concurrent link checks.
///
/// The frontier and visited set are exclusively owned by this instance;
/// control flags are re-read from the Job Store before each claim so that
/// pause/stop work across process restarts.
pub struct CrawlOrchestrator<F: Fetcher> {
    fetcher: F,
    config: ScanConfig,
    rules: ExclusionRules,
    origin_host: String,
    frontier: VecDeque<FrontierEntry>,
    visited: HashSet<String>,
    force_excluded: HashSet<String>,
    aggregator: ResultAggregator,
    urls_scanned: u64,
    current_url: Option<String>,
}

impl<F: Fetcher + 'static> CrawlOrchestrator<F> {
    /// Build a fresh orchestrator for `seed_url`.
    ///
    /// Fails fast on an unrunnable configuration or an unparsable seed;
    /// malformed exclusion patterns are returned as warnings instead.
    pub fn new(
        seed_url: &str,
        config: ScanConfig,
        fetcher: F,
    ) -> Result<(Self, Vec<PatternWarning>), AuditError> {
        let (mut orchestrator, warnings) = Self::empty(seed_url, config, fetcher)?;
        let seed = Url::parse(seed_url).map_err(|e| AuditError::InvalidUrl {
            url: seed_url.to_string(),
            reason: e.to_string(),
        })?;
        orchestrator.frontier.push_back(FrontierEntry {
            url: normalize_url(&seed),
            display_url: seed.to_string(),
            depth: 0,
            found_on: INITIAL_PROVENANCE.to_string(),
        });
        Ok((orchestrator, warnings))
    }

    /// Rebuild an orchestrator from a persisted snapshot (resume path).
    pub fn from_snapshot(
        seed_url: &str,
        config: ScanConfig,
        fetcher: F,
        snapshot: CrawlSnapshot,
    ) -> Result<(Self, Vec<PatternWarning>), AuditError> {
        let (mut orchestrator, warnings) = Self::empty(seed_url, config, fetcher)?;
        orchestrator.frontier = snapshot.frontier;
        orchestrator.visited = snapshot.visited.into_iter().collect();
        orchestrator.force_excluded = snapshot.force_excluded.into_iter().collect();
        orchestrator.aggregator = ResultAggregator::restore(snapshot.records, snapshot.pending);
        orchestrator.urls_scanned = snapshot.urls_scanned;
        Ok((orchestrator, warnings))
    }

    fn empty(
        seed_url: &str,
        config: ScanConfig,
        fetcher: F,
    ) -> Result<(Self, Vec<PatternWarning>), AuditError> {
        config.validate()?;
        let seed = Url::parse(seed_url).map_err(|e| AuditError::InvalidUrl {
            url: seed_url.to_string(),
            reason: e.to_string(),
        })?;
        let origin_host = seed
            .host_str()
            .ok_or_else(|| AuditError::InvalidUrl {
                url: seed_url.to_string(),
                reason: "URL has no host".into(),
            })?
            .to_string();
        let (rules, warnings) = ExclusionRules::compile(&config);
        Ok((
            Self {
                fetcher,
                config,
                rules,
                origin_host,
                frontier: VecDeque::new(),
                visited: HashSet::new(),
                force_excluded: HashSet::new(),
                aggregator: ResultAggregator::new(),
                urls_scanned: 0,
                current_url: None,
            },
            warnings,
        ))
    }

    /// Drive the crawl until the frontier is exhausted or a control flag
    /// suspends it. Network calls are the only suspension points; progress
    /// writes are best-effort and never abort the crawl.
    pub async fn run<S: JobStore>(
        &mut self,
        store: &S,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> CrawlOutcome {
        let mut tasks: JoinSet<(FrontierEntry, CheckOutcome)> = JoinSet::new();

        loop {
            match self.poll_control(store, job_id, cancel).await {
                Control::Stop => {
                    self.drain(&mut tasks, store, job_id).await;
                    return CrawlOutcome::Stopped;
                }
                Control::Pause => {
                    self.drain(&mut tasks, store, job_id).await;
                    return CrawlOutcome::Paused;
                }
                Control::Continue => {}
            }

            while tasks.len() < self.config.concurrency {
                match self.next_entry() {
                    Some(entry) => self.dispatch(&mut tasks, entry),
                    None => break,
                }
            }

            if tasks.is_empty() {
                if self.frontier.is_empty() {
                    return CrawlOutcome::Completed;
                }
                continue;
            }

            if let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((entry, outcome)) => {
                        self.handle_completed(&entry, outcome);
                        self.write_progress(store, job_id).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Link check task aborted");
                    }
                }
            }
        }
    }

    /// Aggregated records in first-seen order.
    pub fn results(&self) -> Vec<LinkRecord> {
        self.aggregator.results()
    }

    pub fn broken_count(&self) -> u64 {
        self.aggregator.broken_count()
    }

    pub fn total_links(&self) -> u64 {
        self.aggregator.total_count()
    }

    /// Live progress estimate; `total_urls` grows as the frontier expands.
    pub fn progress(&self) -> JobProgress {
        let total_urls = (self.visited.len() + self.frontier.len()) as u64;
        let progress_percent = if total_urls == 0 {
            0.0
        } else {
            ((self.urls_scanned as f32 / total_urls as f32) * 100.0).min(100.0)
        };
        JobProgress {
            progress_percent,
            current_url: self.current_url.clone(),
            urls_scanned: self.urls_scanned,
            total_urls,
            broken_links: self.aggregator.broken_count(),
            total_links: self.aggregator.total_count(),
        }
    }

    /// Snapshot the whole crawl state for pause/resume.
    ///
    /// Only valid between [`run`](Self::run) calls — in-flight checks have
    /// been drained by the time `run` returns.
    pub fn snapshot(&self) -> CrawlSnapshot {
        let (records, pending) = self.aggregator.snapshot_parts();
        CrawlSnapshot {
            frontier: self.frontier.clone(),
            visited: self.visited.iter().cloned().collect(),
            force_excluded: self.force_excluded.iter().cloned().collect(),
            records,
            pending,
            urls_scanned: self.urls_scanned,
        }
    }

    async fn poll_control<S: JobStore>(
        &self,
        store: &S,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Control {
        if cancel.is_cancelled() {
            return Control::Pause;
        }
        match store.get_job(job_id).await {
            Ok(Some(job)) => match job.status {
                JobStatus::Stopping => Control::Stop,
                JobStatus::Pausing => Control::Pause,
                _ => Control::Continue,
            },
            Ok(None) => Control::Continue,
            Err(e) => {
                // A flaky store must not kill the crawl; keep running and
                // re-read at the next boundary.
                tracing::warn!(%job_id, error = %e, "Failed to read control flags");
                Control::Continue
            }
        }
    }

    /// Pop the next eligible frontier entry, filtering visited (when dedup
    /// is on) and excluded URLs.
    fn next_entry(&mut self) -> Option<FrontierEntry> {
        while let Some(entry) = self.frontier.pop_front() {
            if self.force_excluded.contains(&entry.url) {
                continue;
            }
            if self.config.scan_same_link_once && self.visited.contains(&entry.url) {
                continue;
            }
            if self.rules.is_excluded(&entry.url) {
                continue;
            }
            self.visited.insert(entry.url.clone());
            return Some(entry);
        }
        None
    }

    fn dispatch(&mut self, tasks: &mut JoinSet<(FrontierEntry, CheckOutcome)>, entry: FrontierEntry) {
        self.urls_scanned += 1;

        let url = match Url::parse(&entry.url) {
            Ok(url) => url,
            Err(e) => {
                // Frontier entries come from resolved URLs, so this only
                // happens with a corrupted snapshot; record and move on.
                let outcome = CheckOutcome {
                    status: LinkStatus::Error,
                    status_code: None,
                    content_type: None,
                    error_message: Some(format!("Invalid URL: {e}")),
                    used_auth: false,
                    auth_decision: crate::link::AuthDecision::RequestError,
                    body: None,
                };
                self.handle_completed(&entry, outcome);
                return;
            }
        };

        let external = url
            .host_str()
            .map(|host| is_external_host(host, &self.origin_host, &self.config))
            .unwrap_or(false);
        // External pages are status-checked but never expanded; in-scope
        // pages are expanded only while below the depth bound.
        let expand = !external && entry.depth < self.config.depth;
        let mode = if expand {
            FetchMode::Document
        } else {
            FetchMode::StatusOnly
        };

        let fetcher = self.fetcher.clone();
        let config = self.config.clone();
        let origin_host = self.origin_host.clone();
        tasks.spawn(async move {
            let outcome =
                checker::check_url(&fetcher, &url, mode, &config, &origin_host, external).await;
            (entry, outcome)
        });
    }

    fn handle_completed(&mut self, entry: &FrontierEntry, outcome: CheckOutcome) {
        self.current_url = Some(entry.display_url.clone());
        self.aggregator
            .record_check(&entry.url, &entry.display_url, &outcome, Some(&entry.found_on));

        let Some(body) = outcome.body.as_deref() else {
            return;
        };
        let Ok(page_url) = Url::parse(&entry.url) else {
            return;
        };

        for link in extract::extract_links(body, &page_url, &self.rules) {
            match link {
                DiscoveredLink::NonWeb { href, .. } => {
                    self.aggregator.record_skipped(&href, &entry.url);
                }
                DiscoveredLink::Web {
                    url,
                    excluded_subtree,
                } => {
                    let key = normalize_url(&url);
                    if excluded_subtree {
                        if self.rules.force_exclude() {
                            // Blacklist for the remainder of the scan, even
                            // if the URL was already discovered elsewhere.
                            self.force_excluded.insert(key.clone());
                            self.aggregator.remove(&key);
                        }
                        continue;
                    }
                    if self.force_excluded.contains(&key) || self.rules.is_excluded(&key) {
                        continue;
                    }
                    self.aggregator.add_reference(&key, &entry.url);
                    if !(self.config.scan_same_link_once && self.visited.contains(&key)) {
                        self.frontier.push_back(FrontierEntry {
                            url: key,
                            display_url: url.to_string(),
                            depth: entry.depth + 1,
                            found_on: entry.url.clone(),
                        });
                    }
                }
            }
        }
    }

    async fn drain<S: JobStore>(
        &mut self,
        tasks: &mut JoinSet<(FrontierEntry, CheckOutcome)>,
        store: &S,
        job_id: Uuid,
    ) {
        while let Some(joined) = tasks.join_next().await {
            if let Ok((entry, outcome)) = joined {
                self.handle_completed(&entry, outcome);
            }
        }
        self.write_progress(store, job_id).await;
    }

    async fn write_progress<S: JobStore>(&self, store: &S, job_id: Uuid) {
        if let Err(e) = store.update_progress(job_id, &self.progress()).await {
            tracing::warn!(%job_id, error = %e, "Failed to persist progress");
        }
    }
}
