use std::collections::{BTreeMap, BTreeSet, HashMap};

use url::Url;

use crate::checker::CheckOutcome;
use crate::link::{AuthDecision, LinkRecord, LinkStatus, normalize_url};

/// Aggregation key for a URL string: the normalized (fragment-stripped)
/// form when it parses, the raw string otherwise (non-web hrefs).
pub fn record_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => normalize_url(&parsed),
        Err(_) => url.to_string(),
    }
}

/// Merges per-URL outcomes into one record per unique URL.
///
/// Owns the `foundOn` provenance sets exclusively: references are unioned
/// at discovery time (possibly before the URL has been checked) and the
/// status fields are filled in when the check completes. Insertion order is
/// preserved for stable result listings.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    records: HashMap<String, LinkRecord>,
    order: Vec<String>,
    /// Provenance for URLs referenced but not yet checked.
    pending: BTreeMap<String, BTreeSet<String>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore aggregator state from a snapshot.
    pub fn restore(records: Vec<LinkRecord>, pending: BTreeMap<String, BTreeSet<String>>) -> Self {
        let mut aggregator = Self {
            pending,
            ..Self::default()
        };
        for record in records {
            let key = record_key(&record.url);
            aggregator.order.push(key.clone());
            aggregator.records.insert(key, record);
        }
        aggregator
    }

    /// Note that `page` references the URL behind `key`.
    pub fn add_reference(&mut self, key: &str, page: &str) {
        if let Some(record) = self.records.get_mut(key) {
            record.found_on.insert(page.to_string());
        } else {
            self.pending
                .entry(key.to_string())
                .or_default()
                .insert(page.to_string());
        }
    }

    /// Record the outcome of a completed check.
    ///
    /// Creates the record on first sight (draining any pending provenance),
    /// or replaces the status fields on a re-check while leaving `found_on`
    /// append-only.
    pub fn record_check(
        &mut self,
        key: &str,
        display_url: &str,
        outcome: &CheckOutcome,
        found_on: Option<&str>,
    ) {
        let pending = self.pending.remove(key).unwrap_or_default();
        match self.records.get_mut(key) {
            Some(record) => {
                record.status = outcome.status;
                record.status_code = outcome.status_code;
                record.content_type = outcome.content_type.clone();
                record.error_message = outcome.error_message.clone();
                record.used_auth = outcome.used_auth;
                record.auth_decision = outcome.auth_decision;
                record.found_on.extend(pending);
                if let Some(page) = found_on {
                    record.found_on.insert(page.to_string());
                }
            }
            None => {
                let mut found_on_set = pending;
                if let Some(page) = found_on {
                    found_on_set.insert(page.to_string());
                }
                self.order.push(key.to_string());
                self.records.insert(
                    key.to_string(),
                    LinkRecord {
                        url: display_url.to_string(),
                        status: outcome.status,
                        status_code: outcome.status_code,
                        content_type: outcome.content_type.clone(),
                        error_message: outcome.error_message.clone(),
                        found_on: found_on_set,
                        used_auth: outcome.used_auth,
                        auth_decision: outcome.auth_decision,
                    },
                );
            }
        }
    }

    /// Record a non-web reference (`mailto:`, `tel:`, ...) that is never
    /// fetched.
    pub fn record_skipped(&mut self, href: &str, page: &str) {
        let key = record_key(href);
        let pending = self.pending.remove(&key).unwrap_or_default();
        match self.records.get_mut(&key) {
            Some(record) => {
                record.found_on.insert(page.to_string());
            }
            None => {
                let mut found_on = pending;
                found_on.insert(page.to_string());
                self.order.push(key.clone());
                self.records.insert(
                    key,
                    LinkRecord {
                        url: href.to_string(),
                        status: LinkStatus::Skipped,
                        status_code: None,
                        content_type: None,
                        error_message: None,
                        found_on,
                        used_auth: false,
                        auth_decision: AuthDecision::NoAuthCredentials,
                    },
                );
            }
        }
    }

    /// Drop a URL entirely (CSS force-exclusion): record and pending
    /// provenance both disappear.
    pub fn remove(&mut self, key: &str) {
        if self.records.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
        self.pending.remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// All records in first-seen order.
    pub fn results(&self) -> Vec<LinkRecord> {
        self.order
            .iter()
            .filter_map(|key| self.records.get(key))
            .cloned()
            .collect()
    }

    pub fn broken_count(&self) -> u64 {
        self.records.values().filter(|r| r.is_broken()).count() as u64
    }

    pub fn total_count(&self) -> u64 {
        self.records.len() as u64
    }

    /// State needed to rebuild the aggregator after a pause.
    pub fn snapshot_parts(&self) -> (Vec<LinkRecord>, BTreeMap<String, BTreeSet<String>>) {
        (self.results(), self.pending.clone())
    }
}
