use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Sentinel `foundOn` entry for the seed URL, which no page references.
pub const INITIAL_PROVENANCE: &str = "initial";

/// Outcome classification for a single checked URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    /// Reachable, status code below 400.
    Ok,
    /// Status code 400 or above.
    Broken,
    /// Network failure or timeout before a status code was obtained.
    Error,
    /// Reachable but out of scope (different host, per config).
    External,
    /// Non-HTTP scheme, never fetched.
    Skipped,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkStatus::Ok => "ok",
            LinkStatus::Broken => "broken",
            LinkStatus::Error => "error",
            LinkStatus::External => "external",
            LinkStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ok" => Ok(LinkStatus::Ok),
            "broken" => Ok(LinkStatus::Broken),
            "error" => Ok(LinkStatus::Error),
            "external" => Ok(LinkStatus::External),
            "skipped" => Ok(LinkStatus::Skipped),
            _ => Err(format!("Unknown link status: {s}")),
        }
    }
}

/// Why credentials were or were not attached to a request.
///
/// Recorded verbatim on every record so a later re-check can reproduce the
/// exact same behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthDecision {
    AuthUsedSameDomain,
    AuthUsedAllDomains,
    AuthSkippedDifferentDomain,
    NoAuthCredentials,
    RequestTimeout,
    RequestError,
}

impl AuthDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthDecision::AuthUsedSameDomain => "auth_used_same_domain",
            AuthDecision::AuthUsedAllDomains => "auth_used_all_domains",
            AuthDecision::AuthSkippedDifferentDomain => "auth_skipped_different_domain",
            AuthDecision::NoAuthCredentials => "no_auth_credentials",
            AuthDecision::RequestTimeout => "request_timeout",
            AuthDecision::RequestError => "request_error",
        }
    }
}

impl fmt::Display for AuthDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One record per unique URL encountered during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRecord {
    /// First-seen form of the URL, fragment preserved for display.
    pub url: String,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Pages that reference this URL. Append-only during a scan; never empty
    /// except for the seed, whose sentinel entry is [`INITIAL_PROVENANCE`].
    pub found_on: BTreeSet<String>,
    pub used_auth: bool,
    pub auth_decision: AuthDecision,
}

impl LinkRecord {
    pub fn is_broken(&self) -> bool {
        matches!(self.status, LinkStatus::Broken)
    }
}

/// Identity key for a URL: fragment stripped, everything else intact.
///
/// `https://a.test/p#top` and `https://a.test/p#bottom` are the same link
/// for visited-set and aggregation purposes.
pub fn normalize_url(url: &Url) -> String {
    if url.fragment().is_some() {
        let mut stripped = url.clone();
        stripped.set_fragment(None);
        stripped.to_string()
    } else {
        url.to_string()
    }
}
