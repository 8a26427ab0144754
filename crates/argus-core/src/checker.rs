use std::future::Future;
use std::time::Duration;

use url::Url;

use crate::config::{AuthConfig, ScanConfig};
use crate::error::AuditError;
use crate::link::{AuthDecision, LinkRecord, LinkStatus};

/// How the response body is to be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Only the status line matters (HEAD with GET fallback).
    StatusOnly,
    /// The document body will be parsed for links (GET).
    Document,
}

/// One outgoing request.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub mode: FetchMode,
    pub timeout: Duration,
    pub auth: Option<&'a AuthConfig>,
}

/// The observable outcome of a request that reached the server.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status_code: u16,
    pub content_type: Option<String>,
    /// Present only for [`FetchMode::Document`] requests with an HTML body.
    pub body: Option<String>,
}

impl FetchResponse {
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(false)
    }
}

/// Issues the network request for one URL.
///
/// Implementations map transport failures onto [`AuditError::Timeout`] /
/// [`AuditError::Network`]; an HTTP error status is a successful fetch.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(
        &self,
        request: FetchRequest<'_>,
    ) -> impl Future<Output = Result<FetchResponse, AuditError>> + Send;
}

/// Whether `host` is out of scope relative to the scan origin.
///
/// Subdomains of the origin are a configurable sub-case: in scope unless
/// `excludeSubdomains` is set. Any other differing host is external exactly
/// when `skipExternalDomains` is set.
pub fn is_external_host(host: &str, origin_host: &str, config: &ScanConfig) -> bool {
    if host.eq_ignore_ascii_case(origin_host) {
        return false;
    }
    let suffix = format!(".{origin_host}");
    if host.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase()) {
        return config.exclude_subdomains;
    }
    config.skip_external_domains
}

/// Decide whether credentials apply to `url`, and record why.
pub fn decide_auth<'a>(
    url: &Url,
    config: &'a ScanConfig,
    origin_host: &str,
) -> (Option<&'a AuthConfig>, AuthDecision) {
    let Some(auth) = config.auth.as_ref() else {
        return (None, AuthDecision::NoAuthCredentials);
    };
    if config.use_auth_for_all_domains {
        return (Some(auth), AuthDecision::AuthUsedAllDomains);
    }
    match url.host_str() {
        Some(host) if host.eq_ignore_ascii_case(origin_host) => {
            (Some(auth), AuthDecision::AuthUsedSameDomain)
        }
        _ => (None, AuthDecision::AuthSkippedDifferentDomain),
    }
}

/// Everything the orchestrator needs from one completed check.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: LinkStatus,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub error_message: Option<String>,
    pub used_auth: bool,
    pub auth_decision: AuthDecision,
    /// HTML body, present only for in-scope document fetches.
    pub body: Option<String>,
}

/// Check one URL and classify the outcome.
///
/// Never returns an error: transport failures fold into
/// `status = error` so the scan continues.
pub async fn check_url<F: Fetcher>(
    fetcher: &F,
    url: &Url,
    mode: FetchMode,
    config: &ScanConfig,
    origin_host: &str,
    external: bool,
) -> CheckOutcome {
    let (auth, auth_decision) = decide_auth(url, config, origin_host);
    let used_auth = auth.is_some();

    let request = FetchRequest {
        url: url.as_str(),
        mode,
        timeout: config.request_timeout(),
        auth,
    };

    match fetcher.fetch(request).await {
        Ok(response) => {
            let status = if response.status_code >= 400 {
                LinkStatus::Broken
            } else if external {
                LinkStatus::External
            } else {
                LinkStatus::Ok
            };
            CheckOutcome {
                status,
                status_code: Some(response.status_code),
                content_type: response.content_type.clone(),
                error_message: None,
                used_auth,
                auth_decision,
                body: response.body,
            }
        }
        Err(err) => {
            let auth_decision = match &err {
                AuditError::Timeout(_) => AuthDecision::RequestTimeout,
                _ => AuthDecision::RequestError,
            };
            CheckOutcome {
                status: LinkStatus::Error,
                status_code: None,
                content_type: None,
                error_message: Some(err.to_string()),
                used_auth,
                auth_decision,
                body: None,
            }
        }
    }
}

/// Stateless re-verification of a single already-scanned URL.
///
/// A pure function of `(url, config, original_scan_url)`: the original
/// scan's origin host drives the domain-scoping decisions, so a re-check
/// reproduces the scan's behavior exactly and is idempotent. Provenance is
/// left empty — the caller merges the persisted `foundOn` set.
pub async fn recheck_url<F: Fetcher>(
    fetcher: &F,
    url: &str,
    config: &ScanConfig,
    original_scan_url: &str,
) -> Result<LinkRecord, AuditError> {
    config.validate()?;

    let target = Url::parse(url).map_err(|e| AuditError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    let origin = Url::parse(original_scan_url).map_err(|e| AuditError::InvalidUrl {
        url: original_scan_url.to_string(),
        reason: e.to_string(),
    })?;
    let origin_host = origin
        .host_str()
        .ok_or_else(|| AuditError::InvalidUrl {
            url: original_scan_url.to_string(),
            reason: "URL has no host".into(),
        })?
        .to_string();

    let external = target
        .host_str()
        .map(|host| is_external_host(host, &origin_host, config))
        .unwrap_or(false);

    let outcome = check_url(
        fetcher,
        &target,
        FetchMode::StatusOnly,
        config,
        &origin_host,
        external,
    )
    .await;

    Ok(LinkRecord {
        url: target.to_string(),
        status: outcome.status,
        status_code: outcome.status_code,
        content_type: outcome.content_type,
        error_message: outcome.error_message,
        found_on: Default::default(),
        used_auth: outcome.used_auth,
        auth_decision: outcome.auth_decision,
    })
}
