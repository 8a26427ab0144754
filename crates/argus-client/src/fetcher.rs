use std::net::IpAddr;

use argus_core::checker::{FetchMode, FetchRequest, FetchResponse, Fetcher};
use argus_core::error::AuditError;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Response};
use url::Url;

/// Fixed identifying User-Agent sent with every check.
const USER_AGENT: &str = "Argus/0.3 (Link Audit Engine)";

/// HTTP fetcher using reqwest.
///
/// Status-only checks issue a HEAD request and fall back to GET when the
/// server rejects the method; document checks issue a GET and return the
/// body for HTML responses. Redirects are followed (limit 10) and the
/// per-request timeout comes from the scan configuration.
///
/// By default, SSRF protection is **enabled** — requests to
/// private/reserved IP ranges are blocked. Use
/// [`allow_private_urls`](Self::allow_private_urls) to disable this (e.g.,
/// for CLI usage where the user controls the machine).
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    ssrf_protection: bool,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AuditError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| AuditError::Http(e.to_string()))?;

        Ok(Self {
            client,
            ssrf_protection: true,
        })
    }

    /// Disable SSRF protection, allowing requests to private/reserved IPs.
    ///
    /// Only use this where the user controls the machine.
    pub fn allow_private_urls(mut self) -> Self {
        self.ssrf_protection = false;
        self
    }

    async fn send(
        &self,
        method: Method,
        request: &FetchRequest<'_>,
    ) -> Result<Response, AuditError> {
        let timeout_secs = request.timeout.as_secs().max(1);
        let mut builder = self
            .client
            .request(method, request.url)
            .timeout(request.timeout);
        if let Some(auth) = request.auth {
            builder = builder.basic_auth(&auth.username, Some(&auth.password));
        }
        builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AuditError::Timeout(timeout_secs)
            } else if e.is_connect() {
                AuditError::Network(format!("Connection failed: {e}"))
            } else {
                AuditError::Http(e.to_string())
            }
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchResponse, AuditError> {
        if self.ssrf_protection {
            validate_url(request.url).await?;
        }

        let response = match request.mode {
            FetchMode::Document => self.send(Method::GET, &request).await?,
            FetchMode::StatusOnly => {
                let head = self.send(Method::HEAD, &request).await?;
                // Servers that don't implement HEAD get one GET retry.
                match head.status().as_u16() {
                    405 | 501 => self.send(Method::GET, &request).await?,
                    _ => head,
                }
            }
        };

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let is_html = content_type
            .as_deref()
            .map(|ct| ct.contains("text/html") || ct.contains("application/xhtml"))
            .unwrap_or(false);
        let body = if matches!(request.mode, FetchMode::Document) && is_html && status_code < 400 {
            Some(
                response
                    .text()
                    .await
                    .map_err(|e| AuditError::Http(format!("Failed to read response body: {e}")))?,
            )
        } else {
            None
        };

        Ok(FetchResponse {
            status_code,
            content_type,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Reject non-http(s) schemes and hosts that resolve to private/reserved
/// addresses, so a hostile page cannot point the auditor at internal
/// services or cloud metadata endpoints.
async fn validate_url(url: &str) -> Result<(), AuditError> {
    let parsed = Url::parse(url).map_err(|e| AuditError::Http(format!("Invalid URL: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(AuditError::Http(format!(
                "URL scheme '{scheme}' is not allowed (only http/https)"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| AuditError::Http("URL has no host".to_string()))?;

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(ip) {
            return Err(AuditError::Http(format!(
                "SSRF blocked: {host} is a private/reserved IP"
            )));
        }
        return Ok(());
    }

    let port = parsed.port_or_known_default().unwrap_or(80);
    let addrs: Vec<_> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| AuditError::Network(format!("DNS resolution failed for {host}: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(AuditError::Network(format!(
            "DNS resolution returned no addresses for {host}"
        )));
    }
    for addr in &addrs {
        if is_private_ip(addr.ip()) {
            return Err(AuditError::Http(format!(
                "SSRF blocked: {host} resolves to private/reserved IP {}",
                addr.ip()
            )));
        }
    }

    Ok(())
}

/// Private/reserved/link-local ranges, including IPv4-mapped IPv6.
fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local() // 169.254.0.0/16, cloud metadata lives here
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || (octets[0] == 100 && (octets[1] & 0xC0) == 64) // CGN 100.64.0.0/10
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xFFC0) == 0xFE80 // link-local fe80::/10
                || (v6.segments()[0] & 0xFE00) == 0xFC00 // unique local fc00::/7
                || v6
                    .to_ipv4_mapped()
                    .is_some_and(|v4| is_private_ip(IpAddr::V4(v4)))
        }
    }
}
