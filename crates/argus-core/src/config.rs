use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// Upper bound on simultaneous in-flight requests per scan.
pub const MAX_CONCURRENCY: usize = 50;

/// Basic-Auth credentials attached to requests per the domain-scoping policy.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Immutable per-job scan configuration.
///
/// `depth = 0` scans the seed page only; each increment allows one more BFS
/// hop from the seed. There is no "unlimited" sentinel — use a large value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanConfig {
    /// Maximum BFS hops from the seed URL (0 = seed page only).
    pub depth: u32,
    /// Maximum simultaneous in-flight requests (1..=50).
    pub concurrency: usize,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// When true, each unique URL is checked at most once per scan.
    pub scan_same_link_once: bool,
    /// Literal URL exclusions (compared fragment-stripped).
    pub excluded_urls: Vec<String>,
    /// Regex exclusion patterns applied to the absolute URL.
    pub regex_exclusions: Vec<String>,
    /// Glob-style (`*`/`?`) exclusion patterns applied to the absolute URL.
    pub wildcard_exclusions: Vec<String>,
    /// CSS selectors marking excluded subtrees in fetched documents.
    pub css_selectors: Vec<String>,
    /// When true, a URL seen inside an excluded subtree is blacklisted for
    /// the rest of the scan; when false, only that occurrence is ignored.
    pub css_selectors_force_exclude: bool,
    /// Classify links on other hosts as `external` and skip their outlinks.
    pub skip_external_domains: bool,
    /// Treat subdomains of the seed host as external.
    pub exclude_subdomains: bool,
    /// Optional Basic-Auth credentials.
    pub auth: Option<AuthConfig>,
    /// Attach credentials to every host instead of only the seed host.
    pub use_auth_for_all_domains: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            depth: 3,
            concurrency: 10,
            request_timeout_ms: 10_000,
            scan_same_link_once: true,
            excluded_urls: Vec::new(),
            regex_exclusions: Vec::new(),
            wildcard_exclusions: Vec::new(),
            css_selectors: Vec::new(),
            css_selectors_force_exclude: false,
            skip_external_domains: true,
            exclude_subdomains: false,
            auth: None,
            use_auth_for_all_domains: false,
        }
    }
}

impl ScanConfig {
    /// Validate bounds that make a job unrunnable.
    ///
    /// Exclusion patterns are deliberately NOT validated here — a malformed
    /// pattern degrades to non-matching with a warning instead of failing
    /// the job (see [`crate::exclusion::ExclusionRules::compile`]).
    pub fn validate(&self) -> Result<(), AuditError> {
        if self.concurrency == 0 {
            return Err(AuditError::Config("concurrency must be at least 1".into()));
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(AuditError::Config(format!(
                "concurrency {} exceeds the maximum of {MAX_CONCURRENCY}",
                self.concurrency
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(AuditError::Config(
                "requestTimeoutMs must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Per-request timeout as a `Duration`.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout in whole seconds for display ("Request timed out after Ns").
    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_ms.div_ceil(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ScanConfig::default().validate().is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut config = ScanConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.concurrency = 51;
        assert!(config.validate().is_err());

        config.concurrency = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ScanConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_secs_rounds_up() {
        let config = ScanConfig {
            request_timeout_ms: 2500,
            ..Default::default()
        };
        assert_eq!(config.request_timeout_secs(), 3);
    }

    #[test]
    fn test_camel_case_roundtrip() {
        let json = r#"{
            "depth": 1,
            "concurrency": 4,
            "requestTimeoutMs": 5000,
            "scanSameLinkOnce": true,
            "skipExternalDomains": false,
            "auth": {"username": "u", "password": "p"},
            "useAuthForAllDomains": true
        }"#;
        let config: ScanConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.depth, 1);
        assert_eq!(config.concurrency, 4);
        assert!(!config.skip_external_domains);
        assert!(config.use_auth_for_all_domains);
        assert_eq!(config.auth.as_ref().unwrap().username, "u");
        // Unlisted fields fall back to defaults
        assert!(config.wildcard_exclusions.is_empty());
    }

    #[test]
    fn test_auth_debug_redacts_password() {
        let auth = AuthConfig {
            username: "admin".into(),
            password: "hunter2".into(),
        };
        let rendered = format!("{auth:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
