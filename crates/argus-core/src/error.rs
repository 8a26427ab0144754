use thiserror::Error;

/// Application-wide error types for Argus.
#[derive(Error, Debug)]
pub enum AuditError {
    /// HTTP-level failure while issuing a request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request exceeded the configured timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error (refused, reset, DNS).
    #[error("Network error: {0}")]
    Network(String),

    /// A URL could not be parsed.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Scan configuration rejected at job start.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Job Store or History Store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AuditError {
    /// Returns true for errors that abort the whole job rather than a
    /// single link check (unparsable seed URL, rejected configuration).
    pub fn is_fatal(&self) -> bool {
        matches!(self, AuditError::InvalidUrl { .. } | AuditError::Config(_))
    }

    /// Returns true for transient network conditions that are recorded as
    /// `status = error` on the affected link while the scan continues.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::Timeout(_) | AuditError::Network(_))
    }
}
