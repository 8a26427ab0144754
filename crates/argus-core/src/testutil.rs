//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests. All mocks use
//! `Arc<Mutex<_>>` for interior mutability, allowing test assertions on
//! recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::checker::{FetchMode, FetchRequest, FetchResponse, Fetcher};
use crate::error::AuditError;

#[derive(Clone)]
enum CannedResponse {
    Status(u16),
    Html(u16, String),
    Timeout(u64),
    Network(String),
}

/// Recorded request: URL and whether credentials were attached.
type RequestLogEntry = (String, bool);

/// Mock fetcher serving a canned response per URL.
///
/// Unknown URLs answer 404, so a fixture site only needs the pages it cares
/// about. Every request is recorded for assertions.
#[derive(Clone, Default)]
pub struct MockFetcher {
    responses: Arc<Mutex<HashMap<String, CannedResponse>>>,
    requests: Arc<Mutex<Vec<RequestLogEntry>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `html` with status 200 and a `text/html` content type.
    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), CannedResponse::Html(200, html.to_string()));
        self
    }

    /// Serve a bare status code with no body.
    pub fn with_status(self, url: &str, status_code: u16) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), CannedResponse::Status(status_code));
        self
    }

    /// Fail the request with a timeout of `secs` seconds.
    pub fn with_timeout(self, url: &str, secs: u64) -> Self {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), CannedResponse::Timeout(secs));
        self
    }

    /// Fail the request with a network error.
    pub fn with_network_error(self, url: &str, message: &str) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            CannedResponse::Network(message.to_string()),
        );
        self
    }

    pub fn requested(&self, url: &str) -> bool {
        self.request_count(url) > 0
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(requested, _)| requested == url)
            .count()
    }

    /// Whether any request for `url` carried Basic-Auth credentials.
    pub fn requested_with_auth(&self, url: &str) -> bool {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .any(|(requested, authed)| requested == url && *authed)
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<FetchResponse, AuditError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.url.to_string(), request.auth.is_some()));

        let canned = self.responses.lock().unwrap().get(request.url).cloned();
        match canned {
            Some(CannedResponse::Status(status_code)) => Ok(FetchResponse {
                status_code,
                content_type: Some("text/plain".into()),
                body: None,
            }),
            Some(CannedResponse::Html(status_code, html)) => Ok(FetchResponse {
                status_code,
                content_type: Some("text/html; charset=utf-8".into()),
                body: matches!(request.mode, FetchMode::Document).then_some(html),
            }),
            Some(CannedResponse::Timeout(secs)) => Err(AuditError::Timeout(secs)),
            Some(CannedResponse::Network(message)) => Err(AuditError::Network(message)),
            None => Ok(FetchResponse {
                status_code: 404,
                content_type: None,
                body: None,
            }),
        }
    }
}

/// Mock worker reporter that records event labels in order.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::worker::WorkerReporter for MockReporter {
    fn report(&self, event: crate::worker::WorkerEvent<'_>) {
        let label = match &event {
            crate::worker::WorkerEvent::Started { .. } => "Started",
            crate::worker::WorkerEvent::Polling => "Polling",
            crate::worker::WorkerEvent::JobClaimed { .. } => "JobClaimed",
            crate::worker::WorkerEvent::JobFinished { .. } => "JobFinished",
            crate::worker::WorkerEvent::JobFailed { .. } => "JobFailed",
            crate::worker::WorkerEvent::Stopped { .. } => "Stopped",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}
