//! Fetcher trait and structured fetch errors.
//!
//! The SourceFetcher trait abstracts over where raw CSV text comes from (HTTP,
//! local files, in-memory fixtures) so the pipeline can be driven offline and
//! mocked in tests. A fetch is a single blocking attempt; there is no retry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

/// Structured error types for fetch operations.
///
/// These are designed to be displayable in CLI output and per-site failure lists.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable for {url}: {reason}")]
    NetworkUnreachable { url: String, reason: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("could not read body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("source not found: {url}")]
    NotFound { url: String },

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl FetchError {
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::NetworkUnreachable { url, .. }
            | FetchError::Timeout { url }
            | FetchError::HttpStatus { url, .. }
            | FetchError::Body { url, .. }
            | FetchError::NotFound { url } => Some(url),
            FetchError::Client(_) => None,
        }
    }
}

/// Trait for raw-content sources.
///
/// Implementations return the full body as text. Parsing happens elsewhere;
/// fetchers don't know about layouts.
pub trait SourceFetcher: Send + Sync {
    /// Human-readable name of this fetcher.
    fn name(&self) -> &str;

    /// Fetch the body at `url`. One attempt, blocking.
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// In-memory fetcher: URL → body. Used for tests and canned demo data.
#[derive(Debug, Default, Clone)]
pub struct StaticFetcher {
    bodies: HashMap<String, String>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.insert(url, body);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.bodies.insert(url.into(), body.into());
    }
}

impl SourceFetcher for StaticFetcher {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound {
                url: url.to_string(),
            })
    }
}

/// Memoizes successful fetches by URL for the lifetime of the fetcher.
///
/// Remote files are immutable once published, so identical URLs within a
/// session are served from memory. Failures are not cached.
pub struct CachingFetcher<F> {
    inner: F,
    bodies: Mutex<HashMap<String, Arc<str>>>,
}

impl<F: SourceFetcher> CachingFetcher<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            bodies: Mutex::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Number of distinct URLs currently held.
    pub fn cached_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<str>>> {
        // poisoning is harmless: inserts are single operations
        self.bodies.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<F: SourceFetcher> SourceFetcher for CachingFetcher<F> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        if let Some(body) = self.lock().get(url) {
            debug!(url, "fetch served from memory");
            return Ok(body.to_string());
        }

        // lock released during the fetch; a concurrent duplicate just overwrites
        let body: Arc<str> = Arc::from(self.inner.fetch(url)?);
        self.lock().insert(url.to_string(), Arc::clone(&body));
        Ok(body.to_string())
    }
}
