//! HTTP fetcher for remote CSV sources.
//!
//! Fetches AERONET `.lev15` files, NOAA ISD CSVs, and flat CSVs over HTTP(S).
//! `file://` URLs and bare filesystem paths are read from disk, which keeps
//! local mirrors and fixtures on the same code path.
//!
//! One attempt per call: status codes map to structured errors and the caller
//! decides whether to surface them or continue without that source.

use super::fetch::{FetchError, SourceFetcher};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP(S) + local file fetcher.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("aodlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn fetch_remote(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::NetworkUnreachable {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Body {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        debug!(url, bytes = body.len(), "fetched remote source");
        Ok(body)
    }
}

impl SourceFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match local_path(url) {
            Some(path) => read_local(url, path),
            None => self.fetch_remote(url),
        }
    }
}

/// Filesystem path for `file://` URLs and scheme-less strings.
fn local_path(url: &str) -> Option<&Path> {
    if let Some(rest) = url.strip_prefix("file://") {
        return Some(Path::new(rest));
    }
    (!url.contains("://")).then(|| Path::new(url))
}

fn read_local(url: &str, path: &Path) -> Result<String, FetchError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FetchError::NotFound {
            url: url.to_string(),
        },
        _ => FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_detection() {
        assert_eq!(local_path("file:///tmp/a.csv"), Some(Path::new("/tmp/a.csv")));
        assert_eq!(local_path("data/a.lev15"), Some(Path::new("data/a.lev15")));
        assert_eq!(local_path("https://example.org/a.csv"), None);
    }

    #[test]
    fn reads_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.csv");
        std::fs::write(&path, "Date,AOD\n").unwrap();

        let fetcher = HttpFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let body = fetcher.fetch(path.to_str().unwrap()).unwrap();
        assert_eq!(body, "Date,AOD\n");

        let url = format!("file://{}", path.display());
        assert_eq!(fetcher.fetch(&url).unwrap(), "Date,AOD\n");
    }

    #[test]
    fn missing_local_file_is_not_found() {
        let fetcher = HttpFetcher::new(DEFAULT_TIMEOUT).unwrap();
        let err = fetcher.fetch("/definitely/not/here.lev15").unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }
}
