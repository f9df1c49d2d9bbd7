//! HTTP byte fetching with progress reporting.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::error::InstallerError;

/// Progress callback type for download progress reporting.
pub type ProgressCallback = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// Fetches whole response bodies into memory.
///
/// Driver binaries are a few megabytes, so they are held in memory until the
/// caller writes them out atomically.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    progress_callback: Option<ProgressCallback>,
}

impl Downloader {
    /// Create a downloader honoring the network timeout and user agent.
    pub fn new(config: &NetworkConfig) -> Result<Self, InstallerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .read_timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| InstallerError::Network(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            progress_callback: None,
        })
    }

    /// Set the progress callback.
    pub fn set_progress_callback<F>(&mut self, callback: F)
    where
        F: Fn(DownloadProgress) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
    }

    /// Shared HTTP client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch a URL, following redirects, into memory.
    ///
    /// # Errors
    ///
    /// - `DownloadFailed` for a non-success status
    /// - `Network` for transport failures, including mid-stream
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, InstallerError> {
        debug!(url, "Fetching");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::DownloadFailed {
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut body = Vec::with_capacity(initial_capacity(total));
        let mut stream = response.bytes_stream();

        self.report_progress(0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| InstallerError::Network(e.to_string()))?;
            body.extend_from_slice(&chunk);
            self.report_progress(body.len() as u64, total);
        }

        info!(url, bytes = body.len(), "Download complete");
        Ok(body)
    }

    fn report_progress(&self, downloaded: u64, total: Option<u64>) {
        if let Some(callback) = &self.progress_callback {
            callback(DownloadProgress { downloaded, total });
        }
    }
}

/// Largest buffer reserved up front from an announced `Content-Length`.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

fn initial_capacity(total: Option<u64>) -> usize {
    total.unwrap_or(0).min(MAX_PREALLOCATION) as usize
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("progress_callback", &self.progress_callback.is_some())
            .finish_non_exhaustive()
    }
}

/// Download progress information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes downloaded so far.
    pub downloaded: u64,
    /// Total bytes, when the server announced a length.
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Get download progress as a percentage (0.0 to 100.0), if the total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.downloaded as f64 / total as f64) * 100.0),
        }
    }
}

impl std::fmt::Display for DownloadProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.total, self.percentage()) {
            (Some(total), Some(pct)) => {
                write!(f, "{}/{} bytes ({:.1}%)", self.downloaded, total, pct)
            }
            _ => write!(f, "{} bytes", self.downloaded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> Downloader {
        Downloader::new(&NetworkConfig::default()).unwrap()
    }

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(100)), 100);
        assert_eq!(initial_capacity(Some(u64::MAX)), MAX_PREALLOCATION as usize);
    }

    #[tokio::test]
    async fn test_fetch_body_and_progress() {
        let server = MockServer::start().await;
        let body = vec![7u8; 20_000];
        Mock::given(method("GET"))
            .and(path("/driver.dll"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut downloader = downloader();
        let sink = seen.clone();
        downloader.set_progress_callback(move |p| sink.lock().unwrap().push(p));

        let fetched = downloader
            .fetch(&format!("{}/driver.dll", server.uri()))
            .await
            .unwrap();

        assert_eq!(fetched, body);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().unwrap().downloaded, 0);
        assert_eq!(seen.last().unwrap().downloaded, 20_000);
        assert_eq!(seen.last().unwrap().total, Some(20_000));
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        match downloader().fetch(&server.uri()).await.unwrap_err() {
            InstallerError::DownloadFailed { status } => assert_eq!(status, 503),
            e => panic!("Expected DownloadFailed, got {:?}", e),
        }
    }

    #[test]
    fn test_progress_display() {
        let known = DownloadProgress {
            downloaded: 50,
            total: Some(200),
        };
        assert_eq!(known.percentage(), Some(25.0));
        assert_eq!(known.to_string(), "50/200 bytes (25.0%)");

        let unknown = DownloadProgress {
            downloaded: 50,
            total: None,
        };
        assert_eq!(unknown.percentage(), None);
        assert_eq!(unknown.to_string(), "50 bytes");
    }
}
