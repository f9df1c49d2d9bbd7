//! Release metadata from the repository host.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{NetworkConfig, ReleasesConfig};
use crate::download::Downloader;
use crate::error::InstallerError;

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    /// Published content digest, e.g. `sha256:<hex>`
    #[serde(default)]
    pub digest: Option<String>,
    #[serde(alias = "browser_download_url")]
    pub download_url: String,
}

/// Latest published release of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    #[serde(alias = "tag_name")]
    pub tag: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    /// Release notes body
    #[serde(default, alias = "body")]
    pub changelog: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

impl ReleaseInfo {
    /// Asset by exact name.
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Tag with a leading `v`/`V` removed.
    pub fn version(&self) -> &str {
        self.tag
            .strip_prefix('v')
            .or_else(|| self.tag.strip_prefix('V'))
            .unwrap_or(&self.tag)
    }
}

/// Source of release metadata and bytes.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Latest release of `repo` (`owner/name`).
    ///
    /// # Errors
    ///
    /// - `NotFound` if the repository has no published release
    /// - `Network`/`DownloadFailed` for transport failures and other statuses
    async fn latest_release(&self, repo: &str) -> Result<ReleaseInfo, InstallerError>;

    /// Whole body of `url`.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, InstallerError>;
}

/// GitHub REST v3 release host.
#[derive(Debug, Clone)]
pub struct GitHubReleases {
    downloader: Downloader,
    api_base_url: String,
}

impl GitHubReleases {
    pub fn new(network: &NetworkConfig, releases: &ReleasesConfig) -> Result<Self, InstallerError> {
        Ok(Self {
            downloader: Downloader::new(network)?,
            api_base_url: releases.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Point the host at another API root (useful for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn downloader_mut(&mut self) -> &mut Downloader {
        &mut self.downloader
    }
}

#[async_trait]
impl ReleaseHost for GitHubReleases {
    async fn latest_release(&self, repo: &str) -> Result<ReleaseInfo, InstallerError> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base_url, repo);
        debug!(url = %url, "Requesting latest release");

        let response = self
            .downloader
            .client()
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .await?;

        let status = response.status().as_u16();
        match status {
            200..=299 => {}
            404 => {
                return Err(InstallerError::not_found(format!("a published release of {}", repo)));
            }
            _ => {
                warn!(repo, status, "Release host returned an error");
                return Err(InstallerError::DownloadFailed { status });
            }
        }

        let body = response.bytes().await?;
        let release: ReleaseInfo = serde_json::from_slice(&body)?;
        debug!(repo, tag = %release.tag, assets = release.assets.len(), "Fetched latest release");
        Ok(release)
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, InstallerError> {
        self.downloader.fetch(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RELEASE_JSON: &str = r#"{
        "tag_name": "v1.2.0",
        "name": "PSVR2 Toolkit 1.2.0",
        "body": "- eyelid estimation fixes",
        "html_url": "https://github.com/BnuuySolutions/PSVR2Toolkit/releases/tag/v1.2.0",
        "published_at": "2025-08-01T12:00:00Z",
        "assets": [
            {
                "name": "driver_playstation_vr2.dll",
                "digest": "sha256:ABCDEF",
                "browser_download_url": "https://example.invalid/driver_playstation_vr2.dll",
                "size": 4096
            },
            {
                "name": "README.txt",
                "digest": null,
                "browser_download_url": "https://example.invalid/README.txt"
            }
        ]
    }"#;

    async fn host_for(server: &MockServer) -> GitHubReleases {
        GitHubReleases::new(&NetworkConfig::default(), &ReleasesConfig::default())
            .unwrap()
            .with_base_url(server.uri())
    }

    #[tokio::test]
    async fn test_latest_release_parses_github_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/BnuuySolutions/PSVR2Toolkit/releases/latest"))
            .and(header("accept", "application/vnd.github+json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RELEASE_JSON))
            .mount(&server)
            .await;

        let release = host_for(&server)
            .await
            .latest_release("BnuuySolutions/PSVR2Toolkit")
            .await
            .unwrap();

        assert_eq!(release.tag, "v1.2.0");
        assert_eq!(release.version(), "1.2.0");
        assert_eq!(release.changelog.as_deref(), Some("- eyelid estimation fixes"));
        assert_eq!(release.assets.len(), 2);
        assert!(release.published_at.is_some());

        let driver = release.asset("driver_playstation_vr2.dll").unwrap();
        assert_eq!(driver.digest.as_deref(), Some("sha256:ABCDEF"));
        assert_eq!(driver.download_url, "https://example.invalid/driver_playstation_vr2.dll");
        assert!(release.asset("README.txt").unwrap().digest.is_none());
    }

    #[tokio::test]
    async fn test_no_release_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"Not Found"}"#))
            .mount(&server)
            .await;

        let err = host_for(&server).await.latest_release("a/b").await.unwrap_err();
        assert!(matches!(err, InstallerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_server_error_is_network_kind() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = host_for(&server).await.latest_release("a/b").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Network);
    }

    #[test]
    fn test_version_strip() {
        let mut release: ReleaseInfo = serde_json::from_str(RELEASE_JSON).unwrap();
        release.tag = "V0.2.0".into();
        assert_eq!(release.version(), "0.2.0");
        release.tag = "0.2.0".into();
        assert_eq!(release.version(), "0.2.0");
        release.tag = "vv1".into();
        assert_eq!(release.version(), "v1");
    }
}
