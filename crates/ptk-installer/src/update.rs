//! Staleness checks against the latest published releases.
//!
//! - Toolkit driver: the local driver digest is compared in constant time
//!   with the digest GitHub publishes for the release asset. No asset, or an
//!   asset without a digest, means "unknown" rather than stale.
//! - Installer: the tag, minus a leading `v`, must equal our version exactly.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::InstallerConfig;
use crate::digest;
use crate::error::InstallerError;
use crate::release::{ReleaseHost, ReleaseInfo};

/// Display name of the driver artifact.
pub const TOOLKIT_NAME: &str = "PSVR2 Toolkit";
/// Display name of the installer artifact.
pub const INSTALLER_NAME: &str = "PSVR2 Toolkit Installer";

/// Update status of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactUpdate {
    pub name: String,
    /// Latest release tag
    pub tag: String,
    /// `None` when staleness cannot be determined
    pub has_update: Option<bool>,
    pub html_url: String,
    pub changelog: Option<String>,
}

impl ArtifactUpdate {
    fn from_release(name: &str, release: &ReleaseInfo, has_update: Option<bool>) -> Self {
        Self {
            name: name.to_string(),
            tag: release.tag.clone(),
            has_update,
            html_url: release.html_url.clone(),
            changelog: release.changelog.clone(),
        }
    }
}

/// Result of an update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub toolkit: ArtifactUpdate,
    pub installer: ArtifactUpdate,
}

/// Whether the local driver differs from the published asset.
///
/// `None` if the asset is missing, carries no digest, or there is no local
/// driver to compare.
pub fn driver_has_update(
    release: &ReleaseInfo,
    asset_name: &str,
    local_digest: Option<&str>,
) -> Option<bool> {
    let published = release.asset(asset_name)?.digest.as_deref()?;
    let local = local_digest?;
    Some(!digest::digests_match(local, published))
}

/// Whether the installer's own release is newer than `current_version`.
pub fn installer_has_update(release: &ReleaseInfo, current_version: &str) -> bool {
    release.version() != current_version
}

/// Queries the release host for both artifacts.
pub struct UpdateChecker {
    host: Arc<dyn ReleaseHost>,
    toolkit_repo: String,
    installer_repo: String,
    asset_name: String,
    installer_version: String,
}

impl UpdateChecker {
    pub fn new(host: Arc<dyn ReleaseHost>, config: &InstallerConfig) -> Self {
        Self {
            host,
            toolkit_repo: config.releases.toolkit_repo.clone(),
            installer_repo: config.releases.installer_repo.clone(),
            asset_name: config.driver.asset_name.clone(),
            installer_version: config.installer_version().to_string(),
        }
    }

    /// Latest release of `repo`.
    pub async fn check(&self, repo: &str) -> Result<ReleaseInfo, InstallerError> {
        self.host.latest_release(repo).await
    }

    pub async fn latest_toolkit(&self) -> Result<ReleaseInfo, InstallerError> {
        self.check(&self.toolkit_repo).await
    }

    pub async fn latest_installer(&self) -> Result<ReleaseInfo, InstallerError> {
        self.check(&self.installer_repo).await
    }

    /// Whether `release` publishes a digest for the driver asset.
    pub fn publishes_driver_digest(&self, release: &ReleaseInfo) -> bool {
        release
            .asset(&self.asset_name)
            .is_some_and(|asset| asset.digest.is_some())
    }

    /// Combine both releases into a report.
    pub fn report(
        &self,
        toolkit: &ReleaseInfo,
        local_digest: Option<&str>,
        installer: &ReleaseInfo,
    ) -> UpdateReport {
        let toolkit_update = driver_has_update(toolkit, &self.asset_name, local_digest);
        let installer_update = installer_has_update(installer, &self.installer_version);

        debug!(
            toolkit_tag = %toolkit.tag,
            ?toolkit_update,
            installer_tag = %installer.tag,
            installer_update,
            "Compared releases"
        );
        if toolkit_update == Some(true) || installer_update {
            info!("Updates are available");
        }

        UpdateReport {
            toolkit: ArtifactUpdate::from_release(TOOLKIT_NAME, toolkit, toolkit_update),
            installer: ArtifactUpdate::from_release(INSTALLER_NAME, installer, Some(installer_update)),
        }
    }
}
