//! Driver pair state machine.
//!
//! The SteamVR plug-in directory holds the active driver and, once the
//! Toolkit has been installed, a backup of the vendor driver:
//!
//! ```text
//! SteamVR_Plug-In/bin/win64/
//! ├── driver_playstation_vr2.dll        (current: vendor or replacement)
//! └── driver_playstation_vr2_orig.dll   (original: vendor backup)
//! ```
//!
//! The status is derived from disk on every call and never stored. A signed
//! current file is the vendor driver; an unsigned one is the replacement and
//! is only acceptable while a signed backup exists.
//!
//! Every mutation is a rename, an unlink, or a temp-then-rename write.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::atomic::write_atomic;
use crate::digest;
use crate::error::InstallerError;
use crate::operation::Progress;
use crate::signature::SignatureVerifier;

/// Installation state of the driver pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriverStatus {
    /// The replacement is active and the vendor driver is backed up
    Installed,
    /// The vendor driver is active
    Uninstalled,
    /// Neither file holds a trusted vendor driver
    Invalid,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverStatus::Installed => write!(f, "Installed"),
            DriverStatus::Uninstalled => write!(f, "Uninstalled"),
            DriverStatus::Invalid => write!(f, "Invalid Driver Files"),
        }
    }
}

/// Status plus file presence, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverSnapshot {
    pub status: DriverStatus,
    pub current_exists: bool,
    pub original_exists: bool,
}

/// What uninstall will do with the backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallAction {
    /// Rename the backup over the current file
    Restore,
    /// The vendor driver was updated after the backup was taken; drop the backup
    DiscardStaleBackup,
    /// The vendor driver is active and the backup is not a vendor driver
    DiscardUntrustedBackup,
}

/// The active driver and its vendor backup.
pub struct DriverPair {
    current_path: PathBuf,
    original_path: PathBuf,
    verifier: Arc<dyn SignatureVerifier>,
}

impl DriverPair {
    pub fn new(
        current_path: impl Into<PathBuf>,
        original_path: impl Into<PathBuf>,
        verifier: Arc<dyn SignatureVerifier>,
    ) -> Self {
        Self {
            current_path: current_path.into(),
            original_path: original_path.into(),
            verifier,
        }
    }

    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    fn is_trusted(&self, path: &Path) -> Result<bool, InstallerError> {
        let verdict = self.verifier.verify(path)?;
        debug!(path = %path.display(), status = %verdict.status, "Checked driver signature");
        if let Err(e) = verdict.explain() {
            warn!(error = %e, "Driver is signed but the signature does not validate");
        }
        Ok(verdict.trusted())
    }

    /// Derive the status from the files on disk.
    ///
    /// # Errors
    ///
    /// Propagates `Io`/`SignatureParse` from the verifier. Signed-but-invalid
    /// files are not errors; they count as untrusted.
    pub fn validate(&self) -> Result<DriverStatus, InstallerError> {
        if !self.current_path.exists() {
            return Ok(DriverStatus::Invalid);
        }

        let status = if self.is_trusted(&self.current_path)? {
            DriverStatus::Uninstalled
        } else if self.original_path.exists() && self.is_trusted(&self.original_path)? {
            DriverStatus::Installed
        } else {
            DriverStatus::Invalid
        };

        debug!(current = %self.current_path.display(), %status, "Validated driver files");
        Ok(status)
    }

    pub fn snapshot(&self) -> Result<DriverSnapshot, InstallerError> {
        Ok(DriverSnapshot {
            status: self.validate()?,
            current_exists: self.current_path.exists(),
            original_exists: self.original_path.exists(),
        })
    }

    /// Succeeds only when the vendor driver is active.
    pub fn ensure_installable(&self) -> Result<(), InstallerError> {
        match self.validate()? {
            DriverStatus::Uninstalled => Ok(()),
            DriverStatus::Installed => Err(InstallerError::AlreadyInstalled),
            DriverStatus::Invalid => Err(invalid_files()),
        }
    }

    /// Succeeds only when the replacement is active.
    pub fn ensure_reinstallable(&self) -> Result<(), InstallerError> {
        match self.validate()? {
            DriverStatus::Installed => Ok(()),
            DriverStatus::Uninstalled => Err(InstallerError::NotInstalled),
            DriverStatus::Invalid => Err(invalid_files()),
        }
    }

    /// Back up the vendor driver and put `replacement` in its place.
    ///
    /// The backup is a single rename of current over original. If writing
    /// the replacement fails, the backup is renamed back.
    pub fn install(&self, replacement: &[u8], progress: &Progress) -> Result<DriverStatus, InstallerError> {
        self.install_with(replacement, progress, write_atomic)
    }

    fn install_with<W>(
        &self,
        replacement: &[u8],
        progress: &Progress,
        write: W,
    ) -> Result<DriverStatus, InstallerError>
    where
        W: FnOnce(&Path, &[u8]) -> Result<(), InstallerError>,
    {
        self.ensure_installable()?;

        progress.info("Backing up the installed driver...");
        std::fs::rename(&self.current_path, &self.original_path)?;
        info!(
            from = %self.current_path.display(),
            to = %self.original_path.display(),
            "Backed up vendor driver"
        );

        progress.info("Installing the downloaded driver...");
        if let Err(e) = write(&self.current_path, replacement) {
            warn!(error = %e, "Writing replacement failed, restoring vendor driver");
            if let Err(restore_err) = std::fs::rename(&self.original_path, &self.current_path) {
                tracing::error!(error = %restore_err, "Failed to restore vendor driver");
            }
            return Err(e);
        }
        info!(path = %self.current_path.display(), bytes = replacement.len(), "Installed replacement driver");

        self.validate()
    }

    /// Overwrite the active replacement with a newer one, keeping the backup.
    pub fn reinstall(&self, replacement: &[u8], progress: &Progress) -> Result<DriverStatus, InstallerError> {
        self.ensure_reinstallable()?;

        progress.info("Installing the downloaded driver...");
        write_atomic(&self.current_path, replacement)?;
        info!(path = %self.current_path.display(), bytes = replacement.len(), "Replaced driver");

        self.validate()
    }

    /// Decide how to uninstall without touching anything.
    pub fn plan_uninstall(&self) -> Result<UninstallAction, InstallerError> {
        let status = self.validate()?;
        if status == DriverStatus::Invalid {
            return Err(invalid_files());
        }
        if !self.original_path.exists() {
            return Err(InstallerError::NotInstalled);
        }

        // Installed implies a trusted backup and an untrusted current file.
        if status == DriverStatus::Installed {
            return Ok(UninstallAction::Restore);
        }

        // Vendor driver active alongside a leftover backup.
        let current_mtime = std::fs::metadata(&self.current_path)?.modified()?;
        let original_mtime = std::fs::metadata(&self.original_path)?.modified()?;
        if current_mtime > original_mtime {
            Ok(UninstallAction::DiscardStaleBackup)
        } else if self.is_trusted(&self.original_path)? {
            Ok(UninstallAction::Restore)
        } else {
            Ok(UninstallAction::DiscardUntrustedBackup)
        }
    }

    /// Return to the vendor driver.
    pub fn uninstall(&self, progress: &Progress) -> Result<DriverStatus, InstallerError> {
        match self.plan_uninstall()? {
            UninstallAction::Restore => {
                progress.info("Restoring the original driver...");
                std::fs::rename(&self.original_path, &self.current_path)?;
                info!(path = %self.current_path.display(), "Restored vendor driver");
            }
            UninstallAction::DiscardStaleBackup => {
                progress.warning(
                    "The installed driver is newer than the original driver. Only deleting the original driver...",
                );
                std::fs::remove_file(&self.original_path)?;
                info!(path = %self.original_path.display(), "Deleted stale backup");
            }
            UninstallAction::DiscardUntrustedBackup => {
                progress.warning("The original driver backup is not signed. Only deleting the original driver...");
                std::fs::remove_file(&self.original_path)?;
                info!(path = %self.original_path.display(), "Deleted untrusted backup");
            }
        }

        self.validate()
    }

    /// `sha256:<hex>` of the active driver.
    pub fn digest(&self) -> Result<String, InstallerError> {
        digest::file_digest(&self.current_path)
    }
}

impl fmt::Debug for DriverPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverPair")
            .field("current_path", &self.current_path)
            .field("original_path", &self.original_path)
            .field("verifier", &self.verifier.description())
            .finish()
    }
}

fn invalid_files() -> InstallerError {
    InstallerError::InvalidState(
        "the PlayStation VR2 App has invalid driver files. Please verify its integrity through Steam."
            .into(),
    )
}
