//! Error types for the installer engine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during installer operations.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// A prerequisite (app, file, release) is missing
    #[error("not found: {0}")]
    NotFound(String),

    /// Steam's library manifest could not be read or parsed
    #[error("could not parse the Steam library manifest: {0}")]
    LibraryManifest(String),

    /// Driver files fail validation; no destructive action was taken
    #[error("invalid driver files: {0}")]
    InvalidState(String),

    /// Network error while fetching metadata or bytes
    #[error("network error: {0}")]
    Network(String),

    /// Remote host answered with a non-success status
    #[error("download failed with status {status}")]
    DownloadFailed { status: u16 },

    /// Replacement driver is already active
    #[error("the Toolkit driver is already installed")]
    AlreadyInstalled,

    /// No backup of the vendor driver exists
    #[error("the Toolkit driver is not installed")]
    NotInstalled,

    /// Another operation is already in flight
    #[error("another operation is already running")]
    Busy,

    /// The file's signing structure could not be parsed
    #[error("could not parse the signature of {path}: {reason}")]
    SignatureParse { path: PathBuf, reason: String },

    /// The file is signed but the signature does not validate
    #[error("signature of {path} is invalid: {reason}")]
    SignatureInvalid { path: PathBuf, reason: String },

    /// The settings document is not a JSON object
    #[error("settings file {path} is malformed: {reason}")]
    SettingsFormat { path: PathBuf, reason: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation is not available on this platform
    #[error("unsupported on this platform: {0}")]
    Unsupported(&'static str),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for InstallerError {
    fn from(err: reqwest::Error) -> Self {
        InstallerError::Network(err.to_string())
    }
}

/// Coarse classification of an [`InstallerError`] for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The user must fix something outside the tool (install the app, publish a release)
    NotFound,
    /// Driver files are untrustworthy; nothing was touched
    InvalidState,
    /// Retryable by invoking the operation again
    Network,
    /// Idempotency guard; reported as a warning
    AlreadyInstalled,
    /// Idempotency guard; reported as a warning
    NotInstalled,
    /// Concurrent invocation rejected
    Busy,
    /// Anything else
    Other,
}

impl InstallerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::LibraryManifest(_) => ErrorKind::NotFound,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Network(_) | Self::DownloadFailed { .. } => ErrorKind::Network,
            Self::AlreadyInstalled => ErrorKind::AlreadyInstalled,
            Self::NotInstalled => ErrorKind::NotInstalled,
            Self::Busy => ErrorKind::Busy,
            _ => ErrorKind::Other,
        }
    }

    /// Idempotency guards are shown as warnings rather than failures.
    pub fn is_warning(&self) -> bool {
        matches!(self.kind(), ErrorKind::AlreadyInstalled | ErrorKind::NotInstalled)
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(InstallerError::LibraryManifest("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(InstallerError::DownloadFailed { status: 500 }.kind(), ErrorKind::Network);
        assert_eq!(InstallerError::Busy.kind(), ErrorKind::Busy);
        assert_eq!(InstallerError::Config("bad".into()).kind(), ErrorKind::Other);
    }

    #[test]
    fn test_warnings() {
        assert!(InstallerError::AlreadyInstalled.is_warning());
        assert!(InstallerError::NotInstalled.is_warning());
        assert!(!InstallerError::InvalidState("x".into()).is_warning());
    }

    #[test]
    fn test_io_conversion() {
        let err: InstallerError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, InstallerError::Io(_)));
    }
}
