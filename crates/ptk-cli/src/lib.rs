//! PSVR2 Toolkit Installer - command-line front end
//!
//! This crate provides a command-line interface for:
//! - Showing the driver status and the eyelid estimation flag
//! - Installing, uninstalling, and updating the Toolkit driver
//! - Checking the Toolkit and installer releases for updates
//! - Toggling eyelid estimation in SteamVR's settings

pub mod cli;
pub mod output;

pub use cli::Cli;
pub use output::{CommandOutput, JsonResponse, OutputFormat, OutputFormatter};

use ptk_installer::{ErrorKind, InstallerError};

/// Exit codes for CLI operations
///
/// Exit codes provide machine-readable status for scripting:
/// - 0: Success (idempotency warnings included)
/// - 1: General error
/// - 2: Not found - Steam, the PlayStation VR2 App, a file, or a release is missing
/// - 3: Invalid state - driver files failed validation, nothing was touched
/// - 4: Network error - retry later
/// - 5: Busy - another operation is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully (exit code 0)
    Success = 0,
    /// General error (exit code 1)
    GeneralError = 1,
    /// A prerequisite is missing (exit code 2)
    NotFound = 2,
    /// Driver files are invalid (exit code 3)
    InvalidState = 3,
    /// Network failure (exit code 4)
    NetworkError = 4,
    /// Concurrent operation rejected (exit code 5)
    Busy = 5,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl From<ErrorKind> for ExitCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotFound => ExitCode::NotFound,
            ErrorKind::InvalidState => ExitCode::InvalidState,
            ErrorKind::Network => ExitCode::NetworkError,
            ErrorKind::Busy => ExitCode::Busy,
            ErrorKind::AlreadyInstalled | ErrorKind::NotInstalled => ExitCode::Success,
            ErrorKind::Other => ExitCode::GeneralError,
        }
    }
}

impl ExitCode {
    /// Exit code for an engine error.
    pub fn from_error(error: &InstallerError) -> Self {
        error.kind().into()
    }

    /// Convert to process exit code
    pub fn to_exit_code(self) -> std::process::ExitCode {
        std::process::ExitCode::from(self as u8)
    }

    /// Get the exit code name as a string
    pub fn name(&self) -> &'static str {
        match self {
            ExitCode::Success => "SUCCESS",
            ExitCode::GeneralError => "GENERAL_ERROR",
            ExitCode::NotFound => "NOT_FOUND",
            ExitCode::InvalidState => "INVALID_STATE",
            ExitCode::NetworkError => "NETWORK_ERROR",
            ExitCode::Busy => "BUSY",
        }
    }

    /// Get a human-readable description of the exit code
    pub fn description(&self) -> &'static str {
        match self {
            ExitCode::Success => "Operation completed successfully",
            ExitCode::GeneralError => "An unspecified error occurred",
            ExitCode::NotFound => "Steam, the PlayStation VR2 App, or a release could not be found",
            ExitCode::InvalidState => "Driver files are invalid; verify the app through Steam",
            ExitCode::NetworkError => "Could not reach the release host",
            ExitCode::Busy => "Another operation is already running",
        }
    }
}
