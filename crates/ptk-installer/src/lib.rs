//! # ptk-installer
//!
//! Driver-state reconciliation engine for the PlayStation VR2 Toolkit.
//!
//! This crate handles:
//! - Locating the PlayStation VR2 App through Steam's library manifest
//! - Deriving the installed/uninstalled state of the SteamVR driver from its
//!   code signature
//! - Swapping the vendor driver for the Toolkit driver and back
//! - Toggling eyelid estimation in SteamVR's settings file
//! - Checking the Toolkit and installer releases for updates
//!
//! ## Safety
//!
//! - The Authenticode signature is the only source of truth for which file is
//!   the vendor driver; state is re-derived from disk after every mutation
//! - Files are only ever renamed, unlinked, or replaced via temp-then-rename
//! - Invalid driver files stop every destructive operation
//! - Only one operation runs at a time

mod atomic;
pub mod config;
pub mod digest;
pub mod download;
pub mod driver;
pub mod engine;
pub mod error;
pub mod keyvalues;
pub mod locator;
pub mod operation;
#[cfg(test)]
mod proptests;
pub mod release;
pub mod settings;
pub mod signature;
pub mod update;

// Re-export main types for convenience
pub use config::InstallerConfig;
pub use driver::{DriverPair, DriverSnapshot, DriverStatus, UninstallAction};
pub use engine::Installer;
pub use error::{ErrorKind, InstallerError};
pub use locator::{FixedSteamRoot, InstallerContext, PathLocator, SteamRootSource};
pub use operation::{
    ChannelLogSink, EngineState, LogLine, LogSink, MemoryLogSink, OperationRunner, Progress, Tone,
};
pub use release::{GitHubReleases, ReleaseAsset, ReleaseHost, ReleaseInfo};
pub use settings::SettingsPatcher;
#[cfg(target_os = "windows")]
pub use signature::AuthenticodeVerifier;
pub use signature::{SignatureVerdict, SignatureVerifier, TrustStatus, UnsupportedVerifier};
pub use update::{ArtifactUpdate, UpdateChecker, UpdateReport};
