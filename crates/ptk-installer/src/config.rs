//! Configuration for the installer engine.
//!
//! Every value has a working default, so a missing config file yields the
//! stock behavior against the PlayStation VR2 App and the upstream GitHub
//! repositories. The file is TOML.
//!
//! # Configuration File Locations
//!
//! - Unix: `~/.config/psvr2-toolkit-installer/installer.toml`
//! - Windows: `%APPDATA%\BnuuySolutions\psvr2-toolkit-installer\config\installer.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InstallerError;

/// Main installer configuration.
///
/// # Example TOML
///
/// ```toml
/// [steam]
/// app_id = 2580190
/// game_name = "PlayStation VR2 App"
/// # root = "C:/Program Files (x86)/Steam"
///
/// [driver]
/// plugin_subdir = "SteamVR_Plug-In/bin/win64"
/// file_name = "driver_playstation_vr2.dll"
/// backup_file_name = "driver_playstation_vr2_orig.dll"
///
/// [releases]
/// api_base_url = "https://api.github.com"
/// toolkit_repo = "BnuuySolutions/PSVR2Toolkit"
///
/// [logging]
/// level = "warn"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Steam lookup
    #[serde(default)]
    pub steam: SteamConfig,

    /// Driver file layout and download source
    #[serde(default)]
    pub driver: DriverConfig,

    /// Release host and repositories
    #[serde(default)]
    pub releases: ReleasesConfig,

    /// SteamVR settings keys
    #[serde(default)]
    pub settings: SettingsConfig,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl InstallerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, InstallerError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| InstallerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, or defaults if absent.
    pub fn load_default() -> Result<Self, InstallerError> {
        if let Some(path) = Self::default_path() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from custom path or default.
    pub fn load_from(custom_path: Option<&Path>) -> Result<Self, InstallerError> {
        match custom_path {
            Some(path) => Self::load(path),
            None => Self::load_default(),
        }
    }

    /// Platform-specific default configuration path.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "BnuuySolutions", "psvr2-toolkit-installer")
            .map(|dirs| dirs.config_dir().join("installer.toml"))
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), InstallerError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| InstallerError::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), InstallerError> {
        if self.steam.game_name.trim().is_empty() {
            return Err(InstallerError::Config("steam.game_name must not be empty".into()));
        }

        if self.driver.file_name == self.driver.backup_file_name {
            return Err(InstallerError::Config(
                "driver.file_name and driver.backup_file_name must differ".into(),
            ));
        }

        for (name, url) in [
            ("driver.download_url", &self.driver.download_url),
            ("releases.api_base_url", &self.releases.api_base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(InstallerError::Config(format!(
                    "invalid {} '{}': must start with http:// or https://",
                    name, url
                )));
            }
        }

        for (name, repo) in [
            ("releases.toolkit_repo", &self.releases.toolkit_repo),
            ("releases.installer_repo", &self.releases.installer_repo),
        ] {
            let mut parts = repo.split('/');
            let valid = matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(owner), Some(project), None) if !owner.is_empty() && !project.is_empty()
            );
            if !valid {
                return Err(InstallerError::Config(format!(
                    "invalid {} '{}': expected owner/name",
                    name, repo
                )));
            }
        }

        if self.network.timeout_seconds == 0 {
            return Err(InstallerError::Config(
                "network.timeout_seconds must be greater than 0".into(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(InstallerError::Config(format!(
                "invalid log level '{}': must be one of {:?}",
                self.logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Version the installer compares against its own latest release.
    pub fn installer_version(&self) -> &str {
        self.releases
            .installer_version
            .as_deref()
            .unwrap_or(env!("CARGO_PKG_VERSION"))
    }
}

/// Steam lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SteamConfig {
    /// Steam app id of the PlayStation VR2 App
    #[serde(default = "default_app_id")]
    pub app_id: u32,

    /// Directory name under `steamapps/common`
    #[serde(default = "default_game_name")]
    pub game_name: String,

    /// Explicit Steam root (skips registry/conventional lookup)
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl Default for SteamConfig {
    fn default() -> Self {
        Self {
            app_id: default_app_id(),
            game_name: default_game_name(),
            root: None,
        }
    }
}

/// Driver file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Driver directory relative to the game directory
    #[serde(default = "default_plugin_subdir")]
    pub plugin_subdir: String,

    /// Active driver file name
    #[serde(default = "default_driver_file")]
    pub file_name: String,

    /// Backup of the vendor driver
    #[serde(default = "default_backup_file")]
    pub backup_file_name: String,

    /// Where the replacement driver is downloaded from
    #[serde(default = "default_download_url")]
    pub download_url: String,

    /// Release asset whose digest is compared for staleness
    #[serde(default = "default_driver_file")]
    pub asset_name: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            plugin_subdir: default_plugin_subdir(),
            file_name: default_driver_file(),
            backup_file_name: default_backup_file(),
            download_url: default_download_url(),
            asset_name: default_driver_file(),
        }
    }
}

/// Release host configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleasesConfig {
    /// GitHub REST API base
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Repository publishing the driver
    #[serde(default = "default_toolkit_repo")]
    pub toolkit_repo: String,

    /// Repository publishing this installer
    #[serde(default = "default_installer_repo")]
    pub installer_repo: String,

    /// Override for the installer's own version
    #[serde(default)]
    pub installer_version: Option<String>,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            toolkit_repo: default_toolkit_repo(),
            installer_repo: default_installer_repo(),
            installer_version: None,
        }
    }
}

/// SteamVR settings keys managed by the installer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default = "default_section_key")]
    pub section_key: String,

    #[serde(default = "default_flag_key")]
    pub flag_key: String,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            section_key: default_section_key(),
            flag_key: default_flag_key(),
        }
    }
}

/// Network configuration for metadata and downloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// User-Agent header sent to the release host
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions for serde
fn default_app_id() -> u32 {
    2580190
}

fn default_game_name() -> String {
    "PlayStation VR2 App".to_string()
}

fn default_plugin_subdir() -> String {
    "SteamVR_Plug-In/bin/win64".to_string()
}

fn default_driver_file() -> String {
    "driver_playstation_vr2.dll".to_string()
}

fn default_backup_file() -> String {
    "driver_playstation_vr2_orig.dll".to_string()
}

fn default_download_url() -> String {
    "https://github.com/BnuuySolutions/PSVR2Toolkit/releases/latest/download/driver_playstation_vr2.dll"
        .to_string()
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_toolkit_repo() -> String {
    "BnuuySolutions/PSVR2Toolkit".to_string()
}

fn default_installer_repo() -> String {
    "MaidScientistIzutsumiMarin/psvr2toolkit-installer".to_string()
}

fn default_section_key() -> String {
    "playstation_vr2_ex".to_string()
}

fn default_flag_key() -> String {
    "enableEyelidEstimation".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("psvr2-toolkit-installer/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "warn".to_string()
}
