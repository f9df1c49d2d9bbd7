//! Steam path resolution.
//!
//! The Steam root comes from a [`SteamRootSource`]; everything else is derived
//! from it:
//!
//! ```text
//! <steam root>/
//! ├── config/steamvr.vrsettings          (settings_path)
//! └── steamapps/libraryfolders.vdf       (library manifest)
//!
//! <library folder>/steamapps/common/<game name>/    (game_dir)
//! └── SteamVR_Plug-In/bin/win64/                     (driver_dir)
//!     ├── driver_playstation_vr2.dll
//!     └── driver_playstation_vr2_orig.dll
//! ```

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::InstallerConfig;
use crate::error::InstallerError;
use crate::keyvalues::{self, Block};

/// Where the Steam client lives.
pub trait SteamRootSource: Send + Sync {
    /// Return the Steam installation root.
    fn steam_root(&self) -> Result<PathBuf, InstallerError>;

    /// Human-readable name of the source, for logs.
    fn description(&self) -> &str;
}

/// A Steam root given up front (config override, tests).
#[derive(Debug, Clone)]
pub struct FixedSteamRoot {
    root: PathBuf,
}

impl FixedSteamRoot {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SteamRootSource for FixedSteamRoot {
    fn steam_root(&self) -> Result<PathBuf, InstallerError> {
        Ok(self.root.clone())
    }

    fn description(&self) -> &str {
        "configured path"
    }
}

/// Reads `HKCU\Software\Valve\Steam\SteamPath`.
#[cfg(target_os = "windows")]
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistrySteamRoot;

#[cfg(target_os = "windows")]
impl SteamRootSource for RegistrySteamRoot {
    fn steam_root(&self) -> Result<PathBuf, InstallerError> {
        use std::ffi::c_void;
        use std::os::windows::ffi::OsStringExt;

        use windows::core::w;
        use windows::Win32::Foundation::ERROR_SUCCESS;
        use windows::Win32::System::Registry::{RegGetValueW, HKEY_CURRENT_USER, RRF_RT_REG_SZ};

        let mut size: u32 = 0;
        // SAFETY: size query with no output buffer.
        let status = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                w!("Software\\Valve\\Steam"),
                w!("SteamPath"),
                RRF_RT_REG_SZ,
                None,
                None,
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS || size == 0 {
            return Err(InstallerError::not_found("Steam installation (registry value SteamPath)"));
        }

        let mut buffer = vec![0u16; (size as usize).div_ceil(2)];
        // SAFETY: buffer holds `size` bytes as reported by the previous call.
        let status = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                w!("Software\\Valve\\Steam"),
                w!("SteamPath"),
                RRF_RT_REG_SZ,
                None,
                Some(buffer.as_mut_ptr() as *mut c_void),
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS {
            return Err(InstallerError::not_found("Steam installation (registry value SteamPath)"));
        }

        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        let root = PathBuf::from(std::ffi::OsString::from_wide(&buffer[..len]));
        Ok(root)
    }

    fn description(&self) -> &str {
        "Windows registry"
    }
}

/// Probes the usual Steam locations under the home directory.
#[cfg(not(target_os = "windows"))]
#[derive(Debug, Default, Clone, Copy)]
pub struct ConventionalSteamRoot;

#[cfg(not(target_os = "windows"))]
impl SteamRootSource for ConventionalSteamRoot {
    fn steam_root(&self) -> Result<PathBuf, InstallerError> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| InstallerError::not_found("home directory"))?;

        let candidates = [
            base.home_dir().join(".steam").join("steam"),
            base.data_dir().join("Steam"),
        ];

        candidates
            .into_iter()
            .find(|p| p.join("steamapps").is_dir())
            .ok_or_else(|| InstallerError::not_found("Steam installation"))
    }

    fn description(&self) -> &str {
        "home directory"
    }
}

/// The platform's native Steam root source.
pub fn native_root_source() -> Box<dyn SteamRootSource> {
    #[cfg(target_os = "windows")]
    {
        Box::new(RegistrySteamRoot)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(ConventionalSteamRoot)
    }
}

/// Paths resolved once per process and handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerContext {
    pub steam_root: PathBuf,
    pub game_dir: PathBuf,
    pub driver_dir: PathBuf,
    pub settings_path: PathBuf,
    /// Active driver binary
    pub current_driver: PathBuf,
    /// Backed-up vendor driver
    pub original_driver: PathBuf,
}

/// Resolves Steam, game and settings locations.
pub struct PathLocator {
    source: Box<dyn SteamRootSource>,
}

impl PathLocator {
    pub fn new(source: Box<dyn SteamRootSource>) -> Self {
        Self { source }
    }

    /// Locator honoring `[steam] root`, falling back to the native source.
    pub fn from_config(config: &InstallerConfig) -> Self {
        match &config.steam.root {
            Some(root) => Self::new(Box::new(FixedSteamRoot::new(root))),
            None => Self::new(native_root_source()),
        }
    }

    pub fn steam_root(&self) -> Result<PathBuf, InstallerError> {
        let root = self.source.steam_root()?;
        debug!(source = self.source.description(), root = %root.display(), "Resolved Steam root");
        Ok(root)
    }

    /// `<root>/config/steamvr.vrsettings`
    pub fn settings_path(&self) -> Result<PathBuf, InstallerError> {
        Ok(settings_path_in(&self.steam_root()?))
    }

    /// Find the install directory of `app_id` across all Steam libraries.
    ///
    /// # Errors
    ///
    /// - `NotFound` if Steam is missing or no library declares the app
    /// - `LibraryManifest` if `libraryfolders.vdf` is unreadable or malformed
    pub fn resolve_game_directory(
        &self,
        app_id: u32,
        game_name: &str,
    ) -> Result<PathBuf, InstallerError> {
        let manifest_path = self.steam_root()?.join("steamapps").join("libraryfolders.vdf");

        let content = std::fs::read_to_string(&manifest_path).map_err(|e| {
            InstallerError::LibraryManifest(format!("{}: {}", manifest_path.display(), e))
        })?;
        let manifest = keyvalues::parse(&content).map_err(|e| {
            InstallerError::LibraryManifest(format!("{}: {}", manifest_path.display(), e))
        })?;

        let library = find_library_for_app(&manifest, app_id)
            .ok_or_else(|| InstallerError::not_found(format!("installation path for app {}", app_id)))?;

        let game_dir = library.join("steamapps").join("common").join(game_name);
        info!(app_id, game_dir = %game_dir.display(), "Located game directory");
        Ok(game_dir)
    }

    /// Resolve every path the engine needs.
    pub fn resolve_context(&self, config: &InstallerConfig) -> Result<InstallerContext, InstallerError> {
        let steam_root = self.steam_root()?;
        let game_dir = self.resolve_game_directory(config.steam.app_id, &config.steam.game_name)?;

        let driver_dir = config
            .driver
            .plugin_subdir
            .split(['/', '\\'])
            .filter(|part| !part.is_empty())
            .fold(game_dir.clone(), |dir, part| dir.join(part));

        Ok(InstallerContext {
            settings_path: settings_path_in(&steam_root),
            current_driver: driver_dir.join(&config.driver.file_name),
            original_driver: driver_dir.join(&config.driver.backup_file_name),
            steam_root,
            game_dir,
            driver_dir,
        })
    }
}

fn settings_path_in(steam_root: &Path) -> PathBuf {
    steam_root.join("config").join("steamvr.vrsettings")
}

/// Library folder path of the first folder whose `apps` block lists `app_id`.
pub fn find_library_for_app(manifest: &Block, app_id: u32) -> Option<PathBuf> {
    let app_key = app_id.to_string();

    manifest
        .block("libraryfolders")?
        .iter()
        .filter_map(|(_, folder)| folder.as_block())
        .find(|folder| {
            folder
                .block("apps")
                .is_some_and(|apps| apps.contains_key(&app_key))
        })
        .and_then(|folder| folder.text("path"))
        .map(PathBuf::from)
}
