//! SteamVR settings patching.
//!
//! Only one outer key of `steamvr.vrsettings` is ever touched:
//!
//! ```json
//! {
//!    "playstation_vr2_ex" : {
//!       "enableEyelidEstimation" : true
//!    }
//! }
//! ```
//!
//! Everything else keeps its order and values. Output uses SteamVR's
//! three-space indentation and writes non-ASCII text as UTF-8.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::config::SettingsConfig;
use crate::error::InstallerError;
use crate::operation::Progress;

const INDENT: &[u8] = b"   ";

/// Reads and writes the eyelid-estimation flag.
#[derive(Debug, Clone)]
pub struct SettingsPatcher {
    path: PathBuf,
    section_key: String,
    flag_key: String,
}

impl SettingsPatcher {
    pub fn new(path: impl Into<PathBuf>, keys: &SettingsConfig) -> Self {
        Self {
            path: path.into(),
            section_key: keys.section_key.clone(),
            flag_key: keys.flag_key.clone(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, InstallerError> {
        let bytes = std::fs::read(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                InstallerError::not_found(format!("SteamVR settings at {}", self.path.display()))
            }
            _ => InstallerError::Io(e),
        })?;

        let value: Value = serde_json::from_slice(&bytes).map_err(|e| self.format_error(e.to_string()))?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(self.format_error(format!(
                "top level is {}, expected an object",
                json_kind(&other)
            ))),
        }
    }

    fn save(&self, document: &Map<String, Value>) -> Result<(), InstallerError> {
        let mut out = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(INDENT));
        document.serialize(&mut serializer)?;
        write_atomic(&self.path, &out)
    }

    fn format_error(&self, reason: String) -> InstallerError {
        InstallerError::SettingsFormat {
            path: self.path.clone(),
            reason,
        }
    }

    /// True only when the inner value is literally `true`.
    pub fn read_flag(&self) -> Result<bool, InstallerError> {
        let document = self.load()?;
        let enabled = document
            .get(&self.section_key)
            .and_then(|section| section.get(&self.flag_key))
            == Some(&Value::Bool(true));
        debug!(path = %self.path.display(), enabled, "Read eyelid estimation flag");
        Ok(enabled)
    }

    /// Set or clear the flag.
    ///
    /// Enabling replaces the whole section with `{ flag: true }`; disabling
    /// removes the section. Returns whether the file was rewritten.
    pub fn write_flag(&self, enabled: bool, progress: &Progress) -> Result<bool, InstallerError> {
        progress.info("Loading SteamVR settings...");
        let mut document = self.load()?;

        progress.info("Modifying SteamVR settings...");
        if enabled {
            let mut section = Map::new();
            section.insert(self.flag_key.clone(), Value::Bool(true));
            document.insert(self.section_key.clone(), Value::Object(section));
        } else if document.shift_remove(&self.section_key).is_none() {
            debug!(section = %self.section_key, "Section already absent, nothing to save");
            return Ok(false);
        }

        progress.info("Saving modified SteamVR settings...");
        self.save(&document)?;
        info!(path = %self.path.display(), enabled, "Updated SteamVR settings");
        Ok(true)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
