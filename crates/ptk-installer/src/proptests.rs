//! Property-based tests for ptk-installer.
//!
//! # Properties Tested
//!
//! - Digest comparison ignores prefix and hex case, and catches any byte flip
//! - Driver validation is idempotent for every file combination
//! - Install followed by uninstall restores the original pair
//! - Settings toggles preserve unrelated keys and their order
//! - The first library folder declaring the app wins

#![cfg(test)]

use std::path::Path;
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::config::SettingsConfig;
use crate::digest;
use crate::driver::{DriverPair, DriverStatus};
use crate::error::InstallerError;
use crate::keyvalues;
use crate::locator::find_library_for_app;
use crate::operation::{MemoryLogSink, Progress};
use crate::settings::SettingsPatcher;
use crate::signature::{SignatureVerdict, SignatureVerifier, TrustStatus};

// =============================================================================
// Generators
// =============================================================================

/// Driver content: vendor files carry a `SIGNED` marker.
#[derive(Debug, Clone)]
enum FileState {
    Missing,
    Signed(Vec<u8>),
    Unsigned(Vec<u8>),
}

fn arb_payload() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

fn arb_file_state() -> impl Strategy<Value = FileState> {
    prop_oneof![
        Just(FileState::Missing),
        arb_payload().prop_map(FileState::Signed),
        arb_payload().prop_map(FileState::Unsigned),
    ]
}

/// Settings keys that never collide with the managed section.
fn arb_settings_document() -> impl Strategy<Value = Vec<(String, Value)>> {
    let leaf = prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z0-9 ÄÖÜé✓]{0,12}".prop_map(Value::String),
    ];
    let section = prop::collection::vec(("[a-zA-Z]{1,10}", leaf), 0..4).prop_map(|entries| {
        let mut map = Map::new();
        for (k, v) in entries {
            map.insert(k, v);
        }
        Value::Object(map)
    });
    prop::collection::vec(("[a-z_]{1,16}", section), 0..6).prop_map(|entries| {
        let mut seen = std::collections::HashSet::new();
        entries
            .into_iter()
            .filter(|(k, _)| k != "playstation_vr2_ex" && seen.insert(k.clone()))
            .collect()
    })
}

/// Library folders, each with a small set of app ids.
fn arb_library_folders() -> impl Strategy<Value = Vec<(String, Vec<u32>)>> {
    prop::collection::vec(
        ("/[a-z]{1,8}", prop::collection::vec(0u32..6, 0..4)),
        0..6,
    )
}

// =============================================================================
// Helper Functions
// =============================================================================

struct MarkerVerifier;

impl SignatureVerifier for MarkerVerifier {
    fn verify(&self, path: &Path) -> Result<SignatureVerdict, InstallerError> {
        let content = std::fs::read(path)?;
        let status = if content.starts_with(b"SIGNED") {
            TrustStatus::Trusted
        } else {
            TrustStatus::NotSigned
        };
        Ok(SignatureVerdict::new(path, status))
    }

    fn description(&self) -> &str {
        "marker"
    }
}

fn materialize(path: &Path, state: &FileState) {
    match state {
        FileState::Missing => {}
        FileState::Signed(bytes) => {
            let mut content = b"SIGNED".to_vec();
            content.extend_from_slice(bytes);
            std::fs::write(path, content).unwrap();
        }
        FileState::Unsigned(bytes) => {
            let mut content = b"PLAIN".to_vec();
            content.extend_from_slice(bytes);
            std::fs::write(path, content).unwrap();
        }
    }
}

fn pair_in(dir: &TempDir) -> DriverPair {
    DriverPair::new(
        dir.path().join("driver_playstation_vr2.dll"),
        dir.path().join("driver_playstation_vr2_orig.dll"),
        Arc::new(MarkerVerifier),
    )
}

fn progress() -> Progress {
    Progress::new(Arc::new(MemoryLogSink::new()))
}

fn manifest_text(folders: &[(String, Vec<u32>)]) -> String {
    let mut out = String::from("\"libraryfolders\"\n{\n");
    for (i, (path, apps)) in folders.iter().enumerate() {
        out.push_str(&format!("  \"{}\"\n  {{\n    \"path\" \"{}\"\n    \"apps\"\n    {{\n", i, path));
        for app in apps {
            out.push_str(&format!("      \"{}\" \"0\"\n", app));
        }
        out.push_str("    }\n  }\n");
    }
    out.push_str("}\n");
    out
}

// =============================================================================
// Digest comparison
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// A digest matches itself regardless of prefix and hex case.
    #[test]
    fn prop_digest_normalization(content in arb_payload(), upper in any::<bool>(), prefixed in any::<bool>()) {
        let local = digest::bytes_digest(&content);
        let mut published = local.trim_start_matches(digest::SHA256_PREFIX).to_string();
        if upper {
            published = published.to_uppercase();
        }
        if prefixed {
            published = format!("sha256:{}", published);
        }
        prop_assert!(digest::digests_match(&local, &published));
    }

    /// Flipping any single byte of the content changes the verdict.
    #[test]
    fn prop_digest_detects_byte_flip(content in prop::collection::vec(any::<u8>(), 1..512), index in any::<prop::sample::Index>(), flip in 1u8..=255) {
        let mut modified = content.clone();
        let i = index.index(modified.len());
        modified[i] ^= flip;
        prop_assert!(!digest::digests_match(&digest::bytes_digest(&content), &digest::bytes_digest(&modified)));
    }
}

// =============================================================================
// Driver state machine
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Validation never changes the files and always yields the same status.
    #[test]
    fn prop_validate_idempotent(current in arb_file_state(), original in arb_file_state()) {
        let dir = TempDir::new().unwrap();
        let pair = pair_in(&dir);
        materialize(pair.current_path(), &current);
        materialize(pair.original_path(), &original);

        let first = pair.validate().unwrap();
        let second = pair.validate().unwrap();
        prop_assert_eq!(first, second);

        let expected = match (&current, &original) {
            (FileState::Missing, _) => DriverStatus::Invalid,
            (FileState::Signed(_), _) => DriverStatus::Uninstalled,
            (FileState::Unsigned(_), FileState::Signed(_)) => DriverStatus::Installed,
            (FileState::Unsigned(_), _) => DriverStatus::Invalid,
        };
        prop_assert_eq!(first, expected);
    }

    /// Install then uninstall leaves the vendor driver byte-identical and no backup.
    #[test]
    fn prop_install_uninstall_roundtrip(vendor in arb_payload(), replacement in arb_payload()) {
        let dir = TempDir::new().unwrap();
        let pair = pair_in(&dir);
        materialize(pair.current_path(), &FileState::Signed(vendor));
        let before = std::fs::read(pair.current_path()).unwrap();

        let mut unsigned = b"PLAIN".to_vec();
        unsigned.extend_from_slice(&replacement);

        prop_assert_eq!(pair.install(&unsigned, &progress()).unwrap(), DriverStatus::Installed);
        prop_assert_eq!(std::fs::read(pair.original_path()).unwrap(), before.clone());

        prop_assert_eq!(pair.uninstall(&progress()).unwrap(), DriverStatus::Uninstalled);
        prop_assert_eq!(std::fs::read(pair.current_path()).unwrap(), before);
        prop_assert!(!pair.original_path().exists());
    }
}

// =============================================================================
// Settings patching
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Enabling then disabling leaves every unrelated key in place and in order.
    #[test]
    fn prop_settings_toggle_preserves_document(entries in arb_settings_document()) {
        let mut original = Map::new();
        for (k, v) in entries {
            original.insert(k, v);
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("steamvr.vrsettings");
        std::fs::write(&path, serde_json::to_string_pretty(&original).unwrap()).unwrap();
        let patcher = SettingsPatcher::new(&path, &SettingsConfig::default());

        patcher.write_flag(true, &progress()).unwrap();
        prop_assert!(patcher.read_flag().unwrap());

        patcher.write_flag(false, &progress()).unwrap();
        prop_assert!(!patcher.read_flag().unwrap());

        let rewritten: Map<String, Value> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        prop_assert_eq!(
            rewritten.keys().collect::<Vec<_>>(),
            original.keys().collect::<Vec<_>>()
        );
        prop_assert_eq!(rewritten, original);
    }
}

// =============================================================================
// Library manifest lookup
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The first folder that lists the app is chosen; none means not found.
    #[test]
    fn prop_first_library_wins(folders in arb_library_folders(), app in 0u32..6) {
        let manifest = keyvalues::parse(&manifest_text(&folders)).unwrap();
        let expected = folders
            .iter()
            .find(|(_, apps)| apps.contains(&app))
            .map(|(path, _)| std::path::PathBuf::from(path));

        prop_assert_eq!(find_library_for_app(&manifest, app), expected);
    }
}
