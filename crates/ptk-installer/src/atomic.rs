//! Crash-safe file replacement.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::InstallerError;

/// Write `bytes` to a temp file next to `target`, fsync it, then rename it
/// over `target`.
///
/// A crash at any point leaves either the old or the new content in place,
/// never a truncated file.
pub(crate) fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), InstallerError> {
    let parent = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    temp.as_file().sync_all()?;

    temp.persist(target).map_err(|e| InstallerError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("driver.dll");
        std::fs::write(&target, b"old contents that are longer").unwrap();

        write_atomic(&target, b"new").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_missing_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("driver.dll");
        assert!(matches!(write_atomic(&target, b"x"), Err(InstallerError::Io(_))));
    }
}
