//! Content digests in the `sha256:<hex>` form GitHub publishes for release
//! assets.
//!
//! # Security
//!
//! - Files are hashed in fixed-size chunks, never loaded whole
//! - Comparison runs in constant time over the normalized hex

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::InstallerError;

/// Prefix of every digest this crate produces.
pub const SHA256_PREFIX: &str = "sha256:";

const HASH_BUFFER_SIZE: usize = 8192;

/// SHA-256 of a file's full content.
pub fn compute_hash(path: &Path) -> Result<[u8; 32], InstallerError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().into())
}

/// `sha256:<lowercase hex>` of a file.
pub fn file_digest(path: &Path) -> Result<String, InstallerError> {
    Ok(format_digest(&compute_hash(path)?))
}

/// `sha256:<lowercase hex>` of in-memory bytes.
pub fn bytes_digest(bytes: &[u8]) -> String {
    let hash: [u8; 32] = Sha256::digest(bytes).into();
    format_digest(&hash)
}

fn format_digest(hash: &[u8; 32]) -> String {
    format!("{}{}", SHA256_PREFIX, hex::encode(hash))
}

/// Strip any `<algorithm>:` prefix and fold hex to lowercase.
pub fn normalize(digest: &str) -> String {
    let hex = match digest.split_once(':') {
        Some((_, rest)) => rest,
        None => digest,
    };
    hex.trim().to_ascii_lowercase()
}

/// Compare two digests ignoring prefix and hex case.
pub fn digests_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_known_digest() {
        let file = create_test_file(b"abc");
        assert_eq!(
            file_digest(file.path()).unwrap(),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_and_bytes_agree_across_buffer_boundary() {
        let content: Vec<u8> = (0..HASH_BUFFER_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        let file = create_test_file(&content);
        assert_eq!(file_digest(file.path()).unwrap(), bytes_digest(&content));
    }

    #[test]
    fn test_missing_file() {
        let err = file_digest(Path::new("/nonexistent/driver.dll")).unwrap_err();
        assert!(matches!(err, InstallerError::Io(_)));
    }

    #[test]
    fn test_match_ignores_prefix_and_case() {
        let local = bytes_digest(b"driver");
        let hex = local.trim_start_matches(SHA256_PREFIX).to_string();

        assert!(digests_match(&local, &hex));
        assert!(digests_match(&local, &hex.to_uppercase()));
        assert!(digests_match(&local, &format!("SHA256:{}", hex.to_uppercase())));
    }

    #[test]
    fn test_single_byte_difference() {
        let a = bytes_digest(b"driver-v1");
        let b = bytes_digest(b"driver-v2");
        assert!(!digests_match(&a, &b));
    }

    #[test]
    fn test_length_mismatch() {
        assert!(!digests_match("sha256:abcd", "sha256:abcdef"));
        assert!(!digests_match("sha256:", "sha256:00"));
    }
}
