//! Code-signing verification.
//!
//! Whether a driver binary carries a valid Authenticode signature is the only
//! thing that distinguishes the vendor driver from the replacement. A verdict
//! is computed fresh on every call; nothing is cached across file mutations.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::InstallerError;

/// Raw outcome of a signature check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    Trusted,
    NotSigned,
    /// The signed digest does not match the file content
    HashMismatch,
    UntrustedChain,
    Revoked,
    Expired,
    /// Any other rejection, with the platform result code
    Rejected(u32),
}

impl fmt::Display for TrustStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustStatus::Trusted => write!(f, "trusted"),
            TrustStatus::NotSigned => write!(f, "not signed"),
            TrustStatus::HashMismatch => write!(f, "signed digest does not match file content"),
            TrustStatus::UntrustedChain => write!(f, "certificate chain is not trusted"),
            TrustStatus::Revoked => write!(f, "signing certificate was revoked"),
            TrustStatus::Expired => write!(f, "signing certificate has expired"),
            TrustStatus::Rejected(code) => write!(f, "rejected (0x{:08X})", code),
        }
    }
}

/// Result of checking one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVerdict {
    pub path: PathBuf,
    pub status: TrustStatus,
}

impl SignatureVerdict {
    pub fn new(path: impl Into<PathBuf>, status: TrustStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }

    /// True only for a fully valid signature.
    pub fn trusted(&self) -> bool {
        self.status == TrustStatus::Trusted
    }

    /// Turn a signed-but-invalid verdict into an error.
    ///
    /// `Trusted` and `NotSigned` pass; every other status becomes
    /// [`InstallerError::SignatureInvalid`].
    pub fn explain(&self) -> Result<(), InstallerError> {
        match self.status {
            TrustStatus::Trusted | TrustStatus::NotSigned => Ok(()),
            status => Err(InstallerError::SignatureInvalid {
                path: self.path.clone(),
                reason: status.to_string(),
            }),
        }
    }
}

/// Produces a [`SignatureVerdict`] for a file.
pub trait SignatureVerifier: Send + Sync {
    /// Check the signature of `path`.
    ///
    /// # Errors
    ///
    /// - `Io` if the file cannot be read
    /// - `SignatureParse` if the signing structure is malformed
    fn verify(&self, path: &Path) -> Result<SignatureVerdict, InstallerError>;

    /// Get a description of this verifier.
    fn description(&self) -> &str;
}

/// Map a `WinVerifyTrust` result to a status.
///
/// `Err` carries a reason when the code means the signing structure could not
/// be parsed at all.
pub fn classify_trust_result(code: u32) -> Result<TrustStatus, String> {
    const TRUST_E_PROVIDER_UNKNOWN: u32 = 0x800B_0001;
    const TRUST_E_SUBJECT_FORM_UNKNOWN: u32 = 0x800B_0003;
    const TRUST_E_NOSIGNATURE: u32 = 0x800B_0100;
    const CERT_E_EXPIRED: u32 = 0x800B_0101;
    const CERT_E_UNTRUSTEDROOT: u32 = 0x800B_0109;
    const CERT_E_CHAINING: u32 = 0x800B_010A;
    const CERT_E_REVOKED: u32 = 0x800B_010C;
    const TRUST_E_EXPLICIT_DISTRUST: u32 = 0x800B_0111;
    const TRUST_E_BAD_DIGEST: u32 = 0x8009_6010;
    const TRUST_E_NO_SIGNER_CERT: u32 = 0x8009_6002;
    const CRYPT_E_FILE_ERROR: u32 = 0x8009_2003;
    const CRYPT_E_ASN1_FIRST: u32 = 0x8009_3100;
    const CRYPT_E_ASN1_LAST: u32 = 0x8009_31FF;

    let status = match code {
        0 => TrustStatus::Trusted,
        TRUST_E_NOSIGNATURE | TRUST_E_SUBJECT_FORM_UNKNOWN | TRUST_E_PROVIDER_UNKNOWN => {
            TrustStatus::NotSigned
        }
        TRUST_E_BAD_DIGEST => TrustStatus::HashMismatch,
        CERT_E_UNTRUSTEDROOT | CERT_E_CHAINING | TRUST_E_EXPLICIT_DISTRUST => {
            TrustStatus::UntrustedChain
        }
        CERT_E_REVOKED => TrustStatus::Revoked,
        CERT_E_EXPIRED => TrustStatus::Expired,
        TRUST_E_NO_SIGNER_CERT => return Err("signature has no signer certificate".into()),
        CRYPT_E_FILE_ERROR => return Err("signed content could not be read".into()),
        CRYPT_E_ASN1_FIRST..=CRYPT_E_ASN1_LAST => {
            return Err(format!("malformed signature encoding (0x{:08X})", code));
        }
        other => TrustStatus::Rejected(other),
    };
    Ok(status)
}

/// Authenticode verification through `WinVerifyTrust`.
#[cfg(target_os = "windows")]
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthenticodeVerifier;

#[cfg(target_os = "windows")]
impl SignatureVerifier for AuthenticodeVerifier {
    fn verify(&self, path: &Path) -> Result<SignatureVerdict, InstallerError> {
        use std::ffi::c_void;
        use std::os::windows::ffi::OsStrExt;

        use windows::core::{PCWSTR, PWSTR};
        use windows::Win32::Foundation::{HANDLE, HWND};
        use windows::Win32::Security::WinTrust::{
            WinVerifyTrust, WINTRUST_ACTION_GENERIC_VERIFY_V2, WINTRUST_DATA, WINTRUST_DATA_0,
            WINTRUST_DATA_PROVIDER_FLAGS, WINTRUST_DATA_UICONTEXT, WINTRUST_FILE_INFO,
            WTD_CHOICE_FILE, WTD_REVOKE_NONE, WTD_STATEACTION_CLOSE, WTD_STATEACTION_VERIFY,
            WTD_UI_NONE,
        };

        // Surface unreadable files as IO errors rather than trust failures.
        std::fs::File::open(path)?;

        let path_wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let mut file_info = WINTRUST_FILE_INFO {
            cbStruct: std::mem::size_of::<WINTRUST_FILE_INFO>() as u32,
            pcwszFilePath: PCWSTR(path_wide.as_ptr()),
            hFile: HANDLE::default(),
            pgKnownSubject: std::ptr::null_mut(),
        };

        let mut trust_data = WINTRUST_DATA {
            cbStruct: std::mem::size_of::<WINTRUST_DATA>() as u32,
            pPolicyCallbackData: std::ptr::null_mut(),
            pSIPClientData: std::ptr::null_mut(),
            dwUIChoice: WTD_UI_NONE,
            fdwRevocationChecks: WTD_REVOKE_NONE,
            dwUnionChoice: WTD_CHOICE_FILE,
            Anonymous: WINTRUST_DATA_0 {
                pFile: &mut file_info,
            },
            dwStateAction: WTD_STATEACTION_VERIFY,
            hWVTStateData: HANDLE::default(),
            pwszURLReference: PWSTR::null(),
            dwProvFlags: WINTRUST_DATA_PROVIDER_FLAGS(0),
            dwUIContext: WINTRUST_DATA_UICONTEXT(0),
            pSignatureSettings: std::ptr::null_mut(),
        };

        let mut action_guid = WINTRUST_ACTION_GENERIC_VERIFY_V2;
        // INVALID_HANDLE_VALUE as HWND: no UI parent.
        let hwnd = HWND(-1isize as *mut c_void);

        // SAFETY: file_info, trust_data and path_wide outlive both calls.
        let result = unsafe {
            WinVerifyTrust(
                hwnd,
                &mut action_guid,
                &mut trust_data as *mut _ as *mut c_void,
            )
        };

        trust_data.dwStateAction = WTD_STATEACTION_CLOSE;
        // SAFETY: releases the state handle opened by the verify call.
        unsafe {
            WinVerifyTrust(
                hwnd,
                &mut action_guid,
                &mut trust_data as *mut _ as *mut c_void,
            );
        }

        let code = result as u32;
        let status = classify_trust_result(code).map_err(|reason| InstallerError::SignatureParse {
            path: path.to_path_buf(),
            reason,
        })?;

        tracing::debug!(
            path = %path.display(),
            status = %status,
            code = format_args!("0x{:08X}", code),
            "Authenticode check finished"
        );

        Ok(SignatureVerdict::new(path, status))
    }

    fn description(&self) -> &str {
        "Windows Authenticode"
    }
}

/// Stand-in on platforms without Authenticode support.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedVerifier;

impl SignatureVerifier for UnsupportedVerifier {
    fn verify(&self, path: &Path) -> Result<SignatureVerdict, InstallerError> {
        std::fs::File::open(path)?;
        Err(InstallerError::Unsupported("Authenticode verification requires Windows"))
    }

    fn description(&self) -> &str {
        "unsupported"
    }
}

/// The platform's native verifier.
pub fn native_verifier() -> Box<dyn SignatureVerifier> {
    #[cfg(target_os = "windows")]
    {
        Box::new(AuthenticodeVerifier)
    }

    #[cfg(not(target_os = "windows"))]
    {
        Box::new(UnsupportedVerifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_codes() {
        assert_eq!(classify_trust_result(0), Ok(TrustStatus::Trusted));
        assert_eq!(classify_trust_result(0x800B_0100), Ok(TrustStatus::NotSigned));
        assert_eq!(classify_trust_result(0x800B_0003), Ok(TrustStatus::NotSigned));
        assert_eq!(classify_trust_result(0x8009_6010), Ok(TrustStatus::HashMismatch));
        assert_eq!(classify_trust_result(0x800B_0109), Ok(TrustStatus::UntrustedChain));
        assert_eq!(classify_trust_result(0x800B_0111), Ok(TrustStatus::UntrustedChain));
        assert_eq!(classify_trust_result(0x800B_010C), Ok(TrustStatus::Revoked));
        assert_eq!(classify_trust_result(0x800B_0101), Ok(TrustStatus::Expired));
        assert_eq!(
            classify_trust_result(0x800B_0004),
            Ok(TrustStatus::Rejected(0x800B_0004))
        );
    }

    #[test]
    fn test_classify_parse_failures() {
        assert!(classify_trust_result(0x8009_3102).is_err());
        assert!(classify_trust_result(0x8009_2003).is_err());
        assert!(classify_trust_result(0x8009_6002).is_err());
    }

    #[test]
    fn test_verdict_trusted_and_explain() {
        let ok = SignatureVerdict::new("a.dll", TrustStatus::Trusted);
        assert!(ok.trusted());
        assert!(ok.explain().is_ok());

        let unsigned = SignatureVerdict::new("a.dll", TrustStatus::NotSigned);
        assert!(!unsigned.trusted());
        assert!(unsigned.explain().is_ok());

        let tampered = SignatureVerdict::new("a.dll", TrustStatus::HashMismatch);
        assert!(!tampered.trusted());
        match tampered.explain().unwrap_err() {
            InstallerError::SignatureInvalid { path, reason } => {
                assert_eq!(path, PathBuf::from("a.dll"));
                assert!(reason.contains("digest"));
            }
            e => panic!("Expected SignatureInvalid, got {:?}", e),
        }
    }

    #[test]
    fn test_unsupported_verifier() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = UnsupportedVerifier.verify(file.path()).unwrap_err();
        assert!(matches!(err, InstallerError::Unsupported(_)));

        let err = UnsupportedVerifier
            .verify(Path::new("/definitely/not/here.dll"))
            .unwrap_err();
        assert!(matches!(err, InstallerError::Io(_)));
    }

    #[test]
    fn test_rejected_display() {
        assert_eq!(
            TrustStatus::Rejected(0x800B_0004).to_string(),
            "rejected (0x800B0004)"
        );
    }
}
