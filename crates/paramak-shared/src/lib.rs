//! Paramak Shared Utilities
//!
//! This crate provides common functionality for the Paramak crates:
//! - Input validation with accumulated, field-level errors
//! - Sealing of custodial key material (XChaCha20-Poly1305)
//! - Audit logging of record access and minting

use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use audit::*;
pub use encryption::*;
pub use validation::*;

/// Validation module - patient identifiers, idempotency keys, hex secrets
pub mod validation {
    use super::*;

    /// Maximum length of a patient identifier or idempotency key
    pub const MAX_KEY_LENGTH: usize = 128;

    /// Characters that cannot appear in a storage path segment
    const FORBIDDEN_KEY_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

    /// Validation error with detailed context
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ValidationError {
        pub field: String,
        pub message: String,
        pub code: ValidationErrorCode,
    }

    /// Specific validation error codes for programmatic handling
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ValidationErrorCode {
        Required,
        InvalidFormat,
        OutOfRange,
        TooLong,
        InvalidCharacters,
    }

    impl std::fmt::Display for ValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
        }
    }

    /// All errors collected by a failed validation
    #[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
    #[error("Validation failed: {}", join_errors(.errors))]
    pub struct ValidationFailure {
        pub errors: Vec<ValidationError>,
    }

    fn join_errors(errors: &[ValidationError]) -> String {
        errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Validation result that can accumulate multiple errors
    #[derive(Clone, Debug, Default)]
    pub struct ValidationResult {
        pub errors: Vec<ValidationError>,
    }

    impl ValidationResult {
        pub fn new() -> Self {
            Self { errors: Vec::new() }
        }

        pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
            self.errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
                code,
            });
        }

        pub fn is_valid(&self) -> bool {
            self.errors.is_empty()
        }

        pub fn into_result(self) -> Result<(), ValidationFailure> {
            if self.is_valid() {
                Ok(())
            } else {
                Err(ValidationFailure {
                    errors: self.errors,
                })
            }
        }

        pub fn merge(&mut self, other: ValidationResult) {
            self.errors.extend(other.errors);
        }
    }

    /// Validate a value that becomes a single storage path segment.
    ///
    /// Must be non-empty, at most [`MAX_KEY_LENGTH`] characters, and free
    /// of control characters and `/ . # $ [ ]`.
    pub fn validate_path_key(value: &str, field: &str) -> ValidationResult {
        let mut result = ValidationResult::new();

        if value.is_empty() {
            result.add_error(field, "value is required", ValidationErrorCode::Required);
            return result;
        }

        if value.chars().count() > MAX_KEY_LENGTH {
            result.add_error(
                field,
                &format!("cannot exceed {} characters", MAX_KEY_LENGTH),
                ValidationErrorCode::TooLong,
            );
        }

        if value
            .chars()
            .any(|c| c.is_control() || FORBIDDEN_KEY_CHARS.contains(&c))
        {
            result.add_error(
                field,
                "cannot contain control characters or any of / . # $ [ ]",
                ValidationErrorCode::InvalidCharacters,
            );
        }

        result
    }

    /// Validate a patient identifier (national ID, MRN, or other external ID)
    pub fn validate_patient_id(patient_id: &str) -> ValidationResult {
        validate_path_key(patient_id, "patient_id")
    }

    /// Validate a caller-supplied idempotency key
    pub fn validate_idempotency_key(key: &str) -> ValidationResult {
        validate_path_key(key, "idempotency_key")
    }

    /// Validate a hex-encoded secret of an exact byte length.
    ///
    /// An optional `0x` prefix is accepted.
    pub fn validate_hex_secret(value: &str, field: &str, expected_bytes: usize) -> ValidationResult {
        let mut result = ValidationResult::new();
        let digits = value.strip_prefix("0x").unwrap_or(value);

        if digits.is_empty() {
            result.add_error(field, "value is required", ValidationErrorCode::Required);
            return result;
        }

        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            result.add_error(field, "must be hexadecimal", ValidationErrorCode::InvalidFormat);
        } else if digits.len() != expected_bytes * 2 {
            result.add_error(
                field,
                &format!("must encode exactly {} bytes", expected_bytes),
                ValidationErrorCode::OutOfRange,
            );
        }

        result
    }

    /// Validate an absolute http(s) URL
    pub fn validate_http_url(value: &str, field: &str) -> ValidationResult {
        let mut result = ValidationResult::new();

        if value.is_empty() {
            result.add_error(field, "value is required", ValidationErrorCode::Required);
        } else if !(value.starts_with("http://") || value.starts_with("https://")) {
            result.add_error(
                field,
                "must be an http:// or https:// URL",
                ValidationErrorCode::InvalidFormat,
            );
        }

        result
    }
}

/// Sealing of custodial secrets
///
/// Wallet private keys are never persisted in plaintext. They are sealed
/// with XChaCha20-Poly1305 under a 32-byte master key that is supplied to
/// the process out of band, with the owning wallet address as associated
/// data so a sealed key cannot be replayed under another address.
pub mod encryption {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chacha20poly1305::aead::{Aead, KeyInit, Payload};
    use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};

    /// Current sealing scheme version
    pub const SEAL_VERSION: u8 = 1;

    /// Nonce length for XChaCha20-Poly1305
    const NONCE_LEN: usize = 24;

    #[derive(Debug, thiserror::Error)]
    pub enum SealError {
        #[error("Failed to generate random nonce: {0}")]
        Randomness(String),

        #[error("Invalid sealing key: {0}")]
        InvalidKey(String),

        #[error("Invalid sealed secret encoding: {0}")]
        Encoding(String),

        #[error("Unsupported seal version {0}")]
        UnsupportedVersion(u8),

        #[error("Integrity check failed - secret may have been tampered with")]
        Integrity,
    }

    /// Sealed secret as stored - base64 ciphertext (with tag) and nonce
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SealedSecret {
        pub ciphertext: String,
        pub nonce: String,
        pub version: u8,
    }

    /// Master key used to seal and open secrets
    #[derive(Clone)]
    pub struct SealingKey {
        key_material: [u8; 32],
    }

    impl std::fmt::Debug for SealingKey {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("SealingKey(<redacted>)")
        }
    }

    impl SealingKey {
        /// Create a sealing key from raw bytes
        pub fn new(bytes: [u8; 32]) -> Self {
            Self { key_material: bytes }
        }

        /// Parse a sealing key from 64 hex characters (optional `0x` prefix)
        pub fn from_hex(value: &str) -> Result<Self, SealError> {
            validate_hex_secret(value, "sealing_key", 32)
                .into_result()
                .map_err(|e| SealError::InvalidKey(e.to_string()))?;
            let digits = value.strip_prefix("0x").unwrap_or(value);
            let bytes = hex::decode(digits).map_err(|e| SealError::InvalidKey(e.to_string()))?;
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes);
            Ok(Self::new(key))
        }

        /// Generate a fresh random sealing key
        pub fn generate() -> Result<Self, SealError> {
            let mut key = [0u8; 32];
            getrandom::fill(&mut key).map_err(|e| SealError::Randomness(e.to_string()))?;
            Ok(Self::new(key))
        }

        fn cipher(&self) -> XChaCha20Poly1305 {
            XChaCha20Poly1305::new(Key::from_slice(&self.key_material))
        }
    }

    /// Seal a secret under `key`, binding it to `associated_data`
    pub fn seal_secret(
        plaintext: &[u8],
        associated_data: &[u8],
        key: &SealingKey,
    ) -> Result<SealedSecret, SealError> {
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::fill(&mut nonce).map_err(|e| SealError::Randomness(e.to_string()))?;

        let ciphertext = key
            .cipher()
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: associated_data,
                },
            )
            .map_err(|_| SealError::Integrity)?;

        Ok(SealedSecret {
            ciphertext: STANDARD.encode(ciphertext),
            nonce: STANDARD.encode(nonce),
            version: SEAL_VERSION,
        })
    }

    /// Open a sealed secret; fails if the key, data or ciphertext differ
    pub fn open_secret(
        sealed: &SealedSecret,
        associated_data: &[u8],
        key: &SealingKey,
    ) -> Result<Vec<u8>, SealError> {
        if sealed.version != SEAL_VERSION {
            return Err(SealError::UnsupportedVersion(sealed.version));
        }

        let nonce = STANDARD
            .decode(&sealed.nonce)
            .map_err(|e| SealError::Encoding(e.to_string()))?;
        if nonce.len() != NONCE_LEN {
            return Err(SealError::Encoding("Invalid nonce length".to_string()));
        }

        let ciphertext = STANDARD
            .decode(&sealed.ciphertext)
            .map_err(|e| SealError::Encoding(e.to_string()))?;

        key.cipher()
            .decrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext.as_slice(),
                    aad: associated_data,
                },
            )
            .map_err(|_| SealError::Integrity)
    }
}

/// Audit logging module
///
/// Audit events go to the `audit` tracing target so they can be routed to
/// a separate sink. They never carry key material or session tokens.
pub mod audit {
    use super::*;
    use chrono::{DateTime, Utc};

    /// Kinds of audited operations
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum AuditAction {
        WalletCreated,
        RecordMinted,
        RecordsRead,
        SessionIssued,
    }

    impl std::fmt::Display for AuditAction {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                AuditAction::WalletCreated => write!(f, "WalletCreated"),
                AuditAction::RecordMinted => write!(f, "RecordMinted"),
                AuditAction::RecordsRead => write!(f, "RecordsRead"),
                AuditAction::SessionIssued => write!(f, "SessionIssued"),
            }
        }
    }

    /// Access log entry for the audit trail
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct AccessLogEntry {
        pub patient_id: String,
        pub action: AuditAction,
        pub wallet_address: Option<String>,
        pub detail: Option<String>,
        pub at: DateTime<Utc>,
    }

    impl AccessLogEntry {
        pub fn new(patient_id: &str, action: AuditAction) -> Self {
            Self {
                patient_id: patient_id.to_string(),
                action,
                wallet_address: None,
                detail: None,
                at: Utc::now(),
            }
        }

        pub fn with_wallet(mut self, address: impl Into<String>) -> Self {
            self.wallet_address = Some(address.into());
            self
        }

        pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
            self.detail = Some(detail.into());
            self
        }
    }

    /// Emit an audit event
    pub fn log_access(entry: &AccessLogEntry) {
        tracing::info!(
            target: "audit",
            patient_id = %entry.patient_id,
            action = %entry.action,
            wallet = entry.wallet_address.as_deref().unwrap_or("-"),
            detail = entry.detail.as_deref().unwrap_or("-"),
            at = %entry.at.to_rfc3339(),
            "audit event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_patient_id_validation() {
        assert!(validate_patient_id("1103700012345").is_valid());
        assert!(validate_patient_id("HN-2024-0001").is_valid());
        assert!(validate_patient_id("P1").is_valid());

        let empty = validate_patient_id("");
        assert_eq!(empty.errors.len(), 1);
        assert_eq!(empty.errors[0].code, ValidationErrorCode::Required);

        let nested = validate_patient_id("patients/other");
        assert_eq!(nested.errors[0].code, ValidationErrorCode::InvalidCharacters);

        let long = "9".repeat(MAX_KEY_LENGTH + 1);
        assert_eq!(validate_patient_id(&long).errors[0].code, ValidationErrorCode::TooLong);
    }

    #[test]
    fn test_validation_result_merge_and_message() {
        let mut result = validate_patient_id("");
        result.merge(validate_idempotency_key("a.b"));
        assert_eq!(result.errors.len(), 2);

        let err = result.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Validation failed: "));
        assert!(message.contains("patient_id"));
        assert!(message.contains("idempotency_key"));
    }

    #[test]
    fn test_hex_secret_validation() {
        let key = "ab".repeat(32);
        assert!(validate_hex_secret(&key, "k", 32).is_valid());
        assert!(validate_hex_secret(&format!("0x{}", key), "k", 32).is_valid());
        assert!(!validate_hex_secret("abcd", "k", 32).is_valid());
        assert!(!validate_hex_secret(&"zz".repeat(32), "k", 32).is_valid());
        assert!(!validate_hex_secret("", "k", 32).is_valid());
    }

    #[test]
    fn test_http_url_validation() {
        assert!(validate_http_url("https://rpc.example.org", "rpc").is_valid());
        assert!(!validate_http_url("ftp://rpc.example.org", "rpc").is_valid());
        assert!(!validate_http_url("", "rpc").is_valid());
    }

    #[test]
    fn test_seal_and_open_roundtrip() {
        let key = SealingKey::generate().unwrap();
        let sealed = seal_secret(b"wallet-secret", b"0xabc", &key).unwrap();
        assert_eq!(sealed.version, SEAL_VERSION);
        assert_ne!(sealed.ciphertext, "wallet-secret");

        let opened = open_secret(&sealed, b"0xabc", &key).unwrap();
        assert_eq!(opened, b"wallet-secret");
    }

    #[test]
    fn test_open_rejects_wrong_associated_data_or_key() {
        let key = SealingKey::generate().unwrap();
        let sealed = seal_secret(b"wallet-secret", b"0xabc", &key).unwrap();

        assert!(matches!(
            open_secret(&sealed, b"0xdef", &key),
            Err(SealError::Integrity)
        ));

        let other = SealingKey::generate().unwrap();
        assert!(matches!(
            open_secret(&sealed, b"0xabc", &other),
            Err(SealError::Integrity)
        ));
    }

    #[test]
    fn test_sealing_key_from_hex() {
        assert!(SealingKey::from_hex(&"11".repeat(32)).is_ok());
        assert!(matches!(
            SealingKey::from_hex("1234"),
            Err(SealError::InvalidKey(_))
        ));
        assert_eq!(
            format!("{:?}", SealingKey::new([7u8; 32])),
            "SealingKey(<redacted>)"
        );
    }

    #[test]
    fn test_audit_entry_builder() {
        let entry = AccessLogEntry::new("P1", AuditAction::RecordMinted)
            .with_wallet("0x0000000000000000000000000000000000000001")
            .with_detail("token 3");
        assert_eq!(entry.action.to_string(), "RecordMinted");
        assert_eq!(entry.detail.as_deref(), Some("token 3"));
        log_access(&entry);
    }

    proptest! {
        #[test]
        fn prop_forbidden_characters_always_rejected(
            prefix in "[A-Za-z0-9-]{0,10}",
            bad in prop::sample::select(vec!['/', '.', '#', '$', '[', ']']),
            suffix in "[A-Za-z0-9-]{0,10}",
        ) {
            let id = format!("{}{}{}", prefix, bad, suffix);
            prop_assert!(!validate_patient_id(&id).is_valid());
        }

        #[test]
        fn prop_alphanumeric_ids_accepted(id in "[A-Za-z0-9_-]{1,128}") {
            prop_assert!(validate_patient_id(&id).is_valid());
        }
    }
}
