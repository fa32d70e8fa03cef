//! Error taxonomy for the provisioning workflow.
//!
//! Backend errors (`StoreError`, `LedgerError`, `VaultError`) are folded
//! into [`ProvisioningError`], which distinguishes `NotFound`, retryable
//! `Transient` failures and `Permanent` ones.

use paramak_shared::{SealError, ValidationFailure};
use std::time::Duration;

/// Why a transient failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    /// A remote call exceeded its time bound
    Timeout,
    /// The remote service could not be reached or answered with a server error
    Unavailable,
}

/// Why a permanent failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermanentKind {
    InvalidInput,
    AuthRejected,
    /// The remote service refused the request (e.g. contract revert)
    Rejected,
    /// Same idempotency key is being minted by another request
    DuplicateInFlight,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Patient ID not found.")]
    NotFound { patient_id: String },

    #[error("{operation} failed: {message}")]
    Transient {
        kind: TransientKind,
        operation: &'static str,
        message: String,
    },

    #[error("{message}")]
    Permanent { kind: PermanentKind, message: String },
}

impl ProvisioningError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        ProvisioningError::Permanent {
            kind: PermanentKind::InvalidInput,
            message: message.into(),
        }
    }

    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        ProvisioningError::Transient {
            kind: TransientKind::Timeout,
            operation,
            message: format!("timed out after {}ms", after.as_millis()),
        }
    }

    pub fn unavailable(operation: &'static str, message: impl Into<String>) -> Self {
        ProvisioningError::Transient {
            kind: TransientKind::Unavailable,
            operation,
            message: message.into(),
        }
    }

    /// Whether a retry of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisioningError::Transient { .. })
    }
}

impl From<ValidationFailure> for ProvisioningError {
    fn from(err: ValidationFailure) -> Self {
        ProvisioningError::invalid_input(err.to_string())
    }
}

/// Key-value storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("storage value at {path} is malformed: {message}")]
    Malformed { path: String, message: String },

    #[error("conditional write on {0} kept conflicting")]
    Contention(String),
}

impl StoreError {
    fn into_provisioning(self, operation: &'static str) -> ProvisioningError {
        match self {
            StoreError::Unavailable(message) => ProvisioningError::unavailable(operation, message),
            StoreError::Contention(path) => {
                ProvisioningError::unavailable(operation, format!("contention on {}", path))
            }
            StoreError::Rejected { status, message } if status == 401 || status == 403 => {
                ProvisioningError::Permanent {
                    kind: PermanentKind::AuthRejected,
                    message: format!("storage access denied: {}", message),
                }
            }
            other => ProvisioningError::Permanent {
                kind: PermanentKind::Rejected,
                message: other.to_string(),
            },
        }
    }
}

impl From<StoreError> for ProvisioningError {
    fn from(err: StoreError) -> Self {
        err.into_provisioning("storage")
    }
}

/// Contract / JSON-RPC errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("could not decode rpc response: {0}")]
    Decode(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: String },

    #[error("transaction {tx_hash} not confirmed within {waited:?}")]
    Unconfirmed { tx_hash: String, waited: Duration },

    #[error("token index {index} out of range for owner")]
    IndexOutOfRange { index: u64 },
}

impl From<LedgerError> for ProvisioningError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Transport(message) => ProvisioningError::unavailable("ledger", message),
            LedgerError::Unconfirmed { .. } => ProvisioningError::Transient {
                kind: TransientKind::Timeout,
                operation: "ledger",
                message: err.to_string(),
            },
            // -32000 family covers node-side conditions such as nonce races
            LedgerError::Rpc { code, .. } if (-32099..=-32000).contains(&code) => {
                ProvisioningError::unavailable("ledger", err.to_string())
            }
            other => ProvisioningError::Permanent {
                kind: PermanentKind::Rejected,
                message: other.to_string(),
            },
        }
    }
}

/// Key vault errors
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Seal(#[from] SealError),

    #[error("vault already holds a key for {0}")]
    AddressCollision(String),

    #[error("vault entry for {address} is corrupt: {message}")]
    Corrupt { address: String, message: String },
}

impl From<VaultError> for ProvisioningError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::Store(store) => store.into_provisioning("vault"),
            other => ProvisioningError::Permanent {
                kind: PermanentKind::Rejected,
                message: other.to_string(),
            },
        }
    }
}
