//! Key-value storage for wallet records, idempotency markers and the vault.
//!
//! Values are JSON documents addressed by `/`-separated paths, mirroring
//! the Realtime Database data model. The one primitive the workflow
//! depends on for correctness is [`WalletStore::create_if_absent`]: it
//! must be atomic, so two concurrent creators of the same path observe
//! exactly one `Created`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

mod firebase;
mod memory;

pub use firebase::{FirebaseStore, FirebaseStoreConfig};
pub use memory::MemoryStore;

/// Outcome of a conditional create
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    /// Our value was written
    Created,
    /// The path already held this value; nothing was written
    Existing(Value),
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Read the value at `path`; `None` when absent
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Atomically write `value` only if `path` is absent
    async fn create_if_absent(&self, path: &str, value: Value) -> Result<CreateOutcome, StoreError>;

    /// Atomically overwrite `path` only if it still holds `expected`.
    ///
    /// Returns `false`, writing nothing, when the value has changed.
    async fn replace_if_equal(
        &self,
        path: &str,
        expected: &Value,
        value: Value,
    ) -> Result<bool, StoreError>;

    /// Unconditionally overwrite `path`
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Remove `path`; removing an absent path is not an error
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}

/// Storage path of a patient's wallet record
pub fn patient_path(patient_id: &str) -> String {
    format!("patients/{}", patient_id)
}

/// Storage path of an idempotency marker
pub fn mint_marker_path(patient_id: &str, key: &str) -> String {
    format!("mints/{}/{}", patient_id, key)
}

/// Storage path of a sealed wallet key
pub fn vault_path(address_lower_hex: &str) -> String {
    format!("vault/{}", address_lower_hex)
}
