//! Custodial key vault.
//!
//! Private keys never sit next to the wallet record. They are sealed with
//! XChaCha20-Poly1305 under a master key supplied out of band and stored
//! at `vault/{address}`, with the address bound in as associated data so
//! an entry copied to another address fails to open.

use async_trait::async_trait;
use paramak_shared::{open_secret, seal_secret, SealedSecret, SealingKey};
use std::sync::Arc;

use crate::error::VaultError;
use crate::store::{vault_path, CreateOutcome, WalletStore};
use crate::types::Address;
use crate::wallet::WalletSecret;

#[async_trait]
pub trait KeyVault: Send + Sync {
    /// Store the key for a new address; an occupied address is an error
    async fn store(&self, address: &Address, secret: &WalletSecret) -> Result<(), VaultError>;

    /// Fetch the key for an address, `None` if the vault has no entry
    async fn open(&self, address: &Address) -> Result<Option<WalletSecret>, VaultError>;

    /// Drop the key for an address that lost a creation race
    async fn discard(&self, address: &Address) -> Result<(), VaultError>;
}

pub struct SealedKeyVault {
    store: Arc<dyn WalletStore>,
    key: SealingKey,
}

impl SealedKeyVault {
    pub fn new(store: Arc<dyn WalletStore>, key: SealingKey) -> Self {
        Self { store, key }
    }
}

#[async_trait]
impl KeyVault for SealedKeyVault {
    async fn store(&self, address: &Address, secret: &WalletSecret) -> Result<(), VaultError> {
        let aad = address.to_lower_hex();
        let sealed = seal_secret(&secret.to_bytes(), aad.as_bytes(), &self.key)?;
        let value = serde_json::to_value(&sealed).map_err(|e| VaultError::Corrupt {
            address: aad.clone(),
            message: e.to_string(),
        })?;

        match self.store.create_if_absent(&vault_path(&aad), value).await? {
            CreateOutcome::Created => Ok(()),
            CreateOutcome::Existing(_) => Err(VaultError::AddressCollision(aad)),
        }
    }

    async fn open(&self, address: &Address) -> Result<Option<WalletSecret>, VaultError> {
        let aad = address.to_lower_hex();
        let Some(value) = self.store.get(&vault_path(&aad)).await? else {
            return Ok(None);
        };

        let corrupt = |message: String| VaultError::Corrupt {
            address: aad.clone(),
            message,
        };
        let sealed: SealedSecret =
            serde_json::from_value(value).map_err(|e| corrupt(e.to_string()))?;
        let bytes = open_secret(&sealed, aad.as_bytes(), &self.key)?;
        let secret = WalletSecret::from_bytes(&bytes).map_err(|e| corrupt(e.to_string()))?;

        if secret.address() != *address {
            return Err(corrupt("key does not derive the stored address".to_string()));
        }
        Ok(Some(secret))
    }

    async fn discard(&self, address: &Address) -> Result<(), VaultError> {
        self.store
            .delete(&vault_path(&address.to_lower_hex()))
            .await?;
        Ok(())
    }
}
