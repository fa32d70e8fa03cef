//! Patient wallet provisioning and on-chain medical records.
//!
//! A patient gets one custodial wallet, created lazily on their first
//! record. Each record is minted as a token owned by that wallet whose
//! content is the caller payload stamped with a server date.
//!
//! # Modules
//!
//! - `store`: key-value storage of wallet records (`WalletStore`)
//! - `ledger`: record contract client (`RecordLedger`)
//! - `vault`: sealed custodial keys (`KeyVault`)
//! - `provisioning`: resolve-or-create, mint and read workflow

pub mod clock;
pub mod error;
pub mod ledger;
pub mod provisioning;
pub mod store;
pub mod types;
pub mod vault;
pub mod wallet;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{
    LedgerError, PermanentKind, ProvisioningError, StoreError, TransientKind, VaultError,
};
pub use ledger::{EvmLedgerConfig, EvmRpcLedger, MemoryLedger, RecordLedger};
pub use provisioning::{decode_token_content, ProvisioningService, ProvisioningSettings, RecordCursor};
pub use store::{CreateOutcome, FirebaseStore, FirebaseStoreConfig, MemoryStore, WalletStore};
pub use types::{
    Address, MintReceipt, MintRequest, MintResult, PatientWallet, RecordEntry, ResolvedWallet,
    TokenId,
};
pub use vault::{KeyVault, SealedKeyVault};
pub use wallet::{GeneratedWallet, WalletSecret};
