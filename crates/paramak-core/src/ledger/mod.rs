//! Record contract client.
//!
//! Records are ERC-721 tokens whose URI holds the serialized payload. The
//! workflow needs only the enumerable read calls and `safeMint`, which
//! is signed by the administrative key. Submission and confirmation are
//! separate steps so a caller can record the transaction hash before
//! waiting on it.

use async_trait::async_trait;

use crate::error::LedgerError;
use crate::types::{Address, MintReceipt, TokenId};

pub mod abi;
mod evm;
mod memory;
pub mod tx;

pub use evm::{EvmLedgerConfig, EvmRpcLedger};
pub use memory::MemoryLedger;

#[async_trait]
pub trait RecordLedger: Send + Sync {
    /// Number of tokens held by `owner`
    async fn balance_of(&self, owner: &Address) -> Result<u64, LedgerError>;

    /// Token id at position `index` of `owner`'s enumeration
    async fn token_of_owner_by_index(
        &self,
        owner: &Address,
        index: u64,
    ) -> Result<TokenId, LedgerError>;

    /// Stored content of a token
    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError>;

    /// Sign and broadcast `safeMint(to, uri)`; returns the transaction hash
    async fn submit_mint(&self, to: &Address, uri: &str) -> Result<String, LedgerError>;

    /// Receipt of a submitted mint, `None` while it is not yet mined.
    ///
    /// A mined transaction that reverted is `Err(Reverted)`.
    async fn mint_receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>, LedgerError>;

    /// Wait for a submitted mint to be mined
    async fn confirm_mint(&self, tx_hash: &str) -> Result<MintReceipt, LedgerError>;

    /// Mint a new token to `to` and wait for confirmation
    async fn safe_mint(&self, to: &Address, uri: &str) -> Result<MintReceipt, LedgerError> {
        let tx_hash = self.submit_mint(to, uri).await?;
        self.confirm_mint(&tx_hash).await
    }
}
