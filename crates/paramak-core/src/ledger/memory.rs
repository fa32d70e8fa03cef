use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

use super::RecordLedger;
use crate::error::LedgerError;
use crate::types::{Address, MintReceipt, TokenId};
use crate::wallet::keccak256;

#[derive(Debug, Default)]
struct Tokens {
    /// Indexed by token id
    uris: Vec<String>,
    by_owner: HashMap<Address, Vec<TokenId>>,
    /// Mined transactions; `None` marks a revert
    receipts: HashMap<String, Option<TokenId>>,
    submitted: u64,
}

/// In-process contract with sequential token ids starting at 0.
///
/// Submitted mints are mined immediately.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    tokens: RwLock<Tokens>,
    fail_mints: AtomicBool,
    latency: Option<Duration>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, for exercising timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make subsequent mints revert
    pub fn fail_mints(&self, fail: bool) {
        self.fail_mints.store(fail, Ordering::SeqCst);
    }

    /// Total tokens minted across all owners
    pub async fn total_supply(&self) -> usize {
        self.tokens.read().await.uris.len()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RecordLedger for MemoryLedger {
    async fn balance_of(&self, owner: &Address) -> Result<u64, LedgerError> {
        self.simulate_latency().await;
        let tokens = self.tokens.read().await;
        Ok(tokens.by_owner.get(owner).map_or(0, |ids| ids.len() as u64))
    }

    async fn token_of_owner_by_index(
        &self,
        owner: &Address,
        index: u64,
    ) -> Result<TokenId, LedgerError> {
        self.simulate_latency().await;
        let tokens = self.tokens.read().await;
        tokens
            .by_owner
            .get(owner)
            .and_then(|ids| ids.get(index as usize))
            .copied()
            .ok_or(LedgerError::IndexOutOfRange { index })
    }

    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError> {
        self.simulate_latency().await;
        let tokens = self.tokens.read().await;
        usize::try_from(token_id.0)
            .ok()
            .and_then(|i| tokens.uris.get(i))
            .cloned()
            .ok_or_else(|| LedgerError::Rpc {
                code: 3,
                message: format!("execution reverted: nonexistent token {}", token_id),
            })
    }

    async fn submit_mint(&self, to: &Address, uri: &str) -> Result<String, LedgerError> {
        self.simulate_latency().await;
        let mut tokens = self.tokens.write().await;
        tokens.submitted += 1;

        let mut preimage = to.as_bytes().to_vec();
        preimage.extend_from_slice(&tokens.submitted.to_be_bytes());
        preimage.extend_from_slice(uri.as_bytes());
        let transaction_hash = format!("0x{}", hex::encode(keccak256(&preimage)));

        if self.fail_mints.load(Ordering::SeqCst) {
            tokens.receipts.insert(transaction_hash.clone(), None);
            return Ok(transaction_hash);
        }

        let token_id = TokenId(tokens.uris.len() as u128);
        tokens.uris.push(uri.to_string());
        tokens.by_owner.entry(*to).or_default().push(token_id);
        tokens
            .receipts
            .insert(transaction_hash.clone(), Some(token_id));
        Ok(transaction_hash)
    }

    async fn mint_receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>, LedgerError> {
        let tokens = self.tokens.read().await;
        match tokens.receipts.get(tx_hash) {
            None => Ok(None),
            Some(None) => Err(LedgerError::Reverted {
                tx_hash: tx_hash.to_string(),
            }),
            Some(Some(token_id)) => Ok(Some(MintReceipt {
                transaction_hash: tx_hash.to_string(),
                token_id: Some(*token_id),
            })),
        }
    }

    async fn confirm_mint(&self, tx_hash: &str) -> Result<MintReceipt, LedgerError> {
        self.simulate_latency().await;
        self.mint_receipt(tx_hash)
            .await?
            .ok_or_else(|| LedgerError::Unconfirmed {
                tx_hash: tx_hash.to_string(),
                waited: Duration::ZERO,
            })
    }
}
