//! Record contract over Ethereum JSON-RPC.
//!
//! Reads go through `eth_call`. Mints are EIP-155 legacy transactions
//! signed locally with the administrative key; nonce assignment and
//! submission are serialized so concurrent mints never reuse a nonce.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::abi::{self, AbiValue};
use super::tx::LegacyTransaction;
use super::RecordLedger;
use crate::error::LedgerError;
use crate::types::{Address, MintReceipt, TokenId};
use crate::wallet::{keccak256, WalletSecret};

/// Headroom over `eth_estimateGas`, as a ratio
const GAS_LIMIT_NUMERATOR: u64 = 6;
const GAS_LIMIT_DENOMINATOR: u64 = 5;

#[derive(Debug, Clone)]
pub struct EvmLedgerConfig {
    pub rpc_url: String,
    /// Record contract address
    pub contract: Address,
    /// Administrative key that signs `safeMint`
    pub admin: WalletSecret,
    pub request_timeout: Duration,
    /// How long to wait for a mint receipt
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
}

pub struct EvmRpcLedger {
    http: reqwest::Client,
    rpc_url: String,
    contract: Address,
    admin: WalletSecret,
    admin_address: Address,
    chain_id: OnceCell<u64>,
    /// Held from nonce lookup through submission
    submit_lock: Mutex<()>,
    next_request_id: AtomicU64,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for EvmRpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmRpcLedger")
            .field("rpc_url", &self.rpc_url)
            .field("contract", &self.contract)
            .field("admin_address", &self.admin_address)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TransactionReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    logs: Vec<ReceiptLog>,
}

#[derive(Debug, Deserialize)]
struct ReceiptLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
}

impl EvmRpcLedger {
    pub fn new(config: EvmLedgerConfig) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            rpc_url: config.rpc_url,
            contract: config.contract,
            admin_address: config.admin.address(),
            admin: config.admin,
            chain_id: OnceCell::new(),
            submit_lock: Mutex::new(()),
            next_request_id: AtomicU64::new(1),
            confirmation_timeout: config.confirmation_timeout,
            poll_interval: config.poll_interval,
        })
    }

    /// Address of the administrative signer
    pub fn admin_address(&self) -> Address {
        self.admin_address
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, LedgerError> {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LedgerError::Transport(format!("{} from rpc node", status)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(format!("{}: {}", method, e)))?;
        if let Some(error) = body.error {
            return Err(LedgerError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(body.result.unwrap_or(Value::Null))
            .map_err(|e| LedgerError::Decode(format!("{}: {}", method, e)))
    }

    async fn call(&self, data: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let result: String = self
            .rpc(
                "eth_call",
                json!([
                    { "to": self.contract.to_lower_hex(), "data": to_hex_data(&data) },
                    "latest"
                ]),
            )
            .await?;
        parse_hex_data(&result)
    }

    async fn quantity(&self, method: &str, params: Value) -> Result<u128, LedgerError> {
        let raw: String = self.rpc(method, params).await?;
        parse_quantity(&raw)
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        self.chain_id
            .get_or_try_init(|| async {
                let id = self.quantity("eth_chainId", json!([])).await?;
                u64::try_from(id).map_err(|_| LedgerError::Decode(format!("chain id {} out of range", id)))
            })
            .await
            .copied()
    }

    /// Build, sign and submit a mint; returns the transaction hash
    async fn submit(&self, data: Vec<u8>) -> Result<String, LedgerError> {
        let chain_id = self.chain_id().await?;
        let from = self.admin_address.to_lower_hex();
        let to = self.contract.to_lower_hex();

        let _guard = self.submit_lock.lock().await;
        let nonce = self
            .quantity("eth_getTransactionCount", json!([from, "pending"]))
            .await?;
        let gas_price = self.quantity("eth_gasPrice", json!([])).await?;
        let estimate = self
            .quantity(
                "eth_estimateGas",
                json!([{ "from": from, "to": to, "data": to_hex_data(&data) }]),
            )
            .await?;

        let estimate = u64::try_from(estimate)
            .map_err(|_| LedgerError::Decode(format!("gas estimate {} out of range", estimate)))?;
        let nonce = u64::try_from(nonce)
            .map_err(|_| LedgerError::Decode(format!("nonce {} out of range", nonce)))?;

        let transaction = LegacyTransaction {
            nonce,
            gas_price,
            gas_limit: estimate.saturating_mul(GAS_LIMIT_NUMERATOR) / GAS_LIMIT_DENOMINATOR,
            to: self.contract,
            value: 0,
            data,
            chain_id,
        };
        let raw = transaction.sign(self.admin.signing_key())?;
        let local_hash = to_hex_data(&keccak256(&raw));

        let tx_hash: String = self
            .rpc("eth_sendRawTransaction", json!([to_hex_data(&raw)]))
            .await?;
        if !tx_hash.eq_ignore_ascii_case(&local_hash) {
            warn!(%tx_hash, %local_hash, "node reported a different transaction hash");
        }
        info!(%tx_hash, nonce, gas_price = %gas_price, "mint transaction submitted");
        Ok(tx_hash)
    }

    /// One `eth_getTransactionReceipt` lookup
    async fn receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>, LedgerError> {
        let Some(receipt) = self
            .rpc::<Option<TransactionReceipt>>("eth_getTransactionReceipt", json!([tx_hash]))
            .await?
        else {
            return Ok(None);
        };
        if receipt.status.as_deref().map(parse_quantity).transpose()? == Some(0) {
            return Err(LedgerError::Reverted {
                tx_hash: tx_hash.to_string(),
            });
        }
        Ok(Some(MintReceipt {
            transaction_hash: tx_hash.to_string(),
            token_id: minted_token_id(&receipt.logs, &self.contract),
        }))
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<MintReceipt, LedgerError> {
        let started = Instant::now();
        loop {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) => {
                    info!(%tx_hash, token_id = ?receipt.token_id, "mint transaction confirmed");
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(LedgerError::Transport(message)) => {
                    debug!(%tx_hash, %message, "receipt poll failed, retrying");
                }
                Err(other) => return Err(other),
            }

            if started.elapsed() >= self.confirmation_timeout {
                return Err(LedgerError::Unconfirmed {
                    tx_hash: tx_hash.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl RecordLedger for EvmRpcLedger {
    async fn balance_of(&self, owner: &Address) -> Result<u64, LedgerError> {
        let data = abi::encode_call(abi::BALANCE_OF, &[AbiValue::Address(*owner)]);
        let balance = abi::decode_uint(&self.call(data).await?)?;
        u64::try_from(balance).map_err(|_| LedgerError::Decode(format!("balance {} out of range", balance)))
    }

    async fn token_of_owner_by_index(
        &self,
        owner: &Address,
        index: u64,
    ) -> Result<TokenId, LedgerError> {
        let data = abi::encode_call(
            abi::TOKEN_OF_OWNER_BY_INDEX,
            &[AbiValue::Address(*owner), AbiValue::Uint(index as u128)],
        );
        abi::decode_token_id(&self.call(data).await?)
    }

    async fn token_uri(&self, token_id: TokenId) -> Result<String, LedgerError> {
        let data = abi::encode_call(abi::TOKEN_URI, &[AbiValue::Uint(token_id.0)]);
        abi::decode_string(&self.call(data).await?)
    }

    async fn submit_mint(&self, to: &Address, uri: &str) -> Result<String, LedgerError> {
        let data = abi::encode_call(
            abi::SAFE_MINT,
            &[AbiValue::Address(*to), AbiValue::String(uri.to_string())],
        );
        self.submit(data).await
    }

    async fn mint_receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>, LedgerError> {
        self.receipt(tx_hash).await
    }

    async fn confirm_mint(&self, tx_hash: &str) -> Result<MintReceipt, LedgerError> {
        self.wait_for_receipt(tx_hash).await
    }
}

fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_hex_data(value: &str) -> Result<Vec<u8>, LedgerError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(digits).map_err(|e| LedgerError::Decode(format!("bad hex data: {}", e)))
}

/// Parse a JSON-RPC quantity (`0x`-prefixed, no leading zeros required)
fn parse_quantity(value: &str) -> Result<u128, LedgerError> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| LedgerError::Decode(format!("quantity {:?} lacks 0x prefix", value)))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| LedgerError::Decode(format!("bad quantity {:?}: {}", value, e)))
}

/// Token id from the contract's `Transfer(0x0, to, id)` log, if present
fn minted_token_id(logs: &[ReceiptLog], contract: &Address) -> Option<TokenId> {
    let transfer_topic = to_hex_data(&keccak256(abi::TRANSFER_EVENT.as_bytes()));
    logs.iter()
        .filter(|log| {
            log.address
                .parse::<Address>()
                .map(|a| a == *contract)
                .unwrap_or(false)
        })
        .filter(|log| log.topics.len() == 4 && log.topics[0].eq_ignore_ascii_case(&transfer_topic))
        .find_map(|log| {
            let word = parse_hex_data(&log.topics[3]).ok()?;
            abi::decode_uint_word(&word).ok().map(TokenId)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x539").unwrap(), 1337);
        assert!(parse_quantity("539").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_minted_token_id_from_transfer_log() {
        let contract = Address::new([0x11; 20]);
        let transfer = to_hex_data(&keccak256(abi::TRANSFER_EVENT.as_bytes()));
        let zero = format!("0x{}", "00".repeat(32));
        let logs = vec![
            ReceiptLog {
                address: to_hex_data(&[0x22; 20]),
                topics: vec![transfer.clone(), zero.clone(), zero.clone(), format!("0x{:064x}", 9)],
            },
            ReceiptLog {
                address: contract.to_checksum(),
                topics: vec![transfer, zero.clone(), zero, format!("0x{:064x}", 42)],
            },
        ];
        assert_eq!(minted_token_id(&logs, &contract), Some(TokenId(42)));
        assert_eq!(minted_token_id(&logs[..1], &contract), None);
    }
}
