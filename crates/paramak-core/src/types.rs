//! Data model for patient wallets and minted records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::str::FromStr;

use crate::wallet::keccak256;

/// A 20-byte EVM account address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; 20]);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("address must be 40 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("address contains non-hex characters")]
    InvalidHex,
}

impl Address {
    pub const fn new(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x`-prefixed hex, used for storage keys and RPC params
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 mixed-case checksum encoding
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                hash[i / 2] >> 4
            } else {
                hash[i / 2] & 0x0f
            };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != 40 {
            return Err(AddressParseError::InvalidLength(digits.len()));
        }
        let bytes = hex::decode(digits).map_err(|_| AddressParseError::InvalidHex)?;
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_checksum())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Token identifier assigned by the record contract.
///
/// Serialized as a decimal string so JavaScript clients keep full precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u128);

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>()
            .map(TokenId)
            .map_err(serde::de::Error::custom)
    }
}

/// Wallet record as persisted under `patients/{patientId}`.
///
/// Records written by earlier deployments may also carry a plaintext
/// `walletPrivateKey`; it is ignored on read.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletRecord {
    pub wallet_address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A patient's custodial wallet. The private key lives in the key vault.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PatientWallet {
    pub patient_id: String,
    pub wallet_address: Address,
    pub created_at: Option<DateTime<Utc>>,
}

impl PatientWallet {
    pub fn from_record(patient_id: &str, record: WalletRecord) -> Self {
        Self {
            patient_id: patient_id.to_string(),
            wallet_address: record.wallet_address,
            created_at: record.created_at,
        }
    }

    pub fn to_record(&self) -> WalletRecord {
        WalletRecord {
            wallet_address: self.wallet_address,
            created_at: self.created_at,
        }
    }
}

/// Outcome of wallet resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedWallet {
    pub wallet: PatientWallet,
    /// True only for the caller whose create-if-absent won
    pub created: bool,
}

/// One minted record, read back from the contract
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordEntry {
    pub index: u64,
    pub token_id: TokenId,
    pub owner: Address,
    pub payload: Value,
}

/// Confirmation data for a mint transaction
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MintReceipt {
    pub transaction_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_id: Option<TokenId>,
}

/// Input to the record minter
#[derive(Clone, Debug, Default)]
pub struct MintRequest {
    pub patient_id: String,
    /// Caller fields; must be a JSON object, `None`/`null` means empty
    pub payload: Option<Value>,
    pub idempotency_key: Option<String>,
}

/// Result of a mint
#[derive(Clone, Debug, PartialEq)]
pub struct MintResult {
    pub wallet: PatientWallet,
    pub wallet_created: bool,
    pub receipt: MintReceipt,
    /// The stamped payload that was minted
    pub record: Value,
    /// True when an idempotency key matched an earlier completed mint
    pub duplicate: bool,
}

/// State of an idempotency marker under `mints/{patientId}/{key}`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarkerState {
    Pending,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdempotencyMarker {
    pub state: MarkerState,
    pub created_at: DateTime<Utc>,
    /// Set once the mint transaction has been broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<MintReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_checksum_known_vectors() {
        // EIP-55 reference vectors
        for expected in [
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
            "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
            "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
        ] {
            let address: Address = expected.to_lowercase().parse().unwrap();
            assert_eq!(address.to_checksum(), expected);
        }
    }

    #[test]
    fn test_address_parse_errors() {
        assert_eq!(
            "0x1234".parse::<Address>(),
            Err(AddressParseError::InvalidLength(4))
        );
        assert_eq!(
            format!("0x{}", "zz".repeat(20)).parse::<Address>(),
            Err(AddressParseError::InvalidHex)
        );
    }

    #[test]
    fn test_wallet_record_ignores_legacy_private_key() {
        let legacy = serde_json::json!({
            "walletAddress": "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "walletPrivateKey": "0x0123"
        });
        let record: WalletRecord = serde_json::from_value(legacy).unwrap();
        assert_eq!(record.created_at, None);
        assert_eq!(
            record.wallet_address.to_checksum(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
        let written = serde_json::to_value(&record).unwrap();
        assert!(written.get("walletPrivateKey").is_none());
    }

    #[test]
    fn test_token_id_serializes_as_string() {
        let receipt = MintReceipt {
            transaction_hash: "0xabc".to_string(),
            token_id: Some(TokenId(u128::MAX)),
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["tokenId"], u128::MAX.to_string());
        let back: MintReceipt = serde_json::from_value(json).unwrap();
        assert_eq!(back, receipt);
    }
}
