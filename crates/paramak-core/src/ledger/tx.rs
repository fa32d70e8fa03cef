//! RLP encoding and EIP-155 signing of legacy transactions.

use k256::ecdsa::{RecoveryId, SigningKey};

use crate::error::LedgerError;
use crate::types::Address;
use crate::wallet::keccak256;

/// Big-endian bytes with leading zeros removed (RLP scalar form)
fn trim_be(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn rlp_length_prefix(len: usize, short_base: u8, long_base: u8) -> Vec<u8> {
    if len <= 55 {
        vec![short_base + len as u8]
    } else {
        let len_bytes = len.to_be_bytes();
        let trimmed = trim_be(&len_bytes);
        let mut out = Vec::with_capacity(1 + trimmed.len());
        out.push(long_base + trimmed.len() as u8);
        out.extend_from_slice(trimmed);
        out
    }
}

/// RLP-encode a byte string
pub fn rlp_bytes(bytes: &[u8]) -> Vec<u8> {
    if bytes.len() == 1 && bytes[0] < 0x80 {
        return bytes.to_vec();
    }
    let mut out = rlp_length_prefix(bytes.len(), 0x80, 0xb7);
    out.extend_from_slice(bytes);
    out
}

/// RLP-encode an unsigned integer (zero is the empty string)
pub fn rlp_uint(value: u128) -> Vec<u8> {
    rlp_bytes(trim_be(&value.to_be_bytes()))
}

/// RLP-encode a list of already-encoded items
pub fn rlp_list(items: &[Vec<u8>]) -> Vec<u8> {
    let payload_len: usize = items.iter().map(Vec::len).sum();
    let mut out = rlp_length_prefix(payload_len, 0xc0, 0xf7);
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// Pre-EIP-1559 transaction, signed with EIP-155 replay protection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: Address,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn base_fields(&self) -> Vec<Vec<u8>> {
        vec![
            rlp_uint(self.nonce as u128),
            rlp_uint(self.gas_price),
            rlp_uint(self.gas_limit as u128),
            rlp_bytes(self.to.as_bytes()),
            rlp_uint(self.value),
            rlp_bytes(&self.data),
        ]
    }

    /// Hash that gets signed: `keccak(rlp([..fields, chainId, 0, 0]))`
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut fields = self.base_fields();
        fields.push(rlp_uint(self.chain_id as u128));
        fields.push(rlp_uint(0));
        fields.push(rlp_uint(0));
        keccak256(&rlp_list(&fields))
    }

    /// Sign and return the raw transaction bytes for `eth_sendRawTransaction`
    pub fn sign(&self, key: &SigningKey) -> Result<Vec<u8>, LedgerError> {
        let hash = self.signing_hash();
        let (mut signature, mut recovery_id) = key
            .sign_prehash_recoverable(&hash)
            .map_err(|e| LedgerError::Signing(e.to_string()))?;

        // Nodes reject high-s signatures
        if let Some(normalized) = signature.normalize_s() {
            signature = normalized;
            recovery_id = RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced());
        }

        let v = recovery_id.to_byte() as u128 + 35 + 2 * self.chain_id as u128;
        let rs = signature.to_bytes();

        let mut fields = self.base_fields();
        fields.push(rlp_uint(v));
        fields.push(rlp_bytes(trim_be(&rs[..32])));
        fields.push(rlp_bytes(trim_be(&rs[32..])));
        Ok(rlp_list(&fields))
    }
}
