//! Custodial wallet key generation and address derivation.

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use sha3::{Digest, Keccak256};

use crate::types::Address;

/// Keccak-256 as used by Ethereum (not NIST SHA3-256)
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[derive(Debug, thiserror::Error)]
pub enum WalletKeyError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}

/// secp256k1 private key of a custodial wallet
#[derive(Clone, PartialEq, Eq)]
pub struct WalletSecret(SigningKey);

impl std::fmt::Debug for WalletSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WalletSecret(<redacted>)")
    }
}

impl WalletSecret {
    /// Rejects anything other than a valid non-zero scalar
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WalletKeyError> {
        if bytes.len() != 32 {
            return Err(WalletKeyError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        SigningKey::from_slice(bytes)
            .map(WalletSecret)
            .map_err(|e| WalletKeyError::InvalidKey(e.to_string()))
    }

    /// Parse `0x`-prefixed or bare hex
    pub fn from_hex(value: &str) -> Result<Self, WalletKeyError> {
        let trimmed = value.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|e| WalletKeyError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.0
    }

    pub fn address(&self) -> Address {
        address_of(&self.0)
    }
}

/// Derive the account address of a signing key
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().as_affine().to_encoded_point(false);
    // Skip the 0x04 SEC1 tag; the address is the last 20 bytes of the hash
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::new(bytes)
}

/// A freshly generated custodial wallet
#[derive(Debug, Clone)]
pub struct GeneratedWallet {
    pub address: Address,
    pub secret: WalletSecret,
}

impl GeneratedWallet {
    /// Generate a key pair from the operating system CSPRNG
    pub fn generate() -> Self {
        let key = SigningKey::random(&mut OsRng);
        GeneratedWallet {
            address: address_of(&key),
            secret: WalletSecret(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty_input() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_known_private_key_address() {
        let secret = WalletSecret::from_hex(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            secret.address().to_checksum(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[test]
    fn test_generated_wallets_are_distinct_and_consistent() {
        let a = GeneratedWallet::generate();
        let b = GeneratedWallet::generate();
        assert_ne!(a.address, b.address);
        assert_eq!(a.secret.address(), a.address);
    }

    #[test]
    fn test_invalid_secrets_rejected() {
        assert!(WalletSecret::from_hex("0x1234").is_err());
        assert!(WalletSecret::from_bytes(&[0u8; 32]).is_err());
        assert_eq!(
            format!("{:?}", GeneratedWallet::generate().secret),
            "WalletSecret(<redacted>)"
        );
    }
}
