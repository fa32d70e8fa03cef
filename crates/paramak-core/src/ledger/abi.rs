//! Minimal Solidity ABI encoding for the record contract's four calls.

use crate::error::LedgerError;
use crate::types::{Address, TokenId};
use crate::wallet::keccak256;

pub const BALANCE_OF: &str = "balanceOf(address)";
pub const TOKEN_OF_OWNER_BY_INDEX: &str = "tokenOfOwnerByIndex(address,uint256)";
pub const TOKEN_URI: &str = "tokenURI(uint256)";
pub const SAFE_MINT: &str = "safeMint(address,string)";

/// ERC-721 `Transfer(address,address,uint256)` event signature
pub const TRANSFER_EVENT: &str = "Transfer(address,address,uint256)";

const WORD: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(u128),
    String(String),
}

/// First four bytes of the Keccak-256 of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Encode `selector || head || tail` for a call
pub fn encode_call(signature: &str, args: &[AbiValue]) -> Vec<u8> {
    let mut head = Vec::with_capacity(args.len() * WORD);
    let mut tail = Vec::new();
    let head_len = args.len() * WORD;

    for arg in args {
        match arg {
            AbiValue::Address(a) => head.extend_from_slice(&address_word(a)),
            AbiValue::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            AbiValue::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                tail.extend_from_slice(&uint_word(s.len() as u128));
                tail.extend_from_slice(s.as_bytes());
                let padding = (WORD - s.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector(signature));
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], LedgerError> {
    offset
        .checked_add(WORD)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| LedgerError::Decode(format!("return data too short for word at {}", offset)))
}

/// Decode a 32-byte word as an unsigned integer that must fit in `u128`
pub fn decode_uint_word(word: &[u8]) -> Result<u128, LedgerError> {
    if word.len() != WORD {
        return Err(LedgerError::Decode(format!("expected 32-byte word, got {}", word.len())));
    }
    if word[..16].iter().any(|b| *b != 0) {
        return Err(LedgerError::Decode("uint256 value exceeds 128 bits".to_string()));
    }
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&word[16..]);
    Ok(u128::from_be_bytes(bytes))
}

/// Decode a single `uint256` return value
pub fn decode_uint(data: &[u8]) -> Result<u128, LedgerError> {
    decode_uint_word(word_at(data, 0)?)
}

/// Decode a `uint256` return value as a token id
pub fn decode_token_id(data: &[u8]) -> Result<TokenId, LedgerError> {
    decode_uint(data).map(TokenId)
}

/// Decode a single `string` return value
pub fn decode_string(data: &[u8]) -> Result<String, LedgerError> {
    let offset = usize::try_from(decode_uint(data)?)
        .map_err(|_| LedgerError::Decode("string offset overflow".to_string()))?;
    let len = usize::try_from(decode_uint_word(word_at(data, offset)?)?)
        .map_err(|_| LedgerError::Decode("string length overflow".to_string()))?;
    let start = offset + WORD;
    let bytes = start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| LedgerError::Decode("string data truncated".to_string()))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LedgerError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_well_known_selectors() {
        assert_eq!(hex::encode(selector(BALANCE_OF)), "70a08231");
        assert_eq!(hex::encode(selector(TOKEN_OF_OWNER_BY_INDEX)), "2f745c59");
        assert_eq!(hex::encode(selector(TOKEN_URI)), "c87b56dd");
        assert_eq!(hex::encode(selector(SAFE_MINT)), "d204c45e");
        assert_eq!(
            hex::encode(keccak256(TRANSFER_EVENT.as_bytes())),
            "ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_encode_balance_of() {
        let owner: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let data = encode_call(BALANCE_OF, &[AbiValue::Address(owner)]);
        assert_eq!(
            hex::encode(data),
            "70a08231\
             0000000000000000000000005aaeb6053f3e94c9b9a09f33669435e7ef1beaed"
        );
    }

    #[test]
    fn test_encode_safe_mint_layout() {
        let to: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        let data = encode_call(
            SAFE_MINT,
            &[AbiValue::Address(to), AbiValue::String("{\"a\":1}".to_string())],
        );
        // selector + address + offset + length + one padded data word
        assert_eq!(data.len(), 4 + 4 * 32);
        assert_eq!(decode_uint(&data[4 + 32..]).unwrap(), 0x40);
        assert_eq!(decode_uint(&data[4 + 64..]).unwrap(), 7);
        assert_eq!(&data[4 + 96..4 + 103], b"{\"a\":1}");
        assert!(data[4 + 103..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_string_rejects_truncation() {
        let mut data = uint_word(0x20).to_vec();
        data.extend_from_slice(&uint_word(10));
        data.extend_from_slice(b"short");
        assert!(decode_string(&data).is_err());
    }

    #[test]
    fn test_decode_uint_rejects_wide_values() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(decode_uint(&word).is_err());
    }

    proptest! {
        // A returned string is laid out exactly like the tail of an encoded call
        #[test]
        fn prop_string_return_decodes(s in "\\PC{0,200}") {
            let call = encode_call(TOKEN_URI, &[AbiValue::String(s.clone())]);
            prop_assert_eq!(decode_string(&call[4..]).unwrap(), s);
        }

        #[test]
        fn prop_uint_word_roundtrip(v in any::<u128>()) {
            prop_assert_eq!(decode_uint(&uint_word(v)).unwrap(), v);
        }
    }
}
