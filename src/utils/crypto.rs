//! Hashing and address helpers
//!
//! Keccak-256 primitives shared by the hash engine and the signature codec.

use ethers_core::types::{Address, H256};
use secp256k1::PublicKey;
use tiny_keccak::{Hasher, Keccak};

/// Prefix applied by `eth_sign`/`personal_sign` to a 32-byte payload
const ETH_SIGNED_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Keccak256 hash
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Hash of the `personal_sign` envelope around a 32-byte digest
pub fn eth_signed_message_hash(digest: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(ETH_SIGNED_MESSAGE_PREFIX);
    hasher.update(digest);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

/// Convert a secp256k1 public key to its ledger address
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    // Uncompressed key is 0x04 || X || Y; the address hashes X || Y
    let pubkey_bytes = public_key.serialize_uncompressed();
    let hash = keccak256(&pubkey_bytes[1..]);
    Address::from_slice(&hash[12..32])
}

/// Convert raw address bytes to an EIP-55 checksummed address
pub fn to_checksum_address(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = keccak256(lower.as_bytes());

    let mut result = String::from("0x");
    for (i, ch) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };

        if ch.is_ascii_digit() {
            result.push(ch);
        } else if nibble >= 8 {
            result.push(ch.to_ascii_uppercase());
        } else {
            result.push(ch);
        }
    }

    result
}

/// Lowercase `0x`-prefixed hex of a 32-byte hash
pub fn hash_hex(hash: &H256) -> String {
    format!("0x{}", hex::encode(hash.as_bytes()))
}

/// Parse an address from hex, accepting any letter case
pub fn parse_address(input: &str) -> Option<Address> {
    let trimmed = input.trim();
    let stripped = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if stripped.len() != 40 {
        return None;
    }
    let bytes = hex::decode(stripped).ok()?;
    Some(Address::from_slice(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_checksum_address() {
        let addr = parse_address("0xcd2a3d9f938e13cd947ec05abc7fe734df8dd826").unwrap();
        assert_eq!(
            to_checksum_address(&addr),
            "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"
        );
    }

    #[test]
    fn test_parse_address_is_case_insensitive() {
        let lower = parse_address("0xd8da6bf26964af9d7eed9e03e53415d37aa96045").unwrap();
        let mixed = parse_address("0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045").unwrap();
        assert_eq!(lower, mixed);
        assert!(parse_address("0x1234").is_none());
        assert!(parse_address("not an address").is_none());
    }

    #[test]
    fn test_eth_signed_message_hash_differs_from_digest() {
        let digest = keccak256(b"payload");
        assert_ne!(eth_signed_message_hash(&digest), digest);
    }
}
