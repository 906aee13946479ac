//! ECDSA recovery
//!
//! Recovers the signing address from `(digest, r, s, v)` the same way the
//! vault contract's `ecrecover` does.

use super::SignatureError;
use crate::utils::crypto::{eth_signed_message_hash, public_key_to_address};
use ethers_core::types::{Address, H256};
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, Secp256k1};

/// Recover the signer of a 65-byte `r || s || v` signature over `digest`
///
/// `v` must already be in ledger convention (27 or 28).
pub fn recover_address(digest: &[u8; 32], signature: &[u8; 65]) -> Result<Address, SignatureError> {
    let v = signature[64];
    if v != 27 && v != 28 {
        return Err(SignatureError::InvalidV(v));
    }

    let secp = Secp256k1::verification_only();

    let recovery_id = RecoveryId::from_i32((v - 27) as i32)
        .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

    let message = Message::from_digest_slice(digest)
        .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

    let public_key = secp
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| SignatureError::RecoveryFailed(e.to_string()))?;

    Ok(public_key_to_address(&public_key))
}

/// Recover the signer of a normalized owner signature over a transaction hash
///
/// v in {31, 32} means the signer hashed the `personal_sign` envelope, so
/// recovery runs over the prefixed hash with v - 4.
pub fn recover_signer(tx_hash: &H256, signature: &[u8; 65]) -> Result<Address, SignatureError> {
    let v = signature[64];
    match v {
        27 | 28 => recover_address(tx_hash.as_fixed_bytes(), signature),
        31 | 32 => {
            let mut adjusted = *signature;
            adjusted[64] = v - 4;
            let prefixed = eth_signed_message_hash(tx_hash.as_fixed_bytes());
            recover_address(&prefixed, &adjusted)
        }
        other => Err(SignatureError::InvalidV(other)),
    }
}
