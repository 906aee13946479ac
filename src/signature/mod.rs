//! Owner Signatures
//!
//! Encoding, validation and v-normalization of the 65-byte owner
//! signatures the vault contract verifies.
//!
//! Two shapes exist on the wire, both exactly 65 bytes:
//! - ECDSA: `r (32) || s (32) || v (1)` with v in {27, 28} for a signature
//!   over the raw transaction hash and {31, 32} when the signer applied the
//!   `personal_sign` message prefix
//! - Pre-validated: `0^12 || owner (20) || 0^32 || 0x01`, meaning the
//!   owner's approval is already recorded on-chain or implied by the
//!   owner submitting the execution

pub mod codec;
pub mod recover;

pub use codec::*;
pub use recover::*;

use crate::error::{ErrorCode, VaultError};

/// Errors raised while handling a single signature
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Invalid signature length: expected 65 bytes, got {0}")]
    InvalidLength(usize),

    #[error("Invalid signature v value: {0}")]
    InvalidV(u8),

    #[error("Invalid signature hex: {0}")]
    InvalidHex(String),

    #[error("Signature recovery failed: {0}")]
    RecoveryFailed(String),
}

impl From<SignatureError> for VaultError {
    fn from(e: SignatureError) -> Self {
        VaultError::new(ErrorCode::InvalidSignature, e.to_string())
    }
}
