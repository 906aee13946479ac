//! Owner Signing
//!
//! [`Signer`] produces raw 65-byte ECDSA signatures over a transaction hash;
//! the codec later normalizes `v` for the vault contract. [`WalletSigner`]
//! is the local-key adapter.

use crate::error::{VaultError, VaultResult};
use crate::signature::{SigningMethod, SIGNATURE_LENGTH};
use async_trait::async_trait;
use ethers_core::types::{Address, H256};
use ethers_signers::{LocalWallet, Signer as _};
use zeroize::Zeroizing;

/// Source of owner signatures
#[async_trait]
pub trait Signer: Send + Sync {
    fn address(&self) -> Address;

    /// How `sign_digest` treats the digest; drives `v` normalization
    fn method(&self) -> SigningMethod {
        SigningMethod::Detect
    }

    /// Sign a 32-byte transaction hash, returning `r || s || v`
    async fn sign_digest(&self, digest: H256) -> VaultResult<[u8; SIGNATURE_LENGTH]>;
}

/// Local private-key signer
///
/// With `prefixed` set, digests are signed under the `personal_sign`
/// envelope the way browser wallets do; otherwise the raw digest is signed.
#[derive(Debug, Clone)]
pub struct WalletSigner {
    wallet: LocalWallet,
    prefixed: bool,
}

impl WalletSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self {
            wallet,
            prefixed: false,
        }
    }

    /// Create from a hex private key (with or without 0x)
    pub fn from_private_key(private_key_hex: &str) -> VaultResult<Self> {
        let key = Zeroizing::new(
            private_key_hex
                .trim()
                .trim_start_matches("0x")
                .to_string(),
        );
        if key.len() != 64 {
            return Err(VaultError::invalid_input("Private key must be 32 bytes"));
        }
        let bytes = Zeroizing::new(hex::decode(key.as_str())?);
        let wallet = LocalWallet::from_bytes(&bytes)?;
        Ok(Self::new(wallet))
    }

    /// Sign under the `personal_sign` envelope instead of the raw digest
    pub fn prefixed(mut self) -> Self {
        self.prefixed = true;
        self
    }

    pub fn wallet(&self) -> &LocalWallet {
        &self.wallet
    }
}

#[async_trait]
impl Signer for WalletSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn method(&self) -> SigningMethod {
        if self.prefixed {
            SigningMethod::EthSign
        } else {
            SigningMethod::Digest
        }
    }

    async fn sign_digest(&self, digest: H256) -> VaultResult<[u8; SIGNATURE_LENGTH]> {
        let signature = if self.prefixed {
            self.wallet.sign_message(digest.as_bytes()).await?
        } else {
            self.wallet.sign_hash(digest)?
        };

        let raw = signature.to_vec();
        if raw.len() != SIGNATURE_LENGTH {
            return Err(VaultError::signing_failed(format!(
                "Unexpected signature length {}",
                raw.len()
            )));
        }
        let mut out = [0u8; SIGNATURE_LENGTH];
        out.copy_from_slice(&raw);
        Ok(out)
    }
}
