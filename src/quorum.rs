//! Quorum Engine
//!
//! Collects at most one signature per owner and decides when the vault's
//! threshold is met.

use crate::error::{VaultError, VaultResult};
use crate::ledger::Ledger;
use crate::log_debug;
use crate::signature::OwnerSignature;
use ethers_core::types::{Address, Bytes, H256};
use std::collections::BTreeMap;

/// Owner signatures for one transaction hash
///
/// Keys are parsed addresses, so two spellings of the same owner (checksum
/// vs lowercase) always land on the same entry. Iteration order is
/// ascending numeric address, which is the order the contract requires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSet {
    signatures: BTreeMap<Address, OwnerSignature>,
}

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the signature for its owner
    ///
    /// Returns the signature it replaced, if any.
    pub fn add_signature(&mut self, signature: OwnerSignature) -> Option<OwnerSignature> {
        self.signatures.insert(signature.owner(), signature)
    }

    /// Insert only if the owner has no signature yet; returns whether it was added
    pub fn insert_if_absent(&mut self, signature: OwnerSignature) -> bool {
        if self.signatures.contains_key(&signature.owner()) {
            return false;
        }
        self.signatures.insert(signature.owner(), signature);
        true
    }

    /// Add every signature from `other` that this set does not have yet
    pub fn merge(&mut self, other: &SignatureSet) {
        for signature in other.iter() {
            self.insert_if_absent(signature.clone());
        }
    }

    pub fn get(&self, owner: &Address) -> Option<&OwnerSignature> {
        self.signatures.get(owner)
    }

    pub fn contains(&self, owner: &Address) -> bool {
        self.signatures.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    /// Signatures in ascending owner order
    pub fn iter(&self) -> impl Iterator<Item = &OwnerSignature> {
        self.signatures.values()
    }

    pub fn owners(&self) -> Vec<Address> {
        self.signatures.keys().copied().collect()
    }

    /// Concatenated 65-byte signatures, sorted by ascending owner address
    pub fn encoded(&self) -> Bytes {
        let mut blob = Vec::with_capacity(self.signatures.len() * 65);
        for signature in self.signatures.values() {
            blob.extend_from_slice(signature.bytes());
        }
        Bytes::from(blob)
    }

    /// Reject signatures attributed to addresses outside `owners`
    pub fn ensure_owners(&self, owners: &[Address]) -> VaultResult<()> {
        match self.signatures.keys().find(|a| !owners.contains(a)) {
            Some(stranger) => Err(VaultError::not_an_owner(format!("{:?}", stranger))),
            None => Ok(()),
        }
    }
}

impl FromIterator<OwnerSignature> for SignatureSet {
    fn from_iter<I: IntoIterator<Item = OwnerSignature>>(iter: I) -> Self {
        let mut set = SignatureSet::new();
        for signature in iter {
            set.add_signature(signature);
        }
        set
    }
}

/// Quorum holds iff the number of distinct owners who signed reaches the threshold
pub fn is_satisfied(set: &SignatureSet, threshold: usize) -> bool {
    set.len() >= threshold
}

/// Fail with `InsufficientSignatures` unless the quorum holds
pub fn ensure_quorum(set: &SignatureSet, threshold: usize) -> VaultResult<()> {
    if is_satisfied(set, threshold) {
        Ok(())
    } else {
        Err(VaultError::insufficient_signatures(threshold - set.len()))
    }
}

/// Owners that recorded an on-chain approval of `tx_hash`
///
/// Queries run one owner at a time, in the order given.
pub async fn owners_who_pre_approved<L: Ledger + ?Sized>(
    ledger: &L,
    vault: Address,
    owners: &[Address],
    tx_hash: H256,
) -> VaultResult<Vec<Address>> {
    let mut approved = Vec::new();
    for owner in owners {
        if ledger.is_hash_approved(vault, *owner, tx_hash).await? {
            approved.push(*owner);
        }
    }

    log_debug!(
        "quorum",
        "checked on-chain approvals",
        safe_tx_hash = format!("{:?}", tx_hash),
        approvals = approved.len(),
    );

    Ok(approved)
}
