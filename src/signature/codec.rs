//! Signature encoding and v-normalization

use super::recover::{recover_address, recover_signer};
use super::SignatureError;
use crate::log_debug;
use ethers_core::types::{Address, H256};
use serde::{Deserialize, Serialize};

/// Length of every owner signature on the wire
pub const SIGNATURE_LENGTH: usize = 65;

/// Offset the ledger adds to v for signatures over the prefixed message
const ETH_SIGN_V_OFFSET: u8 = 4;

/// Lowest v in ledger convention
const MIN_VALID_V_VALUE: u8 = 27;

/// Which shape a 65-byte signature has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureKind {
    /// ECDSA over the raw transaction hash (v = 27/28)
    Ecdsa,
    /// ECDSA over the `personal_sign` envelope (v = 31/32)
    EthSign,
    /// Approval recorded on-chain or implied by the submitter
    PreValidated,
}

/// How the external signer produced a raw signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningMethod {
    /// Work out whether the prefix was applied by recovering the signer
    #[default]
    Detect,
    /// Signer is known to sign the raw digest
    Digest,
    /// Signer is known to apply the `personal_sign` prefix
    EthSign,
}

/// A single owner's approval of a transaction hash
///
/// Deserialization runs through [`decode`], so a stored value passes the
/// same length, v and owner checks as one read from the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredSignature")]
pub struct OwnerSignature {
    owner: Address,
    #[serde(with = "crate::serde_helpers::hex65")]
    data: [u8; SIGNATURE_LENGTH],
}

/// Unchecked wire form of [`OwnerSignature`]
#[derive(Deserialize)]
struct StoredSignature {
    owner: Address,
    #[serde(with = "crate::serde_helpers::hex65")]
    data: [u8; SIGNATURE_LENGTH],
}

impl TryFrom<StoredSignature> for OwnerSignature {
    type Error = SignatureError;

    fn try_from(stored: StoredSignature) -> Result<Self, Self::Error> {
        decode(stored.owner, &stored.data)
    }
}

impl OwnerSignature {
    /// Owner this signature is attributed to
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.data
    }

    pub fn v(&self) -> u8 {
        self.data[64]
    }

    pub fn kind(&self) -> SignatureKind {
        if is_pre_validated_pattern(&self.data) {
            SignatureKind::PreValidated
        } else if self.v() > 30 {
            SignatureKind::EthSign
        } else {
            SignatureKind::Ecdsa
        }
    }

    /// `0x`-prefixed hex, 130 characters after the prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.data))
    }

    /// Recover which owner this signature proves approval for
    ///
    /// Pre-validated signatures carry the owner in their first word; the
    /// contract trusts it only if the owner approved on-chain or submits.
    pub fn recover_owner(&self, tx_hash: &H256) -> Result<Address, SignatureError> {
        match self.kind() {
            SignatureKind::PreValidated => Ok(Address::from_slice(&self.data[12..32])),
            _ => recover_signer(tx_hash, &self.data),
        }
    }
}

/// Build the pre-validated sentinel signature for `owner`
pub fn encode_pre_validated(owner: Address) -> OwnerSignature {
    let mut data = [0u8; SIGNATURE_LENGTH];
    data[12..32].copy_from_slice(owner.as_bytes());
    data[64] = 1;
    OwnerSignature { owner, data }
}

/// True if `bytes` has the pre-validated layout
pub fn is_pre_validated_pattern(bytes: &[u8; SIGNATURE_LENGTH]) -> bool {
    bytes[..12].iter().all(|b| *b == 0)
        && bytes[32..64].iter().all(|b| *b == 0)
        && bytes[64] == 1
}

/// Validate stored signature bytes for `owner`
///
/// Accepts ECDSA signatures with v in {27, 28, 31, 32} and the
/// pre-validated pattern; a pre-validated blob must name `owner`.
pub fn decode(owner: Address, bytes: &[u8]) -> Result<OwnerSignature, SignatureError> {
    let data: [u8; SIGNATURE_LENGTH] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidLength(bytes.len()))?;

    if is_pre_validated_pattern(&data) {
        if &data[12..32] != owner.as_bytes() {
            return Err(SignatureError::RecoveryFailed(
                "pre-validated signature names a different owner".to_string(),
            ));
        }
        return Ok(OwnerSignature { owner, data });
    }

    match data[64] {
        27 | 28 | 31 | 32 => Ok(OwnerSignature { owner, data }),
        v => Err(SignatureError::InvalidV(v)),
    }
}

/// Validate a `0x`-prefixed hex signature for `owner`
pub fn decode_hex(owner: Address, signature: &str) -> Result<OwnerSignature, SignatureError> {
    let stripped = signature.trim().trim_start_matches("0x");
    let bytes = hex::decode(stripped).map_err(|e| SignatureError::InvalidHex(e.to_string()))?;
    decode(owner, &bytes)
}

/// Turn a signer's raw output into the v convention the contract expects
///
/// 1. raw recovery ids (0/1) are shifted to 27/28
/// 2. if recovering over the bare hash does not yield `owner`, the signer
///    applied the message prefix and v gets +4
/// 3. if recovery fails outright the prefix is assumed as well
///
/// A signature already carrying v = 31/32 is returned unchanged.
pub fn normalize_v(
    raw: &[u8],
    tx_hash: &H256,
    owner: Address,
    method: SigningMethod,
) -> Result<OwnerSignature, SignatureError> {
    let mut data: [u8; SIGNATURE_LENGTH] = raw
        .try_into()
        .map_err(|_| SignatureError::InvalidLength(raw.len()))?;

    let mut v = data[64];
    match v {
        31 | 32 => return Ok(OwnerSignature { owner, data }),
        0 | 1 | 27 | 28 => {}
        other => return Err(SignatureError::InvalidV(other)),
    }

    if v < MIN_VALID_V_VALUE {
        v += MIN_VALID_V_VALUE;
    }
    data[64] = v;

    let has_prefix = match method {
        SigningMethod::Digest => false,
        SigningMethod::EthSign => true,
        SigningMethod::Detect => signed_with_prefix(tx_hash, &data, owner),
    };

    if has_prefix {
        data[64] = v + ETH_SIGN_V_OFFSET;
    }

    log_debug!(
        "signature",
        "normalized signature v",
        owner = format!("{:?}", owner),
        prefixed = has_prefix,
        v = data[64],
    );

    Ok(OwnerSignature { owner, data })
}

fn signed_with_prefix(tx_hash: &H256, data: &[u8; SIGNATURE_LENGTH], owner: Address) -> bool {
    match recover_address(tx_hash.as_fixed_bytes(), data) {
        Ok(recovered) => recovered != owner,
        Err(_) => true,
    }
}
