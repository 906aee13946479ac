//! Safe Transaction Hashing
//!
//! EIP-712 hash of a [`SafeTransaction`], byte-for-byte what the vault
//! contract derives in `getTransactionHash`. The digest is both the signing
//! payload and the lookup key in the coordination service.
//!
//! hash = keccak256(0x19 || 0x01 || domainSeparator || keccak256(
//!     SAFE_TX_TYPEHASH || to || value || keccak256(data) || operation ||
//!     safeTxGas || baseGas || gasPrice || gasToken || refundReceiver || nonce))

use crate::types::{SafeTransaction, SafeVersion};
use crate::utils::crypto::keccak256;
use ethers_core::types::{Address, H256, U256};

/// Magic prefix for EIP-712 encoding
const EIP712_PREFIX: &[u8] = b"\x19\x01";

/// Type string of the hashed struct
pub const SAFE_TX_TYPE: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 baseGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Type string used by 1.0.0 vaults, where `baseGas` was still `dataGas`
pub const SAFE_TX_TYPE_V1_0_0: &str = "SafeTx(address to,uint256 value,bytes data,uint8 operation,uint256 safeTxGas,uint256 dataGas,uint256 gasPrice,address gasToken,address refundReceiver,uint256 nonce)";

/// Domain type before 1.3.0
pub const LEGACY_DOMAIN_TYPE: &str = "EIP712Domain(address verifyingContract)";

/// Domain type from 1.3.0 on
pub const CHAIN_DOMAIN_TYPE: &str = "EIP712Domain(uint256 chainId,address verifyingContract)";

/// EIP-712 domain layout, chosen by vault version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashScheme {
    /// 1.0.0 layout: contract-only domain and the `dataGas` struct type
    DataGas,
    /// Domain is the verifying contract only
    Legacy,
    /// Domain binds chain id and verifying contract
    ChainBound { chain_id: u64 },
}

impl HashScheme {
    /// Pick the domain layout for a deployed version
    pub fn for_version(version: SafeVersion, chain_id: u64) -> Self {
        if version.domain_includes_chain_id() {
            HashScheme::ChainBound { chain_id }
        } else if version == SafeVersion::V1_0_0 {
            HashScheme::DataGas
        } else {
            HashScheme::Legacy
        }
    }

    /// SafeTx type string whose hash heads the struct encoding
    pub fn safe_tx_type(&self) -> &'static str {
        match self {
            HashScheme::DataGas => SAFE_TX_TYPE_V1_0_0,
            HashScheme::Legacy | HashScheme::ChainBound { .. } => SAFE_TX_TYPE,
        }
    }

    /// domainSeparator = keccak256(typeHash || encoded domain fields)
    pub fn domain_separator(&self, vault: &Address) -> [u8; 32] {
        let mut encoded = Vec::with_capacity(96);
        match self {
            HashScheme::DataGas | HashScheme::Legacy => {
                encoded.extend_from_slice(&keccak256(LEGACY_DOMAIN_TYPE.as_bytes()));
            }
            HashScheme::ChainBound { chain_id } => {
                encoded.extend_from_slice(&keccak256(CHAIN_DOMAIN_TYPE.as_bytes()));
                encoded.extend_from_slice(&encode_u256(&U256::from(*chain_id)));
            }
        }
        encoded.extend_from_slice(&encode_address(vault));
        keccak256(&encoded)
    }
}

/// Left-pad an address to a 32-byte word
fn encode_address(address: &Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

/// Big-endian 32-byte word
fn encode_u256(value: &U256) -> [u8; 32] {
    let mut word = [0u8; 32];
    value.to_big_endian(&mut word);
    word
}

/// hashStruct(SafeTx) under `scheme`'s type string
pub fn struct_hash(tx: &SafeTransaction, scheme: HashScheme) -> [u8; 32] {
    let mut encoded = Vec::with_capacity(11 * 32);
    encoded.extend_from_slice(&keccak256(scheme.safe_tx_type().as_bytes()));
    encoded.extend_from_slice(&encode_address(&tx.to));
    encoded.extend_from_slice(&encode_u256(&tx.value));
    encoded.extend_from_slice(&keccak256(&tx.data));
    encoded.extend_from_slice(&encode_u256(&U256::from(tx.operation.as_u8())));
    encoded.extend_from_slice(&encode_u256(&tx.safe_tx_gas));
    encoded.extend_from_slice(&encode_u256(&tx.base_gas));
    encoded.extend_from_slice(&encode_u256(&tx.gas_price));
    encoded.extend_from_slice(&encode_address(&tx.gas_token));
    encoded.extend_from_slice(&encode_address(&tx.refund_receiver));
    encoded.extend_from_slice(&encode_u256(&tx.nonce));
    keccak256(&encoded)
}

/// Calculate the transaction hash the vault contract will verify against
pub fn transaction_hash(tx: &SafeTransaction, vault: &Address, scheme: HashScheme) -> H256 {
    let mut data = Vec::with_capacity(2 + 32 + 32);
    data.extend_from_slice(EIP712_PREFIX);
    data.extend_from_slice(&scheme.domain_separator(vault));
    data.extend_from_slice(&struct_hash(tx, scheme));
    H256::from(keccak256(&data))
}

/// Transaction hash for the pre-1.3.0 encoding
pub fn hash(tx: &SafeTransaction, vault: &Address) -> H256 {
    transaction_hash(tx, vault, HashScheme::Legacy)
}
