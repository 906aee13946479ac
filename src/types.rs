//! Core types shared across the vault engine
//!
//! Addresses and integers use the fixed-width ledger types from
//! `ethers-core` so every field is hash-ready the moment it is built.

use crate::error::{VaultError, VaultResult};
use ethers_core::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel used by the vault contract as the head of its owner linked list
pub const SENTINEL_ADDRESS: Address = ethers_core::types::H160([
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1,
]);

/// True for the zero address and the owner-list sentinel
pub fn is_restricted_address(address: &Address) -> bool {
    address.is_zero() || *address == SENTINEL_ADDRESS
}

// =============================================================================
// Operation
// =============================================================================

/// How the vault invokes the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operation {
    #[default]
    Call,
    DelegateCall,
}

impl Operation {
    pub fn as_u8(self) -> u8 {
        match self {
            Operation::Call => 0,
            Operation::DelegateCall => 1,
        }
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> u8 {
        op.as_u8()
    }
}

impl TryFrom<u8> for Operation {
    type Error = VaultError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Call),
            1 => Ok(Operation::DelegateCall),
            other => Err(VaultError::unsupported_operation(format!(
                "Unknown operation {}",
                other
            ))),
        }
    }
}

// =============================================================================
// Vault versions
// =============================================================================

/// Deployed vault contract versions this engine can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SafeVersion {
    #[serde(rename = "1.0.0")]
    V1_0_0,
    #[serde(rename = "1.1.1")]
    V1_1_1,
    #[serde(rename = "1.2.0")]
    V1_2_0,
    #[serde(rename = "1.3.0")]
    V1_3_0,
    #[serde(rename = "1.4.1")]
    V1_4_1,
}

impl SafeVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::V1_0_0 => "1.0.0",
            Self::V1_1_1 => "1.1.1",
            Self::V1_2_0 => "1.2.0",
            Self::V1_3_0 => "1.3.0",
            Self::V1_4_1 => "1.4.1",
        }
    }

    /// From 1.3.0 on the EIP-712 domain includes the chain id
    pub fn domain_includes_chain_id(&self) -> bool {
        *self >= Self::V1_3_0
    }
}

impl fmt::Display for SafeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SafeVersion {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Service responses sometimes carry a build suffix, e.g. "1.3.0+L2"
        let core = s.trim().split('+').next().unwrap_or_default();
        match core {
            "1.0.0" => Ok(Self::V1_0_0),
            "1.1.1" => Ok(Self::V1_1_1),
            "1.2.0" => Ok(Self::V1_2_0),
            "1.3.0" => Ok(Self::V1_3_0),
            "1.4.1" => Ok(Self::V1_4_1),
            _ => Err(VaultError::invalid_input(format!("Wrong version: {}", s))),
        }
    }
}

// =============================================================================
// Transactions
// =============================================================================

/// Partial transaction as requested by a user action
///
/// Unset fields are filled by the builder:
/// - `operation`: [`Operation::Call`]
/// - `safe_tx_gas`: estimated from the destination call
/// - `base_gas`, `gas_price`: 0 (no refund)
/// - `gas_token`, `refund_receiver`: zero address (native currency, submitter)
/// - `nonce`: the vault's current on-chain nonce
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub to: Address,
    pub value: U256,
    #[serde(default)]
    pub data: Bytes,
    #[serde(default)]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub safe_tx_gas: Option<U256>,
    #[serde(default)]
    pub base_gas: Option<U256>,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub gas_token: Option<Address>,
    #[serde(default)]
    pub refund_receiver: Option<Address>,
    #[serde(default)]
    pub nonce: Option<U256>,
}

impl TransactionRequest {
    pub fn new(to: Address, value: impl Into<U256>, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: value.into(),
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn operation(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn safe_tx_gas(mut self, gas: impl Into<U256>) -> Self {
        self.safe_tx_gas = Some(gas.into());
        self
    }

    pub fn base_gas(mut self, gas: impl Into<U256>) -> Self {
        self.base_gas = Some(gas.into());
        self
    }

    pub fn gas_price(mut self, price: impl Into<U256>) -> Self {
        self.gas_price = Some(price.into());
        self
    }

    pub fn gas_token(mut self, token: Address) -> Self {
        self.gas_token = Some(token);
        self
    }

    pub fn refund_receiver(mut self, receiver: Address) -> Self {
        self.refund_receiver = Some(receiver);
        self
    }

    pub fn nonce(mut self, nonce: impl Into<U256>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }
}

/// Canonical vault transaction; every field is fixed before hashing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub operation: Operation,
    pub safe_tx_gas: U256,
    pub base_gas: U256,
    pub gas_price: U256,
    pub gas_token: Address,
    pub refund_receiver: Address,
    pub nonce: U256,
}

// =============================================================================
// Vault state
// =============================================================================

/// Snapshot of a vault's governance state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultInfo {
    pub address: Address,
    pub version: SafeVersion,
    pub owners: Vec<Address>,
    pub threshold: usize,
    pub nonce: U256,
}

impl VaultInfo {
    /// Check the owner set and threshold read from the ledger
    pub fn validate(&self) -> VaultResult<()> {
        if self.owners.is_empty() {
            return Err(VaultError::invalid_input("Vault has no owners"));
        }
        if self.threshold == 0 || self.threshold > self.owners.len() {
            return Err(VaultError::invalid_input(format!(
                "Invalid threshold: {} for {} owners",
                self.threshold,
                self.owners.len()
            )));
        }
        if let Some(bad) = self.owners.iter().find(|o| is_restricted_address(o)) {
            return Err(VaultError::invalid_address(format!(
                "Restricted address {:?} listed as owner",
                bad
            )));
        }
        Ok(())
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }
}

// =============================================================================
// Ledger call plumbing
// =============================================================================

/// A call or transaction as seen by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallRequest {
    pub from: Option<Address>,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas: Option<U256>,
    pub gas_price: Option<U256>,
}

impl CallRequest {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn gas(mut self, gas: U256) -> Self {
        self.gas = Some(gas);
        self
    }

    pub fn gas_price(mut self, price: U256) -> Self {
        self.gas_price = Some(price);
        self
    }
}

/// Result of simulating a call; a revert is an expected outcome, not an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success(Bytes),
    Reverted(Bytes),
}

impl CallOutcome {
    /// Returned bytes regardless of whether the call reverted
    pub fn output(&self) -> &Bytes {
        match self {
            CallOutcome::Success(out) | CallOutcome::Reverted(out) => out,
        }
    }
}

/// Receipt of a mined submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub transaction_hash: H256,
    pub block_number: Option<u64>,
    pub gas_used: Option<U256>,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_serde() {
        assert_eq!(serde_json::to_string(&Operation::DelegateCall).unwrap(), "1");
        let parsed: Operation = serde_json::from_str("0").unwrap();
        assert_eq!(parsed, Operation::Call);
        assert!(serde_json::from_str::<Operation>("2").is_err());
    }

    #[test]
    fn test_version_parse() {
        assert_eq!("1.1.1".parse::<SafeVersion>().unwrap(), SafeVersion::V1_1_1);
        assert_eq!("1.3.0+L2".parse::<SafeVersion>().unwrap(), SafeVersion::V1_3_0);
        assert!("0.9.0".parse::<SafeVersion>().is_err());
        assert!(!SafeVersion::V1_2_0.domain_includes_chain_id());
        assert!(SafeVersion::V1_4_1.domain_includes_chain_id());
    }

    #[test]
    fn test_restricted_addresses() {
        assert!(is_restricted_address(&Address::zero()));
        assert!(is_restricted_address(&Address::from_low_u64_be(1)));
        assert!(!is_restricted_address(&Address::from_low_u64_be(2)));
    }

    #[test]
    fn test_vault_info_validation() {
        let mut info = VaultInfo {
            address: Address::from_low_u64_be(0xaa),
            version: SafeVersion::V1_1_1,
            owners: vec![Address::from_low_u64_be(0x10), Address::from_low_u64_be(0x11)],
            threshold: 2,
            nonce: U256::zero(),
        };
        assert!(info.validate().is_ok());

        info.threshold = 3;
        assert!(info.validate().is_err());

        info.threshold = 1;
        info.owners.push(SENTINEL_ADDRESS);
        assert!(info.validate().is_err());
    }

    #[test]
    fn test_request_builder_defaults() {
        let to = Address::from_low_u64_be(0x42);
        let request = TransactionRequest::new(to, 100u64, Bytes::default()).nonce(5u64);
        assert_eq!(request.value, U256::from(100));
        assert_eq!(request.nonce, Some(U256::from(5)));
        assert!(request.operation.is_none());
        assert!(request.safe_tx_gas.is_none());
    }
}
