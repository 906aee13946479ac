//! Vault Contract ABI
//!
//! Calldata encoders and return-data decoders for the vault contract entry
//! points the engine uses. The set is closed; there is no runtime ABI lookup.

use crate::error::{VaultError, VaultResult};
use crate::types::{Operation, SafeTransaction};
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use ethers_core::utils::id;

pub const GET_OWNERS: &str = "getOwners()";
pub const GET_THRESHOLD: &str = "getThreshold()";
pub const NONCE: &str = "nonce()";
pub const VERSION: &str = "VERSION()";
pub const APPROVED_HASHES: &str = "approvedHashes(address,bytes32)";
pub const APPROVE_HASH: &str = "approveHash(bytes32)";
pub const REQUIRED_TX_GAS: &str = "requiredTxGas(address,uint256,bytes,uint8)";
pub const EXEC_TRANSACTION: &str =
    "execTransaction(address,uint256,bytes,uint8,uint256,uint256,uint256,address,address,bytes)";

/// Selector of `Error(string)` revert payloads
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

fn with_selector(signature: &str, tokens: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend_from_slice(&abi::encode(tokens));
    Bytes::from(data)
}

pub fn get_owners_call() -> Bytes {
    with_selector(GET_OWNERS, &[])
}

pub fn get_threshold_call() -> Bytes {
    with_selector(GET_THRESHOLD, &[])
}

pub fn nonce_call() -> Bytes {
    with_selector(NONCE, &[])
}

pub fn version_call() -> Bytes {
    with_selector(VERSION, &[])
}

pub fn approved_hashes_call(owner: Address, tx_hash: H256) -> Bytes {
    with_selector(
        APPROVED_HASHES,
        &[Token::Address(owner), Token::FixedBytes(tx_hash.as_bytes().to_vec())],
    )
}

pub fn approve_hash_call(tx_hash: H256) -> Bytes {
    with_selector(APPROVE_HASH, &[Token::FixedBytes(tx_hash.as_bytes().to_vec())])
}

pub fn required_tx_gas_call(to: Address, value: U256, data: &Bytes, operation: Operation) -> Bytes {
    with_selector(
        REQUIRED_TX_GAS,
        &[
            Token::Address(to),
            Token::Uint(value),
            Token::Bytes(data.to_vec()),
            Token::Uint(U256::from(operation.as_u8())),
        ],
    )
}

pub fn exec_transaction_call(tx: &SafeTransaction, signatures: &Bytes) -> Bytes {
    with_selector(
        EXEC_TRANSACTION,
        &[
            Token::Address(tx.to),
            Token::Uint(tx.value),
            Token::Bytes(tx.data.to_vec()),
            Token::Uint(U256::from(tx.operation.as_u8())),
            Token::Uint(tx.safe_tx_gas),
            Token::Uint(tx.base_gas),
            Token::Uint(tx.gas_price),
            Token::Address(tx.gas_token),
            Token::Address(tx.refund_receiver),
            Token::Bytes(signatures.to_vec()),
        ],
    )
}

pub fn decode_address_array(output: &[u8]) -> VaultResult<Vec<Address>> {
    let tokens = abi::decode(&[ParamType::Array(Box::new(ParamType::Address))], output)?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_array)
        .map(|items| items.into_iter().filter_map(Token::into_address).collect())
        .ok_or_else(|| VaultError::parse_error("Expected address[] return value"))
}

pub fn decode_uint(output: &[u8]) -> VaultResult<U256> {
    let tokens = abi::decode(&[ParamType::Uint(256)], output)?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_uint)
        .ok_or_else(|| VaultError::parse_error("Expected uint256 return value"))
}

pub fn decode_string(output: &[u8]) -> VaultResult<String> {
    let tokens = abi::decode(&[ParamType::String], output)?;
    tokens
        .into_iter()
        .next()
        .and_then(Token::into_string)
        .ok_or_else(|| VaultError::parse_error("Expected string return value"))
}

/// Gas figure from a `requiredTxGas` revert payload
///
/// The contract reverts with `Error(string)` whose string body is the
/// 32-byte big-endian gas amount, so the figure sits at bytes 68..100.
pub fn decode_required_tx_gas(revert_data: &[u8]) -> Option<U256> {
    if revert_data.len() < 100 || revert_data[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    Some(U256::from_big_endian(&revert_data[68..100]))
}

/// Human-readable reason from revert data, falling back to hex
pub fn decode_revert_reason(revert_data: &[u8]) -> String {
    if revert_data.len() >= 4 && revert_data[..4] == ERROR_STRING_SELECTOR {
        if let Ok(tokens) = abi::decode(&[ParamType::String], &revert_data[4..]) {
            if let Some(reason) = tokens.into_iter().next().and_then(Token::into_string) {
                return reason;
            }
        }
    }
    format!("0x{}", hex::encode(revert_data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selectors() {
        assert_eq!(hex::encode(&get_owners_call()[..]), "a0e67e2b");
        assert_eq!(hex::encode(&get_threshold_call()[..]), "e75235b8");
        assert_eq!(hex::encode(&nonce_call()[..]), "affed0e0");
        assert_eq!(hex::encode(&version_call()[..]), "ffa1ad74");
        assert_eq!(hex::encode(&approve_hash_call(H256::zero())[..4]), "d4d9bdcd");
        assert_eq!(
            hex::encode(&approved_hashes_call(Address::zero(), H256::zero())[..4]),
            "7d832974"
        );
        assert_eq!(hex::encode(id(EXEC_TRANSACTION)), "6a761202");
        assert_eq!(hex::encode(id(REQUIRED_TX_GAS)), "c4ca3a9c");
    }

    #[test]
    fn test_decode_address_array() {
        let owners = vec![Address::from_low_u64_be(1), Address::from_low_u64_be(2)];
        let encoded = abi::encode(&[Token::Array(
            owners.iter().map(|o| Token::Address(*o)).collect(),
        )]);
        assert_eq!(decode_address_array(&encoded).unwrap(), owners);
    }

    #[test]
    fn test_decode_required_tx_gas() {
        let mut body = [0u8; 32];
        U256::from(45_000u64).to_big_endian(&mut body);
        let mut revert = ERROR_STRING_SELECTOR.to_vec();
        revert.extend_from_slice(&abi::encode(&[Token::Bytes(body.to_vec())]));

        assert_eq!(decode_required_tx_gas(&revert), Some(U256::from(45_000u64)));
        assert_eq!(decode_required_tx_gas(&[]), None);
        assert_eq!(decode_required_tx_gas(&[0u8; 100]), None);
    }

    #[test]
    fn test_decode_revert_reason() {
        let mut revert = ERROR_STRING_SELECTOR.to_vec();
        revert.extend_from_slice(&abi::encode(&[Token::String("GS013".to_string())]));
        assert_eq!(decode_revert_reason(&revert), "GS013");
        assert_eq!(decode_revert_reason(&[0xde, 0xad]), "0xdead");
    }

    #[test]
    fn test_exec_transaction_layout() {
        let tx = SafeTransaction {
            to: Address::from_low_u64_be(0x42),
            value: U256::from(1),
            data: Bytes::default(),
            operation: Operation::Call,
            safe_tx_gas: U256::zero(),
            base_gas: U256::zero(),
            gas_price: U256::zero(),
            gas_token: Address::zero(),
            refund_receiver: Address::zero(),
            nonce: U256::zero(),
        };
        let signatures = Bytes::from(vec![1u8; 130]);
        let call = exec_transaction_call(&tx, &signatures);
        // selector + 10 head words + data (len word) + signatures (len word + 5 words)
        assert_eq!(call.len(), 4 + 10 * 32 + 32 + 32 + 5 * 32);
    }
}
