//! Transaction Builder
//!
//! Turns a partial [`TransactionRequest`] into a canonical
//! [`SafeTransaction`] against the vault's current state.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::gas::estimate_inner_call_gas;
use crate::ledger::Ledger;
use crate::log_debug;
use crate::types::{SafeTransaction, TransactionRequest, VaultInfo};
use ethers_core::types::{Address, U256};

/// Reject request fields this engine will not service
pub fn check_supported(request: &TransactionRequest, config: &VaultConfig) -> VaultResult<()> {
    let gas_token = request.gas_token.unwrap_or_else(Address::zero);
    if !gas_token.is_zero() && !config.allow_gas_token_refunds {
        return Err(VaultError::unsupported_operation(format!(
            "Gas token refunds are disabled (gas token {:?})",
            gas_token
        )));
    }
    Ok(())
}

/// Nonce for the new transaction: explicit if not stale, else the vault's
pub fn resolve_nonce(requested: Option<U256>, current: U256) -> VaultResult<U256> {
    match requested {
        Some(nonce) if nonce < current => Err(VaultError::nonce_too_low(format!(
            "Nonce {} already used; vault nonce is {}",
            nonce, current
        ))),
        Some(nonce) => Ok(nonce),
        None => Ok(current),
    }
}

/// Build a canonical transaction, estimating `safe_tx_gas` when unset
pub async fn build<L: Ledger + ?Sized>(
    ledger: &L,
    vault: &VaultInfo,
    request: TransactionRequest,
    config: &VaultConfig,
) -> VaultResult<SafeTransaction> {
    check_supported(&request, config)?;
    let nonce = resolve_nonce(request.nonce, vault.nonce)?;
    let operation = request.operation.unwrap_or_default();

    let safe_tx_gas = match request.safe_tx_gas {
        Some(gas) => gas,
        None => {
            estimate_inner_call_gas(
                ledger,
                vault.address,
                request.to,
                request.value,
                &request.data,
                operation,
                &config.gas,
            )
            .await?
        }
    };

    log_debug!(
        "builder",
        "transaction built",
        nonce = nonce,
        safe_tx_gas = safe_tx_gas,
        operation = operation.as_u8(),
    );

    Ok(SafeTransaction {
        to: request.to,
        value: request.value,
        data: request.data,
        operation,
        safe_tx_gas,
        base_gas: request.base_gas.unwrap_or_default(),
        gas_price: request.gas_price.unwrap_or_default(),
        gas_token: request.gas_token.unwrap_or_else(Address::zero),
        refund_receiver: request.refund_receiver.unwrap_or_else(Address::zero),
        nonce,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{CallOutcome, CallRequest, Operation, Receipt, SafeVersion};
    use async_trait::async_trait;
    use ethers_core::types::{Bytes, H256};

    /// Ledger whose probe is unusable and whose direct estimate is fixed
    struct FixedLedger;

    #[async_trait]
    impl Ledger for FixedLedger {
        async fn chain_id(&self) -> VaultResult<u64> {
            Ok(1)
        }
        async fn balance(&self, _address: Address) -> VaultResult<U256> {
            Ok(U256::zero())
        }
        async fn call(&self, _request: &CallRequest) -> VaultResult<CallOutcome> {
            Ok(CallOutcome::Success(Bytes::default()))
        }
        async fn estimate_gas(&self, _request: &CallRequest) -> VaultResult<U256> {
            Ok(U256::from(21_000u64))
        }
        async fn submit(&self, _request: &CallRequest) -> VaultResult<H256> {
            unreachable!()
        }
        async fn wait_for_receipt(&self, _tx_hash: H256) -> VaultResult<Receipt> {
            unreachable!()
        }
    }

    fn vault_info() -> VaultInfo {
        VaultInfo {
            address: Address::from_low_u64_be(0x5afe),
            version: SafeVersion::V1_1_1,
            owners: vec![Address::from_low_u64_be(0xa1), Address::from_low_u64_be(0xa2)],
            threshold: 2,
            nonce: U256::from(7),
        }
    }

    #[tokio::test]
    async fn test_defaults() {
        let request = TransactionRequest::new(Address::from_low_u64_be(0x42), 100u64, Bytes::default());
        let tx = build(&FixedLedger, &vault_info(), request, &VaultConfig::default())
            .await
            .unwrap();

        assert_eq!(tx.operation, Operation::Call);
        assert_eq!(tx.nonce, U256::from(7));
        assert_eq!(tx.safe_tx_gas, U256::from(21_000u64));
        assert!(tx.base_gas.is_zero());
        assert!(tx.gas_price.is_zero());
        assert!(tx.gas_token.is_zero());
        assert!(tx.refund_receiver.is_zero());
    }

    #[tokio::test]
    async fn test_explicit_fields_are_kept() {
        let receiver = Address::from_low_u64_be(0x77);
        let request = TransactionRequest::new(Address::from_low_u64_be(0x42), 0u64, vec![1u8, 2])
            .operation(Operation::DelegateCall)
            .safe_tx_gas(5_000u64)
            .base_gas(1_000u64)
            .refund_receiver(receiver)
            .nonce(9u64);
        let tx = build(&FixedLedger, &vault_info(), request, &VaultConfig::default())
            .await
            .unwrap();

        assert_eq!(tx.operation, Operation::DelegateCall);
        assert_eq!(tx.safe_tx_gas, U256::from(5_000u64));
        assert_eq!(tx.base_gas, U256::from(1_000u64));
        assert_eq!(tx.refund_receiver, receiver);
        assert_eq!(tx.nonce, U256::from(9));
    }

    #[tokio::test]
    async fn test_stale_nonce_rejected() {
        let request =
            TransactionRequest::new(Address::from_low_u64_be(0x42), 0u64, Bytes::default()).nonce(6u64);
        let err = build(&FixedLedger, &vault_info(), request, &VaultConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NonceTooLow);
    }

    #[tokio::test]
    async fn test_gas_token_policy() {
        let request = TransactionRequest::new(Address::from_low_u64_be(0x42), 0u64, Bytes::default())
            .gas_token(Address::from_low_u64_be(0xda1));
        let err = build(&FixedLedger, &vault_info(), request.clone(), &VaultConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedOperation);

        let config = VaultConfig {
            allow_gas_token_refunds: true,
            ..Default::default()
        };
        assert!(build(&FixedLedger, &vault_info(), request, &config).await.is_ok());
    }
}
