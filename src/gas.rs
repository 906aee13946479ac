//! Gas Estimation
//!
//! `safe_tx_gas` comes from the vault's own `requiredTxGas` probe, which
//! always reverts and reports the gas its inner call used. Because that
//! figure undershoots once calldata and refund bookkeeping are charged, the
//! probe is replayed with a growing gas limit until it completes.

use crate::config::{GasSearchConfig, MAX_GAS_SEARCH_ROUNDS};
use crate::contract;
use crate::error::{ErrorCode, VaultError, VaultResult};
use crate::ledger::Ledger;
use crate::types::{CallRequest, Operation, SafeTransaction};
use crate::{log_debug, log_warn};
use ethers_core::types::{Address, Bytes, U256};

/// Outcome of one bounded re-simulation round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Ran out of gas, errored, or returned nothing
    Failed,
    /// Completed and returned the probe payload
    Succeeded(Bytes),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Succeeded(_))
    }
}

/// Intrinsic calldata cost: 4 gas per zero byte, 16 per non-zero byte
pub fn estimate_data_gas(data: &[u8]) -> U256 {
    let cost: u64 = data.iter().map(|b| if *b == 0 { 4 } else { 16 }).sum();
    U256::from(cost)
}

/// Run one probe round with the given gas limit at gas price 0
async fn probe_round<L: Ledger + ?Sized>(
    ledger: &L,
    vault: Address,
    probe_data: &Bytes,
    gas_limit: U256,
) -> ProbeOutcome {
    let request = CallRequest::new(vault, probe_data.clone())
        .from(vault)
        .gas(gas_limit)
        .gas_price(U256::zero());

    match ledger.call(&request).await {
        Ok(outcome) if !outcome.output().is_empty() => {
            ProbeOutcome::Succeeded(outcome.output().clone())
        }
        Ok(_) => ProbeOutcome::Failed,
        Err(e) => {
            log_debug!("gas", "probe round errored", error = e.message);
            ProbeOutcome::Failed
        }
    }
}

/// Estimate `safe_tx_gas` for the vault's inner call
///
/// Rounds are strictly sequential and capped at `config.max_rounds`. The
/// result is never below the probed figure plus `config.probe_margin`.
pub async fn estimate_inner_call_gas<L: Ledger + ?Sized>(
    ledger: &L,
    vault: Address,
    to: Address,
    value: U256,
    data: &Bytes,
    operation: Operation,
    config: &GasSearchConfig,
) -> VaultResult<U256> {
    let probe_data = contract::required_tx_gas_call(to, value, data, operation);
    let probe = CallRequest::new(vault, probe_data.clone()).from(vault);

    let probed = match ledger.call(&probe).await {
        Ok(outcome) => contract::decode_required_tx_gas(outcome.output()),
        Err(e) => {
            log_debug!("gas", "requiredTxGas probe failed", error = e.message);
            None
        }
    };

    let Some(probed) = probed else {
        return estimate_direct_call(ledger, vault, to, value, data, operation).await;
    };

    let mut gas = probed.saturating_add(U256::from(config.probe_margin));
    let data_gas = estimate_data_gas(&probe_data);
    let mut additional = U256::from(config.initial_additional_gas);

    for round in 0..config.max_rounds.min(MAX_GAS_SEARCH_ROUNDS) {
        let limit = gas.saturating_add(data_gas).saturating_add(additional);
        let outcome = probe_round(ledger, vault, &probe_data, limit).await;

        log_debug!(
            "gas",
            "probe round",
            round = round,
            limit = limit,
            succeeded = outcome.is_success(),
        );

        if outcome.is_success() {
            break;
        }
        gas = gas.saturating_add(additional);
        additional = additional.saturating_mul(U256::from(2));
    }

    Ok(gas.saturating_add(additional))
}

/// Fallback when the probe is unusable: estimate the inner call directly
async fn estimate_direct_call<L: Ledger + ?Sized>(
    ledger: &L,
    vault: Address,
    to: Address,
    value: U256,
    data: &Bytes,
    operation: Operation,
) -> VaultResult<U256> {
    let request = CallRequest::new(to, data.clone()).from(vault).value(value);
    match ledger.estimate_gas(&request).await {
        Ok(gas) => Ok(gas),
        Err(e) if operation == Operation::DelegateCall => {
            // The vault cannot be impersonated for delegate calls; 0 lets the
            // contract use all remaining gas.
            log_warn!(
                "gas",
                "direct estimate failed for delegate call, using 0",
                error = e.message,
            );
            Ok(U256::zero())
        }
        Err(e) => Err(e),
    }
}

/// Simulate `execTransaction` from the submitter
///
/// Any failure other than transport surfaces as `ExecutionWouldRevert`.
pub async fn estimate_execution_gas<L: Ledger + ?Sized>(
    ledger: &L,
    vault: Address,
    tx: &SafeTransaction,
    signatures: &Bytes,
    submitter: Address,
) -> VaultResult<U256> {
    let request =
        CallRequest::new(vault, contract::exec_transaction_call(tx, signatures)).from(submitter);

    ledger.estimate_gas(&request).await.map_err(|e| match e.code {
        ErrorCode::NetworkError | ErrorCode::Timeout | ErrorCode::ExecutionWouldRevert => e,
        _ => {
            let reason = match e.details {
                Some(details) => format!("{}: {}", e.message, details),
                None => e.message,
            };
            VaultError::execution_would_revert(reason)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CallOutcome, Receipt};
    use async_trait::async_trait;
    use ethers_core::abi::{self, Token};
    use ethers_core::types::H256;
    use std::sync::Mutex;

    /// Answers the probe with `required` and replays succeed once the limit
    /// reaches `needed`
    struct ProbeLedger {
        required: Option<u64>,
        needed: u64,
        direct: VaultResult<U256>,
        limits: Mutex<Vec<U256>>,
    }

    impl ProbeLedger {
        fn new(required: Option<u64>, needed: u64) -> Self {
            Self {
                required,
                needed,
                direct: Ok(U256::from(50_000u64)),
                limits: Mutex::new(Vec::new()),
            }
        }

        fn revert_payload(gas: u64) -> Bytes {
            let mut word = [0u8; 32];
            U256::from(gas).to_big_endian(&mut word);
            let mut data = vec![0x08, 0xc3, 0x79, 0xa0];
            data.extend_from_slice(&abi::encode(&[Token::Bytes(word.to_vec())]));
            Bytes::from(data)
        }
    }

    #[async_trait]
    impl Ledger for ProbeLedger {
        async fn chain_id(&self) -> VaultResult<u64> {
            Ok(1)
        }
        async fn balance(&self, _address: Address) -> VaultResult<U256> {
            Ok(U256::zero())
        }
        async fn call(&self, request: &CallRequest) -> VaultResult<CallOutcome> {
            let Some(required) = self.required else {
                return Ok(CallOutcome::Reverted(Bytes::default()));
            };
            match request.gas {
                None => Ok(CallOutcome::Reverted(Self::revert_payload(required))),
                Some(limit) => {
                    self.limits.lock().unwrap().push(limit);
                    if limit >= U256::from(self.needed) {
                        Ok(CallOutcome::Reverted(Self::revert_payload(required)))
                    } else {
                        Ok(CallOutcome::Reverted(Bytes::default()))
                    }
                }
            }
        }
        async fn estimate_gas(&self, _request: &CallRequest) -> VaultResult<U256> {
            self.direct.clone()
        }
        async fn submit(&self, _request: &CallRequest) -> VaultResult<H256> {
            unreachable!()
        }
        async fn wait_for_receipt(&self, _tx_hash: H256) -> VaultResult<Receipt> {
            unreachable!()
        }
    }

    fn vault() -> Address {
        Address::from_low_u64_be(0x5afe)
    }

    async fn search(ledger: &ProbeLedger, operation: Operation) -> VaultResult<U256> {
        estimate_inner_call_gas(
            ledger,
            vault(),
            Address::from_low_u64_be(0x42),
            U256::zero(),
            &Bytes::default(),
            operation,
            &GasSearchConfig::default(),
        )
        .await
    }

    #[test]
    fn test_data_gas() {
        assert_eq!(estimate_data_gas(&[]), U256::zero());
        assert_eq!(estimate_data_gas(&[0, 0, 1]), U256::from(24));
        assert_eq!(estimate_data_gas(&[0xff; 4]), U256::from(64));
    }

    #[tokio::test]
    async fn test_first_round_success() {
        let ledger = ProbeLedger::new(Some(30_000), 0);
        let gas = search(&ledger, Operation::Call).await.unwrap();
        // probed + margin + first additional
        assert_eq!(gas, U256::from(30_000 + 10_000 + 10_000));
        assert_eq!(ledger.limits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_grows_until_success() {
        let ledger = ProbeLedger::new(Some(30_000), 120_000);
        let gas = search(&ledger, Operation::Call).await.unwrap();

        let limits = ledger.limits.lock().unwrap().clone();
        assert!(limits.len() > 1);
        assert!(limits.windows(2).all(|w| w[0] < w[1]));
        assert!(*limits.last().unwrap() >= U256::from(120_000u64));
        assert!(gas >= U256::from(40_000u64));
    }

    #[tokio::test]
    async fn test_terminates_after_max_rounds() {
        let ledger = ProbeLedger::new(Some(30_000), u64::MAX);
        let gas = search(&ledger, Operation::Call).await.unwrap();

        assert_eq!(ledger.limits.lock().unwrap().len(), 10);
        // 40_000 + 10_000 * (2^10 - 1) + 10_000 * 2^10
        let expected = 40_000u64 + 10_000 * 1023 + 10_000 * 1024;
        assert_eq!(gas, U256::from(expected));
    }

    #[tokio::test]
    async fn test_oversized_round_limit_is_clamped() {
        let ledger = ProbeLedger::new(Some(30_000), u64::MAX);
        let config = GasSearchConfig {
            max_rounds: 40,
            ..GasSearchConfig::default()
        };
        estimate_inner_call_gas(
            &ledger,
            vault(),
            Address::from_low_u64_be(0x42),
            U256::zero(),
            &Bytes::default(),
            Operation::Call,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(ledger.limits.lock().unwrap().len(), MAX_GAS_SEARCH_ROUNDS as usize);
    }

    #[tokio::test]
    async fn test_unusable_probe_falls_back_to_direct_estimate() {
        let ledger = ProbeLedger::new(None, 0);
        assert_eq!(search(&ledger, Operation::Call).await.unwrap(), U256::from(50_000u64));
    }

    #[tokio::test]
    async fn test_delegate_call_fallback_returns_zero() {
        let mut ledger = ProbeLedger::new(None, 0);
        ledger.direct = Err(VaultError::execution_would_revert("GS013"));

        assert_eq!(search(&ledger, Operation::DelegateCall).await.unwrap(), U256::zero());
        assert_eq!(
            search(&ledger, Operation::Call).await.unwrap_err().code,
            ErrorCode::ExecutionWouldRevert
        );
    }

    #[tokio::test]
    async fn test_execution_estimate_maps_failures() {
        let mut ledger = ProbeLedger::new(None, 0);
        ledger.direct = Err(VaultError::parse_error("bad"));
        let tx = SafeTransaction {
            to: Address::from_low_u64_be(0x42),
            value: U256::zero(),
            data: Bytes::default(),
            operation: Operation::Call,
            safe_tx_gas: U256::zero(),
            base_gas: U256::zero(),
            gas_price: U256::zero(),
            gas_token: Address::zero(),
            refund_receiver: Address::zero(),
            nonce: U256::zero(),
        };
        let err = estimate_execution_gas(&ledger, vault(), &tx, &Bytes::default(), vault())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExecutionWouldRevert);
        assert_eq!(err.details.as_deref(), Some("bad"));

        ledger.direct = Err(VaultError::network("down"));
        let err = estimate_execution_gas(&ledger, vault(), &tx, &Bytes::default(), vault())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NetworkError);
    }
}
