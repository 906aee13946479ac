//! Execution Coordinator
//!
//! Drives a signed transaction from a signature set to a ledger
//! submission. Checks run in a fixed order so that a transaction that cannot
//! succeed never reaches gas estimation or submission:
//!
//! 1. pre-validated signatures for on-chain approvers and the submitter
//! 2. quorum
//! 3. vault balance (for value transfers)
//! 4. `execTransaction` simulation
//! 5. submission

use crate::contract;
use crate::error::{VaultError, VaultResult};
use crate::gas::estimate_execution_gas;
use crate::ledger::Ledger;
use crate::quorum::{ensure_quorum, owners_who_pre_approved, SignatureSet};
use crate::signature::encode_pre_validated;
use crate::types::{CallRequest, Receipt, SafeTransaction, VaultInfo};
use crate::utils::crypto::hash_hex;
use crate::{log_info, log_warn};
use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Lifecycle of one execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExecutionStage {
    Built,
    PartiallySigned,
    QuorumReached,
    GasEstimated,
    Submitted,
    Confirmed,
    Reverted,
}

impl ExecutionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStage::Built => "built",
            ExecutionStage::PartiallySigned => "partially_signed",
            ExecutionStage::QuorumReached => "quorum_reached",
            ExecutionStage::GasEstimated => "gas_estimated",
            ExecutionStage::Submitted => "submitted",
            ExecutionStage::Confirmed => "confirmed",
            ExecutionStage::Reverted => "reverted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStage::Confirmed | ExecutionStage::Reverted)
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn enter_stage(stage: ExecutionStage, safe_tx_hash: &H256) {
    log_info!(
        "execution",
        "stage transition",
        stage = stage,
        safe_tx_hash = hash_hex(safe_tx_hash),
    );
}

/// Submission overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Ledger gas price; the node's price when unset
    pub gas_price: Option<U256>,
    /// Ledger gas limit; the simulated figure when unset
    pub gas_limit: Option<U256>,
}

impl ExecutionOptions {
    pub fn gas_price(mut self, price: impl Into<U256>) -> Self {
        self.gas_price = Some(price.into());
        self
    }

    pub fn gas_limit(mut self, limit: impl Into<U256>) -> Self {
        self.gas_limit = Some(limit.into());
        self
    }
}

/// Final state of a mined submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Confirmed(Receipt),
    Reverted(Receipt),
}

impl ExecutionOutcome {
    pub fn receipt(&self) -> &Receipt {
        match self {
            ExecutionOutcome::Confirmed(r) | ExecutionOutcome::Reverted(r) => r,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ExecutionOutcome::Confirmed(_))
    }
}

/// Handle to a submitted ledger transaction
pub struct PendingExecution {
    ledger: Arc<dyn Ledger>,
    tx_hash: H256,
    safe_tx_hash: H256,
}

impl PendingExecution {
    pub fn new(ledger: Arc<dyn Ledger>, tx_hash: H256, safe_tx_hash: H256) -> Self {
        Self {
            ledger,
            tx_hash,
            safe_tx_hash,
        }
    }

    /// Ledger transaction hash
    pub fn tx_hash(&self) -> H256 {
        self.tx_hash
    }

    /// Vault transaction hash the submission executes or approves
    pub fn safe_tx_hash(&self) -> H256 {
        self.safe_tx_hash
    }

    /// Wait until the submission is mined
    pub async fn wait(self) -> VaultResult<ExecutionOutcome> {
        let receipt = self.ledger.wait_for_receipt(self.tx_hash).await?;
        if receipt.success {
            enter_stage(ExecutionStage::Confirmed, &self.safe_tx_hash);
            Ok(ExecutionOutcome::Confirmed(receipt))
        } else {
            enter_stage(ExecutionStage::Reverted, &self.safe_tx_hash);
            Ok(ExecutionOutcome::Reverted(receipt))
        }
    }
}

impl fmt::Debug for PendingExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingExecution")
            .field("tx_hash", &self.tx_hash)
            .field("safe_tx_hash", &self.safe_tx_hash)
            .finish()
    }
}

/// Add pre-validated signatures for owners whose approval needs no ECDSA
///
/// Owners that approved `safe_tx_hash` on-chain and the submitter (if it is
/// an owner) qualify. Existing signatures are never replaced.
pub async fn inject_pre_validated(
    ledger: &dyn Ledger,
    vault: &VaultInfo,
    safe_tx_hash: H256,
    submitter: Address,
    signatures: &mut SignatureSet,
) -> VaultResult<()> {
    let unsigned: Vec<Address> = vault
        .owners
        .iter()
        .filter(|owner| !signatures.contains(owner))
        .copied()
        .collect();

    let approved = owners_who_pre_approved(ledger, vault.address, &unsigned, safe_tx_hash).await?;
    for owner in approved {
        signatures.insert_if_absent(encode_pre_validated(owner));
    }

    if vault.is_owner(&submitter) {
        signatures.insert_if_absent(encode_pre_validated(submitter));
    }
    Ok(())
}

/// Fail with `InsufficientFunds` if the vault cannot cover `tx.value`
pub async fn ensure_funds(ledger: &dyn Ledger, vault: Address, tx: &SafeTransaction) -> VaultResult<()> {
    if tx.value.is_zero() {
        return Ok(());
    }
    let balance = ledger.balance(vault).await?;
    if balance < tx.value {
        return Err(VaultError::insufficient_funds("Not enough Ether funds")
            .with_details(format!("value: {}, balance: {}", tx.value, balance)));
    }
    Ok(())
}

/// Run the checks and submit `execTransaction` from `submitter`
pub async fn execute(
    ledger: Arc<dyn Ledger>,
    vault: &VaultInfo,
    tx: &SafeTransaction,
    safe_tx_hash: H256,
    mut signatures: SignatureSet,
    submitter: Address,
    options: &ExecutionOptions,
) -> VaultResult<PendingExecution> {
    enter_stage(ExecutionStage::Built, &safe_tx_hash);

    signatures.ensure_owners(&vault.owners)?;
    inject_pre_validated(ledger.as_ref(), vault, safe_tx_hash, submitter, &mut signatures).await?;
    enter_stage(ExecutionStage::PartiallySigned, &safe_tx_hash);

    if let Err(e) = ensure_quorum(&signatures, vault.threshold) {
        log_warn!(
            "execution",
            "quorum not reached",
            collected = signatures.len(),
            threshold = vault.threshold,
        );
        return Err(e);
    }
    enter_stage(ExecutionStage::QuorumReached, &safe_tx_hash);

    ensure_funds(ledger.as_ref(), vault.address, tx).await?;

    let encoded = signatures.encoded();
    let estimated =
        estimate_execution_gas(ledger.as_ref(), vault.address, tx, &encoded, submitter).await?;
    enter_stage(ExecutionStage::GasEstimated, &safe_tx_hash);

    let mut request = CallRequest::new(vault.address, contract::exec_transaction_call(tx, &encoded))
        .from(submitter)
        .gas(options.gas_limit.unwrap_or(estimated));
    if let Some(price) = options.gas_price {
        request = request.gas_price(price);
    }

    let tx_hash = ledger.submit(&request).await?;
    enter_stage(ExecutionStage::Submitted, &safe_tx_hash);

    Ok(PendingExecution::new(ledger, tx_hash, safe_tx_hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(ExecutionStage::Built < ExecutionStage::QuorumReached);
        assert!(ExecutionStage::GasEstimated < ExecutionStage::Submitted);
        assert!(ExecutionStage::Confirmed.is_terminal());
        assert!(!ExecutionStage::Submitted.is_terminal());
        assert_eq!(ExecutionStage::PartiallySigned.to_string(), "partially_signed");
    }

    #[test]
    fn test_options_builder() {
        let options = ExecutionOptions::default().gas_price(5u64);
        assert_eq!(options.gas_price, Some(U256::from(5)));
        assert_eq!(options.gas_limit, None);
    }
}
