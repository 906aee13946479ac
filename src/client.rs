//! Vault Client
//!
//! Orchestrates the engine against one deployed vault: reads state from the
//! ledger, builds and hashes transactions, collects owner signatures through
//! the coordination service and executes once the quorum holds.

use crate::builder;
use crate::config::VaultConfig;
use crate::contract;
use crate::error::{VaultError, VaultResult};
use crate::execution::{self, ExecutionOptions, PendingExecution};
use crate::hash::{transaction_hash, HashScheme};
use crate::ledger::Ledger;
use crate::quorum::{owners_who_pre_approved, SignatureSet};
use crate::service::{CoordinationService, ServiceTransaction, TransactionProposal};
use crate::signature::{decode_hex, normalize_v, OwnerSignature, SignatureKind};
use crate::signer::Signer;
use crate::types::{CallRequest, SafeTransaction, SafeVersion, TransactionRequest, VaultInfo};
use crate::utils::crypto::hash_hex;
use crate::{log_info, log_warn};
use ethers_core::types::{Address, H256, U256};
use std::sync::Arc;

/// A transaction stored in the coordination service with its proposer's signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedTransaction {
    pub transaction: SafeTransaction,
    pub safe_tx_hash: H256,
    pub signature: OwnerSignature,
}

/// Client bound to one vault address
pub struct VaultClient {
    address: Address,
    version: SafeVersion,
    scheme: HashScheme,
    ledger: Arc<dyn Ledger>,
    service: Arc<dyn CoordinationService>,
    signer: Arc<dyn Signer>,
    config: VaultConfig,
}

impl VaultClient {
    /// Connect to a vault, checking that ledger and service both report
    /// `expected_version`
    ///
    /// A mismatch aborts before any further ledger or service call.
    pub async fn create(
        address: Address,
        expected_version: SafeVersion,
        ledger: Arc<dyn Ledger>,
        service: Arc<dyn CoordinationService>,
        signer: Arc<dyn Signer>,
        config: VaultConfig,
    ) -> VaultResult<Self> {
        let ledger_version = ledger.version(address).await?;
        ensure_version(expected_version, &ledger_version)?;

        let service_info = service.vault_info(address).await?;
        ensure_version(expected_version, &service_info.version)?;

        let chain_id = ledger.chain_id().await?;
        if chain_id != config.chain_id {
            log_warn!(
                "client",
                "ledger chain id differs from configuration",
                ledger_chain = chain_id,
                configured_chain = config.chain_id,
            );
        }

        log_info!(
            "client",
            "connected to vault",
            vault = format!("{:?}", address),
            version = expected_version,
            chain = chain_id,
        );

        Ok(Self {
            address,
            version: expected_version,
            scheme: HashScheme::for_version(expected_version, chain_id),
            ledger,
            service,
            signer,
            config,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn version(&self) -> SafeVersion {
        self.version
    }

    pub fn scheme(&self) -> HashScheme {
        self.scheme
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Fresh vault state from the ledger
    pub async fn vault_info(&self) -> VaultResult<VaultInfo> {
        let info = VaultInfo {
            address: self.address,
            version: self.version,
            owners: self.ledger.owners(self.address).await?,
            threshold: self.ledger.threshold(self.address).await?,
            nonce: self.ledger.nonce(self.address).await?,
        };
        info.validate()?;
        Ok(info)
    }

    pub async fn owners(&self) -> VaultResult<Vec<Address>> {
        self.ledger.owners(self.address).await
    }

    pub async fn threshold(&self) -> VaultResult<usize> {
        self.ledger.threshold(self.address).await
    }

    pub async fn nonce(&self) -> VaultResult<U256> {
        self.ledger.nonce(self.address).await
    }

    pub async fn balance(&self) -> VaultResult<U256> {
        self.ledger.balance(self.address).await
    }

    pub async fn build_transaction(&self, request: TransactionRequest) -> VaultResult<SafeTransaction> {
        let info = self.vault_info().await?;
        builder::build(self.ledger.as_ref(), &info, request, &self.config).await
    }

    pub fn transaction_hash(&self, tx: &SafeTransaction) -> H256 {
        transaction_hash(tx, &self.address, self.scheme)
    }

    /// Sign a transaction hash as the configured owner
    pub async fn sign_transaction_hash(&self, safe_tx_hash: H256) -> VaultResult<OwnerSignature> {
        let owner = self.signer.address();
        let owners = self.owners().await?;
        if !owners.contains(&owner) {
            return Err(VaultError::not_an_owner(format!("{:?}", owner)));
        }
        self.sign_as_owner(safe_tx_hash).await
    }

    async fn sign_as_owner(&self, safe_tx_hash: H256) -> VaultResult<OwnerSignature> {
        let raw = self.signer.sign_digest(safe_tx_hash).await?;
        let signature = normalize_v(&raw, &safe_tx_hash, self.signer.address(), self.signer.method())?;
        Ok(signature)
    }

    pub async fn sign_transaction(&self, tx: &SafeTransaction) -> VaultResult<OwnerSignature> {
        self.sign_transaction_hash(self.transaction_hash(tx)).await
    }

    /// Build, sign and store a new transaction in the coordination service
    pub async fn propose_transaction(
        &self,
        request: TransactionRequest,
    ) -> VaultResult<ProposedTransaction> {
        let transaction = self.build_transaction(request).await?;
        let safe_tx_hash = self.transaction_hash(&transaction);
        let signature = self.sign_transaction_hash(safe_tx_hash).await?;

        let proposal =
            TransactionProposal::new(&transaction, &safe_tx_hash, self.signer.address(), &signature);
        self.service.propose_transaction(self.address, &proposal).await?;

        Ok(ProposedTransaction {
            transaction,
            safe_tx_hash,
            signature,
        })
    }

    /// Sign `safe_tx_hash` and store the confirmation in the service
    pub async fn confirm_transaction(&self, safe_tx_hash: H256) -> VaultResult<OwnerSignature> {
        let signature = self.sign_transaction_hash(safe_tx_hash).await?;
        self.service.confirm_transaction(safe_tx_hash, &signature).await?;
        Ok(signature)
    }

    /// Owners that approved `safe_tx_hash` on-chain
    pub async fn owners_who_approved(&self, safe_tx_hash: H256) -> VaultResult<Vec<Address>> {
        let owners = self.owners().await?;
        owners_who_pre_approved(self.ledger.as_ref(), self.address, &owners, safe_tx_hash).await
    }

    /// Record the signer's approval of `safe_tx_hash` on-chain via `approveHash`
    pub async fn approve_hash_onchain(&self, safe_tx_hash: H256) -> VaultResult<PendingExecution> {
        let owner = self.signer.address();
        if !self.owners().await?.contains(&owner) {
            return Err(VaultError::not_an_owner(format!("{:?}", owner)));
        }

        let request = CallRequest::new(self.address, contract::approve_hash_call(safe_tx_hash)).from(owner);
        let tx_hash = self.ledger.submit(&request).await?;

        log_info!(
            "client",
            "approveHash submitted",
            safe_tx_hash = hash_hex(&safe_tx_hash),
            tx_hash = hash_hex(&tx_hash),
        );

        Ok(PendingExecution::new(Arc::clone(&self.ledger), tx_hash, safe_tx_hash))
    }

    /// Execute `tx` with the given signatures plus any the service holds
    ///
    /// The signer's account submits and pays for the ledger transaction.
    pub async fn execute_transaction(
        &self,
        tx: &SafeTransaction,
        signatures: SignatureSet,
        options: &ExecutionOptions,
    ) -> VaultResult<PendingExecution> {
        let info = self.vault_info().await?;
        let safe_tx_hash = self.transaction_hash(tx);

        let mut signatures = signatures;
        match self.collect_service_signatures(safe_tx_hash, &info.owners).await {
            Ok(stored) => signatures.merge(&stored),
            Err(e) => log_warn!(
                "client",
                "could not fetch stored confirmations",
                safe_tx_hash = hash_hex(&safe_tx_hash),
                error = e,
            ),
        }

        execution::execute(
            Arc::clone(&self.ledger),
            &info,
            tx,
            safe_tx_hash,
            signatures,
            self.signer.address(),
            options,
        )
        .await
    }

    /// Unexecuted service transactions at or above the on-chain nonce
    pub async fn pending_transactions(&self) -> VaultResult<Vec<ServiceTransaction>> {
        let nonce = self.nonce().await?;
        let transactions = self.service.pending_transactions(self.address, nonce).await?;
        Ok(transactions
            .into_iter()
            .filter(|tx| !tx.is_executed && tx.nonce >= nonce)
            .collect())
    }

    /// Verified signatures stored in the service for `safe_tx_hash`
    pub async fn signatures_from_service(&self, safe_tx_hash: H256) -> VaultResult<SignatureSet> {
        let owners = self.owners().await?;
        self.collect_service_signatures(safe_tx_hash, &owners).await
    }

    async fn collect_service_signatures(
        &self,
        safe_tx_hash: H256,
        owners: &[Address],
    ) -> VaultResult<SignatureSet> {
        let mut set = SignatureSet::new();
        let Some(stored) = self.service.transaction(safe_tx_hash).await? else {
            return Ok(set);
        };

        for confirmation in &stored.confirmations {
            let Some(ref encoded) = confirmation.signature else {
                continue;
            };
            if !owners.contains(&confirmation.owner) {
                log_warn!(
                    "client",
                    "ignoring confirmation from non-owner",
                    signer = format!("{:?}", confirmation.owner),
                );
                continue;
            }
            match verify_confirmation(confirmation.owner, encoded, &safe_tx_hash) {
                Ok(signature) if signature.kind() == SignatureKind::PreValidated => {
                    // The marker carries no proof; it stands only for an
                    // on-chain approval or the submitter itself
                    if self.pre_validation_holds(confirmation.owner, safe_tx_hash).await? {
                        set.add_signature(signature);
                    } else {
                        log_warn!(
                            "client",
                            "ignoring unbacked pre-validated confirmation",
                            signer = format!("{:?}", confirmation.owner),
                            safe_tx_hash = hash_hex(&safe_tx_hash),
                        );
                    }
                }
                Ok(signature) => {
                    set.add_signature(signature);
                }
                Err(e) => log_warn!(
                    "client",
                    "ignoring invalid confirmation",
                    signer = format!("{:?}", confirmation.owner),
                    error = e,
                ),
            }
        }
        Ok(set)
    }

    async fn pre_validation_holds(&self, owner: Address, safe_tx_hash: H256) -> VaultResult<bool> {
        if owner == self.signer.address() {
            return Ok(true);
        }
        self.ledger.is_hash_approved(self.address, owner, safe_tx_hash).await
    }
}

fn ensure_version(expected: SafeVersion, reported: &str) -> VaultResult<()> {
    match reported.parse::<SafeVersion>() {
        Ok(actual) if actual == expected => Ok(()),
        _ => Err(VaultError::version_mismatch(expected, reported)),
    }
}

/// Decode a stored confirmation and check it recovers to `owner`
fn verify_confirmation(
    owner: Address,
    encoded: &str,
    safe_tx_hash: &H256,
) -> VaultResult<OwnerSignature> {
    let signature = decode_hex(owner, encoded)?;
    let recovered = signature.recover_owner(safe_tx_hash)?;
    if recovered != owner {
        return Err(VaultError::invalid_signature(format!(
            "Signature recovers to {:?}, not {:?}",
            recovered, owner
        )));
    }
    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::signature::encode_pre_validated;

    #[test]
    fn test_ensure_version() {
        assert!(ensure_version(SafeVersion::V1_1_1, "1.1.1").is_ok());
        assert!(ensure_version(SafeVersion::V1_3_0, "1.3.0+L2").is_ok());

        let err = ensure_version(SafeVersion::V1_1_1, "1.3.0").unwrap_err();
        assert_eq!(err.code, ErrorCode::VersionMismatch);
        let err = ensure_version(SafeVersion::V1_1_1, "garbage").unwrap_err();
        assert_eq!(err.code, ErrorCode::VersionMismatch);
    }

    #[test]
    fn test_verify_confirmation_pre_validated() {
        let owner = Address::from_low_u64_be(0xa1);
        let hex = encode_pre_validated(owner).to_hex();
        let hash = H256::repeat_byte(0x11);

        assert!(verify_confirmation(owner, &hex, &hash).is_ok());
        let other = Address::from_low_u64_be(0xa2);
        assert!(verify_confirmation(other, &hex, &hash).is_err());
    }
}
