//! Coordination Service
//!
//! Off-chain store where owners exchange transaction proposals and
//! confirmations. It is advisory: the ledger stays authoritative for owners,
//! threshold and nonce, and every stored signature is re-verified before use.

use crate::config::VaultConfig;
use crate::error::{VaultError, VaultResult};
use crate::serde_helpers::{u256_dec, u256_dec_option};
use crate::signature::OwnerSignature;
use crate::types::{Operation, SafeTransaction};
use crate::utils::crypto::{hash_hex, to_checksum_address};
use crate::{log_debug, log_info};
use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, U256};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Vault state as cached by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceVaultInfo {
    pub address: Address,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub threshold: usize,
    pub owners: Vec<Address>,
    pub version: String,
}

/// One stored owner confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub owner: Address,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub signature_type: Option<String>,
}

/// A multisig transaction as stored by the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTransaction {
    pub safe: Address,
    pub to: Address,
    #[serde(with = "u256_dec")]
    pub value: U256,
    #[serde(default)]
    pub data: Option<Bytes>,
    pub operation: Operation,
    #[serde(with = "u256_dec")]
    pub safe_tx_gas: U256,
    #[serde(with = "u256_dec")]
    pub base_gas: U256,
    #[serde(with = "u256_dec")]
    pub gas_price: U256,
    #[serde(default)]
    pub gas_token: Option<Address>,
    #[serde(default)]
    pub refund_receiver: Option<Address>,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub safe_tx_hash: H256,
    #[serde(default)]
    pub is_executed: bool,
    /// Fee paid by the executor, once executed
    #[serde(default, with = "u256_dec_option")]
    pub fee: Option<U256>,
    #[serde(default)]
    pub confirmations_required: Option<usize>,
    #[serde(default)]
    pub confirmations: Vec<Confirmation>,
}

impl ServiceTransaction {
    /// Canonical transaction described by this record
    pub fn to_safe_transaction(&self) -> SafeTransaction {
        SafeTransaction {
            to: self.to,
            value: self.value,
            data: self.data.clone().unwrap_or_default(),
            operation: self.operation,
            safe_tx_gas: self.safe_tx_gas,
            base_gas: self.base_gas,
            gas_price: self.gas_price,
            gas_token: self.gas_token.unwrap_or_else(Address::zero),
            refund_receiver: self.refund_receiver.unwrap_or_else(Address::zero),
            nonce: self.nonce,
        }
    }
}

/// Paginated list response
#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

/// Body of a proposal POST; addresses are checksummed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionProposal {
    pub to: String,
    #[serde(with = "u256_dec")]
    pub value: U256,
    pub data: Option<String>,
    pub operation: Operation,
    #[serde(with = "u256_dec")]
    pub safe_tx_gas: U256,
    #[serde(with = "u256_dec")]
    pub base_gas: U256,
    #[serde(with = "u256_dec")]
    pub gas_price: U256,
    pub gas_token: Option<String>,
    pub refund_receiver: Option<String>,
    #[serde(with = "u256_dec")]
    pub nonce: U256,
    pub contract_transaction_hash: String,
    pub sender: String,
    pub signature: String,
}

impl TransactionProposal {
    pub fn new(
        tx: &SafeTransaction,
        safe_tx_hash: &H256,
        sender: Address,
        signature: &OwnerSignature,
    ) -> Self {
        let optional_address = |address: &Address| {
            if address.is_zero() {
                None
            } else {
                Some(to_checksum_address(address))
            }
        };

        Self {
            to: to_checksum_address(&tx.to),
            value: tx.value,
            data: if tx.data.is_empty() {
                None
            } else {
                Some(format!("0x{}", hex::encode(&tx.data)))
            },
            operation: tx.operation,
            safe_tx_gas: tx.safe_tx_gas,
            base_gas: tx.base_gas,
            gas_price: tx.gas_price,
            gas_token: optional_address(&tx.gas_token),
            refund_receiver: optional_address(&tx.refund_receiver),
            nonce: tx.nonce,
            contract_transaction_hash: hash_hex(safe_tx_hash),
            sender: to_checksum_address(&sender),
            signature: signature.to_hex(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ConfirmationBody {
    signature: String,
}

/// Off-chain coordination store
#[async_trait]
pub trait CoordinationService: Send + Sync {
    async fn vault_info(&self, vault: Address) -> VaultResult<ServiceVaultInfo>;

    /// Unexecuted transactions with nonce >= `min_nonce`
    async fn pending_transactions(
        &self,
        vault: Address,
        min_nonce: U256,
    ) -> VaultResult<Vec<ServiceTransaction>>;

    /// Stored transaction by hash, `None` if the service does not know it
    async fn transaction(&self, safe_tx_hash: H256) -> VaultResult<Option<ServiceTransaction>>;

    /// Store a new transaction with the proposer's signature
    async fn propose_transaction(
        &self,
        vault: Address,
        proposal: &TransactionProposal,
    ) -> VaultResult<()>;

    /// Attach an owner signature to a stored transaction
    async fn confirm_transaction(
        &self,
        safe_tx_hash: H256,
        signature: &OwnerSignature,
    ) -> VaultResult<()>;
}

/// REST client for the transaction service
pub struct TransactionServiceClient {
    base_url: String,
    client: reqwest::Client,
}

impl TransactionServiceClient {
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        let base_url = config.service_base_url()?;
        crate::config::validate_endpoint(&base_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VaultError::network(format!("Client error: {}", e)))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<R: DeserializeOwned>(&self, url: &str) -> VaultResult<Option<R>> {
        log_debug!("service", "GET", url = url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VaultError::network(format!("Service returned {}", status)).with_details(body));
        }
        let parsed = response
            .json()
            .await
            .map_err(|e| VaultError::parse_error(format!("Invalid service response: {}", e)))?;
        Ok(Some(parsed))
    }

    async fn post<B: Serialize + Sync>(&self, url: &str, body: &B) -> VaultResult<()> {
        log_debug!("service", "POST", url = url);
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => Err(
                VaultError::nonce_conflict(format!("Service rejected submission ({})", status))
                    .with_details(text),
            ),
            _ => Err(VaultError::network(format!("Service returned {}", status)).with_details(text)),
        }
    }
}

#[async_trait]
impl CoordinationService for TransactionServiceClient {
    async fn vault_info(&self, vault: Address) -> VaultResult<ServiceVaultInfo> {
        let url = self.url(&format!("/safes/{}/", to_checksum_address(&vault)));
        self.get(&url)
            .await?
            .ok_or_else(|| VaultError::invalid_address(format!("Service does not know vault {:?}", vault)))
    }

    async fn pending_transactions(
        &self,
        vault: Address,
        min_nonce: U256,
    ) -> VaultResult<Vec<ServiceTransaction>> {
        let mut url = Some(self.url(&format!(
            "/safes/{}/multisig-transactions/?executed=false&nonce__gte={}",
            to_checksum_address(&vault),
            min_nonce
        )));

        let mut transactions = Vec::new();
        while let Some(page_url) = url.take() {
            let page: Option<Page<ServiceTransaction>> = self.get(&page_url).await?;
            let Some(page) = page else { break };
            transactions.extend(page.results);
            url = page.next;
        }
        Ok(transactions)
    }

    async fn transaction(&self, safe_tx_hash: H256) -> VaultResult<Option<ServiceTransaction>> {
        let url = self.url(&format!("/multisig-transactions/{}/", hash_hex(&safe_tx_hash)));
        self.get(&url).await
    }

    async fn propose_transaction(
        &self,
        vault: Address,
        proposal: &TransactionProposal,
    ) -> VaultResult<()> {
        let url = self.url(&format!(
            "/safes/{}/multisig-transactions/",
            to_checksum_address(&vault)
        ));
        self.post(&url, proposal).await?;
        log_info!(
            "service",
            "transaction proposed",
            safe_tx_hash = proposal.contract_transaction_hash,
            nonce = proposal.nonce,
        );
        Ok(())
    }

    async fn confirm_transaction(
        &self,
        safe_tx_hash: H256,
        signature: &OwnerSignature,
    ) -> VaultResult<()> {
        let url = self.url(&format!(
            "/multisig-transactions/{}/confirmations/",
            hash_hex(&safe_tx_hash)
        ));
        let body = ConfirmationBody {
            signature: signature.to_hex(),
        };
        self.post(&url, &body).await?;
        log_info!(
            "service",
            "confirmation stored",
            safe_tx_hash = hash_hex(&safe_tx_hash),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::encode_pre_validated;

    const SAMPLE_TX: &str = r#"{
        "safe": "0x0000000000000000000000000000000000005AfE",
        "to": "0x0000000000000000000000000000000000000042",
        "value": "1000000000000000000",
        "data": null,
        "operation": 0,
        "safeTxGas": 43000,
        "baseGas": 0,
        "gasPrice": "0",
        "gasToken": "0x0000000000000000000000000000000000000000",
        "refundReceiver": "0x0000000000000000000000000000000000000000",
        "nonce": 3,
        "safeTxHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
        "isExecuted": false,
        "fee": null,
        "confirmationsRequired": 2,
        "confirmations": [
            {
                "owner": "0x00000000000000000000000000000000000000a1",
                "signature": "0x00",
                "signatureType": "EOA"
            }
        ]
    }"#;

    #[test]
    fn test_parse_service_transaction() {
        let tx: ServiceTransaction = serde_json::from_str(SAMPLE_TX).unwrap();
        assert_eq!(tx.value, U256::exp10(18));
        assert_eq!(tx.safe_tx_gas, U256::from(43_000u64));
        assert_eq!(tx.nonce, U256::from(3));
        assert_eq!(tx.confirmations.len(), 1);
        assert_eq!(tx.fee, None);

        let canonical = tx.to_safe_transaction();
        assert!(canonical.data.is_empty());
        assert!(canonical.gas_token.is_zero());
    }

    #[test]
    fn test_proposal_body() {
        let tx: ServiceTransaction = serde_json::from_str(SAMPLE_TX).unwrap();
        let sender = Address::from_low_u64_be(0xa1);
        let proposal = TransactionProposal::new(
            &tx.to_safe_transaction(),
            &tx.safe_tx_hash,
            sender,
            &encode_pre_validated(sender),
        );
        let json = serde_json::to_value(&proposal).unwrap();

        assert_eq!(json["value"], "1000000000000000000");
        assert_eq!(json["safeTxGas"], "43000");
        assert_eq!(json["operation"], 0);
        assert_eq!(json["to"], "0x0000000000000000000000000000000000000042");
        assert!(json["gasToken"].is_null());
        assert_eq!(json["signature"].as_str().unwrap().len(), 2 + 130);
    }

    #[test]
    fn test_client_requires_known_network() {
        assert!(TransactionServiceClient::new(&VaultConfig::new(5, "http://localhost:8545")).is_err());
        let client = TransactionServiceClient::new(&VaultConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://safe-transaction.gnosis.io/api/v1");
    }
}
