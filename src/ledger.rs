//! Ledger Access
//!
//! [`Ledger`] is the engine's view of the chain: vault contract reads,
//! simulation, gas estimation and transaction submission. [`RpcLedger`] is
//! the default adapter over Ethereum JSON-RPC; tests substitute in-memory
//! implementations.

use crate::config::VaultConfig;
use crate::contract;
use crate::error::{ErrorCode, VaultError, VaultResult};
use crate::types::{CallOutcome, CallRequest, Receipt};
use crate::utils::crypto::hash_hex;
use crate::{log_debug, log_error, log_info};
use async_trait::async_trait;
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{
    Address, Bytes, TransactionRequest as EthTransactionRequest, H256, U256, U64,
};
use ethers_signers::{LocalWallet, Signer as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Chain access used by the engine
///
/// Only `call`, `estimate_gas`, `submit`, `wait_for_receipt`, `balance` and
/// `chain_id` are primitive; the vault reads default to `eth_call`s against
/// the contract and may be overridden.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn chain_id(&self) -> VaultResult<u64>;

    async fn balance(&self, address: Address) -> VaultResult<U256>;

    /// Simulate a call; a revert is `CallOutcome::Reverted`, not an error
    async fn call(&self, request: &CallRequest) -> VaultResult<CallOutcome>;

    async fn estimate_gas(&self, request: &CallRequest) -> VaultResult<U256>;

    /// Sign and broadcast a state-changing transaction from `request.from`
    async fn submit(&self, request: &CallRequest) -> VaultResult<H256>;

    async fn wait_for_receipt(&self, tx_hash: H256) -> VaultResult<Receipt>;

    async fn owners(&self, vault: Address) -> VaultResult<Vec<Address>> {
        let output = view(self, vault, contract::get_owners_call()).await?;
        contract::decode_address_array(&output)
    }

    async fn threshold(&self, vault: Address) -> VaultResult<usize> {
        let output = view(self, vault, contract::get_threshold_call()).await?;
        let threshold = contract::decode_uint(&output)?;
        if threshold > U256::from(u32::MAX) {
            return Err(VaultError::parse_error("Threshold out of range")
                .with_details(threshold.to_string()));
        }
        Ok(threshold.as_usize())
    }

    async fn nonce(&self, vault: Address) -> VaultResult<U256> {
        let output = view(self, vault, contract::nonce_call()).await?;
        contract::decode_uint(&output)
    }

    async fn version(&self, vault: Address) -> VaultResult<String> {
        let output = view(self, vault, contract::version_call()).await?;
        contract::decode_string(&output)
    }

    /// `approvedHashes(owner, hash) != 0`
    async fn is_hash_approved(
        &self,
        vault: Address,
        owner: Address,
        tx_hash: H256,
    ) -> VaultResult<bool> {
        let output = view(self, vault, contract::approved_hashes_call(owner, tx_hash)).await?;
        Ok(!contract::decode_uint(&output)?.is_zero())
    }
}

/// Read-only contract call that treats a revert as an error
async fn view<L: Ledger + ?Sized>(ledger: &L, vault: Address, data: Bytes) -> VaultResult<Bytes> {
    match ledger.call(&CallRequest::new(vault, data)).await? {
        CallOutcome::Success(output) => Ok(output),
        CallOutcome::Reverted(revert) => Err(VaultError::new(
            ErrorCode::NetworkError,
            format!("Read from {:?} reverted", vault),
        )
        .with_details(contract::decode_revert_reason(&revert))),
    }
}

// =============================================================================
// JSON-RPC adapter
// =============================================================================

/// RPC request structure
#[derive(Debug, Serialize)]
struct RpcRequest<T: Serialize> {
    jsonrpc: &'static str,
    method: &'static str,
    params: T,
    id: u64,
}

/// RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    data: Option<serde_json::Value>,
}

impl RpcError {
    /// Revert payload, if the node attached one
    fn revert_data(&self) -> Option<Bytes> {
        let raw = match self.data.as_ref()? {
            serde_json::Value::String(s) => s.as_str(),
            serde_json::Value::Object(map) => map.get("data")?.as_str()?,
            _ => return None,
        };
        hex::decode(raw.trim_start_matches("0x")).ok().map(Bytes::from)
    }

    fn is_revert(&self) -> bool {
        self.code == 3 || self.message.to_lowercase().contains("revert")
    }

    fn into_error(self, method: &str) -> VaultError {
        VaultError::network(format!("RPC {} failed ({}): {}", method, self.code, self.message))
    }
}

/// Call object for `eth_call` / `eth_estimateGas`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcCall {
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<Address>,
    to: Address,
    value: U256,
    data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas: Option<U256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gas_price: Option<U256>,
}

impl From<&CallRequest> for RpcCall {
    fn from(request: &CallRequest) -> Self {
        Self {
            from: request.from,
            to: request.to,
            value: request.value,
            data: request.data.clone(),
            gas: request.gas,
            gas_price: request.gas_price,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: H256,
    block_number: Option<U64>,
    gas_used: Option<U256>,
    status: Option<U64>,
}

impl From<RpcReceipt> for Receipt {
    fn from(receipt: RpcReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number.map(|n| n.as_u64()),
            gas_used: receipt.gas_used,
            // Pre-Byzantium receipts carry no status
            success: receipt.status.map(|s| !s.is_zero()).unwrap_or(true),
        }
    }
}

/// Ledger over Ethereum JSON-RPC
///
/// Submissions are signed locally with the configured wallet and sent with
/// `eth_sendRawTransaction` as legacy (EIP-155) transactions.
pub struct RpcLedger {
    url: String,
    client: reqwest::Client,
    chain_id: u64,
    wallet: Option<LocalWallet>,
    poll_interval: Duration,
    receipt_timeout: Duration,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(config: &VaultConfig) -> VaultResult<Self> {
        let url = crate::config::validate_endpoint(&config.rpc_url)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| VaultError::network(format!("Client error: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
            chain_id: config.chain_id,
            wallet: None,
            poll_interval: config.receipt_poll_interval(),
            receipt_timeout: config.receipt_timeout(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Attach the submitting account
    pub fn with_wallet(mut self, wallet: LocalWallet) -> Self {
        self.wallet = Some(wallet.with_chain_id(self.chain_id));
        self
    }

    /// Address transactions are submitted from, if a wallet is attached
    pub fn submitter(&self) -> Option<Address> {
        self.wallet.as_ref().map(|w| w.address())
    }

    async fn send<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> VaultResult<RpcResponse<R>> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        log_debug!("ledger", "rpc request", method = method);

        let response = self.client.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(VaultError::network(format!(
                "RPC endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| VaultError::parse_error(format!("Invalid RPC response: {}", e)))
    }

    async fn request<P: Serialize + Send + Sync, R: DeserializeOwned>(
        &self,
        method: &'static str,
        params: P,
    ) -> VaultResult<R> {
        let response: RpcResponse<R> = self.send(method, params).await?;
        if let Some(error) = response.error {
            return Err(error.into_error(method));
        }
        response
            .result
            .ok_or_else(|| VaultError::parse_error(format!("Empty result from {}", method)))
    }

    fn wallet_for(&self, from: Option<Address>) -> VaultResult<&LocalWallet> {
        let wallet = self
            .wallet
            .as_ref()
            .ok_or_else(|| VaultError::signing_failed("No submitting wallet configured"))?;
        match from {
            Some(from) if from != wallet.address() => Err(VaultError::invalid_input(format!(
                "Cannot submit from {:?}; wallet is {:?}",
                from,
                wallet.address()
            ))),
            _ => Ok(wallet),
        }
    }
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn chain_id(&self) -> VaultResult<u64> {
        let id: U256 = self.request("eth_chainId", ()).await?;
        Ok(id.low_u64())
    }

    async fn balance(&self, address: Address) -> VaultResult<U256> {
        self.request("eth_getBalance", (address, "latest")).await
    }

    async fn call(&self, request: &CallRequest) -> VaultResult<CallOutcome> {
        let response: RpcResponse<Bytes> = self
            .send("eth_call", (RpcCall::from(request), "latest"))
            .await?;

        match (response.result, response.error) {
            (_, Some(error)) => match error.revert_data() {
                Some(data) => Ok(CallOutcome::Reverted(data)),
                None if error.is_revert() => Ok(CallOutcome::Reverted(Bytes::default())),
                None => Err(error.into_error("eth_call")),
            },
            (Some(output), None) => Ok(CallOutcome::Success(output)),
            (None, None) => Ok(CallOutcome::Success(Bytes::default())),
        }
    }

    async fn estimate_gas(&self, request: &CallRequest) -> VaultResult<U256> {
        let response: RpcResponse<U256> =
            self.send("eth_estimateGas", [RpcCall::from(request)]).await?;

        match (response.result, response.error) {
            (_, Some(error)) if error.is_revert() => {
                let reason = error
                    .revert_data()
                    .map(|data| contract::decode_revert_reason(&data))
                    .unwrap_or(error.message);
                Err(VaultError::execution_would_revert(reason))
            }
            (_, Some(error)) => Err(error.into_error("eth_estimateGas")),
            (Some(gas), None) => Ok(gas),
            (None, None) => Err(VaultError::parse_error("Empty result from eth_estimateGas")),
        }
    }

    async fn submit(&self, request: &CallRequest) -> VaultResult<H256> {
        let wallet = self.wallet_for(request.from)?;
        let from = wallet.address();

        let nonce: U256 = self
            .request("eth_getTransactionCount", (from, "pending"))
            .await?;
        let gas_price = match request.gas_price {
            Some(price) => price,
            None => self.request("eth_gasPrice", ()).await?,
        };
        let gas = match request.gas {
            Some(gas) => gas,
            None => self.estimate_gas(&request.clone().from(from)).await?,
        };

        let tx = EthTransactionRequest::new()
            .from(from)
            .to(request.to)
            .value(request.value)
            .data(request.data.clone())
            .gas(gas)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id);

        let typed_tx: TypedTransaction = tx.into();
        let signature = wallet.sign_transaction(&typed_tx).await?;
        let raw = typed_tx.rlp_signed(&signature);

        let tx_hash: H256 = self
            .request("eth_sendRawTransaction", [format!("0x{}", hex::encode(&raw))])
            .await?;

        log_info!(
            "ledger",
            "transaction submitted",
            tx_hash = hash_hex(&tx_hash),
            nonce = nonce,
        );

        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> VaultResult<Receipt> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            let response: RpcResponse<RpcReceipt> = self
                .send("eth_getTransactionReceipt", [tx_hash])
                .await?;
            if let Some(error) = response.error {
                return Err(error.into_error("eth_getTransactionReceipt"));
            }
            if let Some(receipt) = response.result {
                return Ok(receipt.into());
            }
            if Instant::now() >= deadline {
                log_error!(
                    "ledger",
                    "gave up waiting for receipt",
                    tx_hash = hash_hex(&tx_hash),
                    waited_secs = self.receipt_timeout.as_secs(),
                );
                return Err(VaultError::new(
                    ErrorCode::Timeout,
                    format!("No receipt for {} yet", hash_hex(&tx_hash)),
                ));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_call_serialization() {
        let request = CallRequest::new(Address::from_low_u64_be(0xaa), vec![0x12u8, 0x34])
            .from(Address::from_low_u64_be(0xbb))
            .gas(U256::from(21_000u64));
        let json = serde_json::to_value(RpcCall::from(&request)).unwrap();

        assert_eq!(json["data"], "0x1234");
        assert_eq!(json["gas"], "0x5208");
        assert_eq!(json["value"], "0x0");
        assert!(json.get("gasPrice").is_none());
    }

    #[test]
    fn test_revert_data_extraction() {
        let error: RpcError = serde_json::from_str(
            r#"{"code": 3, "message": "execution reverted", "data": "0x08c379a0"}"#,
        )
        .unwrap();
        assert!(error.is_revert());
        assert_eq!(error.revert_data().unwrap().to_vec(), vec![0x08, 0xc3, 0x79, 0xa0]);

        let nested: RpcError = serde_json::from_str(
            r#"{"code": -32015, "message": "VM execution error", "data": {"data": "0xdead"}}"#,
        )
        .unwrap();
        assert_eq!(nested.revert_data().unwrap().to_vec(), vec![0xde, 0xad]);

        let plain: RpcError =
            serde_json::from_str(r#"{"code": -32000, "message": "header not found"}"#).unwrap();
        assert!(!plain.is_revert());
        assert!(plain.revert_data().is_none());
    }

    #[test]
    fn test_receipt_conversion() {
        let receipt: RpcReceipt = serde_json::from_str(
            r#"{
                "transactionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
                "blockNumber": "0x10",
                "gasUsed": "0x5208",
                "status": "0x0"
            }"#,
        )
        .unwrap();
        let receipt: Receipt = receipt.into();
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.gas_used, Some(U256::from(21_000u64)));
        assert!(!receipt.success);
    }

    #[test]
    fn test_rejects_remote_http_endpoint() {
        let config = VaultConfig::new(1, "http://rpc.example.org");
        assert!(RpcLedger::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_submit_without_wallet() {
        let ledger = RpcLedger::new(&VaultConfig::default()).unwrap();
        let err = ledger
            .submit(&CallRequest::new(Address::zero(), Bytes::default()))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SigningFailed);
    }
}
