//! Vault Engine Configuration
//!
//! Runtime settings for the engine and its default adapters:
//! - Chain id and endpoints (ledger RPC, coordination service)
//! - HTTP and receipt timeouts
//! - Inner-call gas search tuning
//! - Gas token refund policy

use crate::error::{VaultError, VaultResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Coordination service hosts per network id
const SERVICE_HOSTS: &[(u64, &str)] = &[
    (1, "https://safe-transaction.gnosis.io"),
    (137, "https://safe-transaction.polygon.gnosis.io"),
    (56, "https://safe-transaction.bsc.gnosis.io"),
    (100, "https://safe-transaction.xdai.gnosis.io"),
];

/// API prefix appended to every service host
const SERVICE_API_PATH: &str = "/api/v1";

/// Upper bound on gas search rounds, whatever the configuration says
pub const MAX_GAS_SEARCH_ROUNDS: u32 = 10;

/// Tuning for the `requiredTxGas` probe-and-grow search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSearchConfig {
    /// Re-simulation rounds, at most [`MAX_GAS_SEARCH_ROUNDS`]
    pub max_rounds: u32,
    /// Headroom added in the first round, doubled after every miss
    pub initial_additional_gas: u64,
    /// Margin added on top of the probed figure
    pub probe_margin: u64,
}

impl Default for GasSearchConfig {
    fn default() -> Self {
        Self {
            max_rounds: MAX_GAS_SEARCH_ROUNDS,
            initial_additional_gas: 10_000,
            probe_margin: 10_000,
        }
    }
}

/// Engine configuration, loadable from JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    /// Overrides the per-network service host when set
    pub service_url: Option<String>,
    pub request_timeout_secs: u64,
    pub receipt_poll_interval_secs: u64,
    pub receipt_timeout_secs: u64,
    /// Accept transactions that refund in an ERC-20 gas token
    pub allow_gas_token_refunds: bool,
    pub gas: GasSearchConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            service_url: None,
            request_timeout_secs: 30,
            receipt_poll_interval_secs: 2,
            receipt_timeout_secs: 300,
            allow_gas_token_refunds: false,
            gas: GasSearchConfig::default(),
        }
    }
}

impl VaultConfig {
    pub fn new(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self {
            chain_id,
            rpc_url: rpc_url.into(),
            ..Default::default()
        }
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    pub fn from_json(json: &str) -> VaultResult<Self> {
        let config: VaultConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check endpoints and numeric bounds
    pub fn validate(&self) -> VaultResult<()> {
        validate_endpoint(&self.rpc_url)?;
        if let Some(ref service_url) = self.service_url {
            validate_endpoint(service_url)?;
        }
        if self.request_timeout_secs == 0 {
            return Err(VaultError::invalid_input("request_timeout_secs must be positive"));
        }
        if self.receipt_poll_interval_secs == 0 {
            return Err(VaultError::invalid_input(
                "receipt_poll_interval_secs must be positive",
            ));
        }
        if self.gas.max_rounds == 0 || self.gas.max_rounds > MAX_GAS_SEARCH_ROUNDS {
            return Err(VaultError::invalid_input(format!(
                "gas.max_rounds must be between 1 and {}",
                MAX_GAS_SEARCH_ROUNDS
            )));
        }
        Ok(())
    }

    /// Base URL of the coordination service, including the API prefix
    pub fn service_base_url(&self) -> VaultResult<String> {
        if let Some(ref url) = self.service_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        service_host(self.chain_id)
            .map(|host| format!("{}{}", host, SERVICE_API_PATH))
            .ok_or_else(|| {
                VaultError::invalid_input("Wrong network")
                    .with_details(format!("no coordination service for chain {}", self.chain_id))
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_secs(self.receipt_poll_interval_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

/// Service host for a network id
pub fn service_host(chain_id: u64) -> Option<&'static str> {
    SERVICE_HOSTS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, host)| *host)
}

/// Validate an endpoint URL
///
/// HTTPS is required except for local development hosts.
pub fn validate_endpoint(url: &str) -> VaultResult<Url> {
    let parsed = Url::parse(url)
        .map_err(|e| VaultError::invalid_input(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "https" => {}
        "http" => {
            let host = parsed.host_str().unwrap_or_default();
            if !(host == "localhost" || host == "127.0.0.1" || host.starts_with("192.168.")) {
                return Err(VaultError::invalid_input("HTTPS required for remote endpoints")
                    .with_details(url.to_string()));
            }
        }
        other => {
            return Err(VaultError::invalid_input(format!("Unsupported URL scheme: {}", other)));
        }
    }

    if parsed.host_str().is_none() {
        return Err(VaultError::invalid_input("URL has no host"));
    }

    Ok(parsed)
}
