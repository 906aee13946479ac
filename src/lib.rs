//! Vault Multisig Engine
//!
//! Builds, signs, collects approvals for and executes transactions on an
//! M-of-N multisignature vault contract.
//!
//! # Architecture
//!
//! This crate provides:
//! - **builder**: Normalize a partial request into a canonical transaction
//! - **hash**: EIP-712 transaction hash, versioned by vault contract
//! - **signature**: 65-byte owner signatures and v normalization
//! - **quorum**: Per-owner signature sets and threshold checks
//! - **gas**: Inner-call gas search and execution simulation
//! - **execution**: Ordered checks and submission of `execTransaction`
//! - **client**: Orchestrator bound to one vault
//! - **ledger** / **service** / **signer**: Collaborator traits with
//!   JSON-RPC, REST and local-key adapters
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vault_multisig::*;
//!
//! // Honour VAULT_DEBUG=1 for debug-level output
//! vault_multisig::utils::logging::init_from_env();
//!
//! let config = VaultConfig::new(1, "https://eth.llamarpc.com");
//! let signer = WalletSigner::from_private_key(&key_hex)?;
//! let ledger = RpcLedger::new(&config)?.with_wallet(signer.wallet().clone());
//! let service = TransactionServiceClient::new(&config)?;
//!
//! let client = VaultClient::create(
//!     vault,
//!     SafeVersion::V1_1_1,
//!     Arc::new(ledger),
//!     Arc::new(service),
//!     Arc::new(signer),
//!     config,
//! )
//! .await?;
//!
//! let proposed = client
//!     .propose_transaction(TransactionRequest::new(recipient, amount, Bytes::default()))
//!     .await?;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod execution;
pub mod gas;
pub mod hash;
pub mod ledger;
pub mod quorum;
pub mod serde_helpers;
pub mod service;
pub mod signature;
pub mod signer;
pub mod types;
pub mod utils;

// Re-export key types for convenience
pub use error::{ErrorCode, VaultError, VaultResult};
pub use types::*;

pub use client::{ProposedTransaction, VaultClient};
pub use config::{GasSearchConfig, VaultConfig};
pub use execution::{ExecutionOptions, ExecutionOutcome, ExecutionStage, PendingExecution};
pub use gas::ProbeOutcome;
pub use hash::HashScheme;
pub use ledger::{Ledger, RpcLedger};
pub use quorum::SignatureSet;
pub use service::{CoordinationService, TransactionServiceClient};
pub use signature::{OwnerSignature, SignatureError, SignatureKind, SigningMethod};
pub use signer::{Signer, WalletSigner};

pub use ethers_core::types::{Address, Bytes, H256, U256};
