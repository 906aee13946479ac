//! Unified error types for the vault engine
//!
//! Every fallible operation returns [`VaultResult`]. Errors carry a
//! machine-readable [`ErrorCode`] so callers can branch on the failure
//! class (retry a network error, rebuild on a nonce conflict, collect more
//! signatures) without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all vault operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl VaultError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, msg)
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAddress, msg)
    }

    pub fn invalid_signature(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidSignature, msg)
    }

    pub fn not_an_owner(owner: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::NotAnOwner,
            format!("{} is not an owner of this vault", owner),
        )
    }

    /// Quorum not reached; `missing` is `threshold - collected`
    pub fn insufficient_signatures(missing: usize) -> Self {
        let message = if missing > 1 {
            format!("There are {} signatures missing", missing)
        } else {
            format!("There is {} signature missing", missing)
        };
        Self::new(ErrorCode::InsufficientSignatures, message).with_details(missing.to_string())
    }

    pub fn insufficient_funds(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientFunds, msg)
    }

    pub fn execution_would_revert(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExecutionWouldRevert, "Execution simulation failed")
            .with_details(reason)
    }

    pub fn version_mismatch(expected: impl fmt::Display, actual: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::VersionMismatch,
            format!(
                "Current version {} not matched address version {}",
                expected, actual
            ),
        )
    }

    pub fn unsupported_operation(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedOperation, msg)
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NetworkError, msg)
    }

    pub fn nonce_too_low(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NonceTooLow, msg)
    }

    pub fn nonce_conflict(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NonceConflict, msg)
    }

    pub fn signing_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningFailed, msg)
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Number of missing signatures for an `InsufficientSignatures` error
    pub fn missing_signatures(&self) -> Option<usize> {
        if self.code != ErrorCode::InsufficientSignatures {
            return None;
        }
        self.details.as_deref().and_then(|d| d.parse().ok())
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for VaultError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Input errors
    InvalidInput,
    InvalidAddress,
    InvalidSignature,

    // Authorization errors
    NotAnOwner,
    InsufficientSignatures,

    // Vault state errors
    VersionMismatch,
    UnsupportedOperation,
    NonceTooLow,
    NonceConflict,

    // Execution errors
    InsufficientFunds,
    ExecutionWouldRevert,
    SigningFailed,

    // Network errors
    NetworkError,
    Timeout,

    // Parse errors
    ParseError,
    JsonError,
    HexError,

    // Internal
    Internal,
}

/// Result type alias for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

// Conversions from common error types

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for VaultError {
    fn from(e: hex::FromHexError) -> Self {
        VaultError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<reqwest::Error> for VaultError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VaultError::new(ErrorCode::Timeout, "Request timed out")
        } else if e.is_connect() {
            VaultError::new(ErrorCode::NetworkError, "Connection failed")
        } else {
            VaultError::new(ErrorCode::NetworkError, e.to_string())
        }
    }
}

impl From<ethers_core::abi::Error> for VaultError {
    fn from(e: ethers_core::abi::Error) -> Self {
        VaultError::new(ErrorCode::ParseError, format!("ABI error: {}", e))
    }
}

impl From<ethers_signers::WalletError> for VaultError {
    fn from(e: ethers_signers::WalletError) -> Self {
        VaultError::new(ErrorCode::SigningFailed, e.to_string())
    }
}

impl From<secp256k1::Error> for VaultError {
    fn from(e: secp256k1::Error) -> Self {
        VaultError::new(ErrorCode::InvalidSignature, format!("Secp256k1 error: {}", e))
    }
}
