use thiserror::Error;

use crate::domain::TxKind;

/// Main error type for the DCA client
#[derive(Error, Debug)]
pub enum DappError {
    // Connection errors
    #[error("Wallet connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Wrong network: required chain {required}, wallet is on chain {actual}")]
    WrongNetwork { required: u64, actual: u64 },

    #[error("Wallet not connected")]
    NotConnected,

    // Transaction errors
    #[error("Signature request rejected by user")]
    UserRejectedSignature,

    #[error("Transaction reverted on-chain: {reason}")]
    OnChainRevert { reason: String },

    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    // Input errors
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("A {0} flow is already in progress")]
    FlowBusy(TxKind),

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Crypto/signing errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Address parsing error: {0}")]
    AddressParsing(String),

    // Deployment errors
    #[error("Deployment failed: {0}")]
    Deployment(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for DappError
pub type Result<T> = std::result::Result<T, DappError>;

/// What a caller should do about an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Prompt the user to connect the wallet again
    Reconnect,
    /// Ask the user to switch the wallet to the required chain
    SwitchNetwork,
    /// Ask the user for a different amount
    ChangeInput,
    /// Same request may succeed if submitted again
    Retry,
    /// Not recoverable from the UI
    Internal,
}

impl DappError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DappError::ConnectionRefused(_) | DappError::NotConnected => ErrorCategory::Reconnect,
            DappError::WrongNetwork { .. } => ErrorCategory::SwitchNetwork,
            DappError::InvalidAmount(_) | DappError::OnChainRevert { .. } => {
                ErrorCategory::ChangeInput
            }
            DappError::UserRejectedSignature
            | DappError::NetworkTimeout(_)
            | DappError::FlowBusy(_) => ErrorCategory::Retry,
            _ => ErrorCategory::Internal,
        }
    }
}

/// Reason a pending transaction ended in `Failed`; stored in `TxPhase::Failed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxFailure {
    #[error("wallet not connected")]
    NotConnected,

    #[error("wrong network: required {required}, actual {actual}")]
    WrongNetwork { required: u64, actual: u64 },

    #[error("user rejected the signature request")]
    UserRejected,

    #[error("reverted: {reason}")]
    Reverted { reason: String },

    #[error("timed out: {0}")]
    Timeout(String),
}

/// JSON-RPC code wallets use for a declined request (EIP-1193)
pub const USER_REJECTED_CODE: i64 = 4001;

/// JSON-RPC code nodes use for `execution reverted`
pub const EXECUTION_REVERTED_CODE: i64 = 3;

/// Node-side rejections that will fail again unless the input or account changes
const NODE_REJECTIONS: [&str; 6] = [
    "insufficient funds",
    "nonce too low",
    "intrinsic gas too low",
    "gas required exceeds allowance",
    "exceeds block gas limit",
    "already known",
];

impl TxFailure {
    /// Classify a structured JSON-RPC error response.
    pub fn from_rpc_code(code: i64, message: &str) -> Self {
        match code {
            USER_REJECTED_CODE => TxFailure::UserRejected,
            EXECUTION_REVERTED_CODE => TxFailure::Reverted {
                reason: message.to_string(),
            },
            _ => Self::classify(message),
        }
    }

    /// Classify a raw provider/RPC error message when no structured code is available.
    ///
    /// Reverts are matched first: revert reasons and revert data are arbitrary text and may
    /// contain anything, including `4001`.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("revert") {
            TxFailure::Reverted {
                reason: message.to_string(),
            }
        } else if NODE_REJECTIONS.iter().any(|needle| lower.contains(needle)) {
            TxFailure::Reverted {
                reason: format!("rejected by node: {}", message),
            }
        } else if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected by user")
            || error_code(&lower) == Some(USER_REJECTED_CODE)
        {
            TxFailure::UserRejected
        } else {
            TxFailure::Timeout(message.to_string())
        }
    }
}

/// First `code` in the message followed by a whole number, e.g. `error code 4001` or
/// `"code":4001`.
fn error_code(lower: &str) -> Option<i64> {
    lower.match_indices("code").find_map(|(idx, _)| {
        let rest = lower[idx + "code".len()..]
            .trim_start_matches(|c: char| c == '"' || c == ':' || c == '=' || c.is_whitespace());
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '-'))
            .unwrap_or(rest.len());
        rest[..end].parse().ok()
    })
}

impl From<TxFailure> for DappError {
    fn from(failure: TxFailure) -> Self {
        match failure {
            TxFailure::NotConnected => DappError::NotConnected,
            TxFailure::WrongNetwork { required, actual } => {
                DappError::WrongNetwork { required, actual }
            }
            TxFailure::UserRejected => DappError::UserRejectedSignature,
            TxFailure::Reverted { reason } => DappError::OnChainRevert { reason },
            TxFailure::Timeout(msg) => DappError::NetworkTimeout(msg),
        }
    }
}
