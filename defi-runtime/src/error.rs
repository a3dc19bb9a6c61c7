use thiserror::Error;

use crate::types::WalletKind;

/// Errors surfaced by wallet capabilities and the connection session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("{0} wallet not installed")]
    NotInstalled(WalletKind),

    #[error("No Stellar wallet available")]
    NoWalletAvailable,

    #[error("{wallet} denied the connection request: {message}")]
    ConnectionRejected { wallet: WalletKind, message: String },

    #[error("User rejected the request in {wallet}: {message}")]
    UserRejected { wallet: WalletKind, message: String },

    #[error("Timed out after {secs}s waiting for {wallet}")]
    Timeout { wallet: WalletKind, secs: u64 },

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Another wallet operation is already in progress")]
    Busy,

    #[error("Already connected to {0}; disconnect first")]
    AlreadyConnected(WalletKind),

    #[error("Popup error: {0}")]
    Popup(String),

    #[error("Extension error in {wallet}: {message}")]
    Extension { wallet: WalletKind, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors from the persisted client-side storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(e: reqwest::Error) -> Self {
        WalletError::Network(e.to_string())
    }
}

/// Errors from the automation engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Unrecognized condition: {0}")]
    UnrecognizedCondition(String),

    #[error("Invalid condition '{condition}': {reason}")]
    InvalidCondition { condition: String, reason: String },

    #[error("Strategy not found: {0}")]
    StrategyNotFound(String),

    #[error("Strategy already exists: {0}")]
    DuplicateStrategy(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Execution {0} already completed")]
    ExecutionAlreadyCompleted(String),

    #[error("Market data unavailable: {0}")]
    MarketData(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for AutomationError {
    fn from(e: reqwest::Error) -> Self {
        AutomationError::MarketData(e.to_string())
    }
}

impl From<WalletError> for AutomationError {
    fn from(e: WalletError) -> Self {
        AutomationError::ActionFailed(e.to_string())
    }
}
