//! Error to status mapping shared by the handlers.

use axum::http::StatusCode;
use defi_runtime::error::StorageError;
use defi_runtime::{AutomationError, WalletError};

pub type ApiError = (StatusCode, String);

pub fn wallet_error(e: WalletError) -> ApiError {
    let status = match &e {
        WalletError::NotInstalled(_) | WalletError::NoWalletAvailable => StatusCode::NOT_FOUND,
        WalletError::ConnectionRejected { .. } | WalletError::UserRejected { .. } => {
            StatusCode::FORBIDDEN
        }
        WalletError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        WalletError::NotConnected | WalletError::Busy | WalletError::AlreadyConnected(_) => {
            StatusCode::CONFLICT
        }
        WalletError::Popup(_) | WalletError::Extension { .. } | WalletError::Network(_) => {
            StatusCode::BAD_GATEWAY
        }
        WalletError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

pub fn automation_error(e: AutomationError) -> ApiError {
    let status = match &e {
        AutomationError::StrategyNotFound(_) | AutomationError::ExecutionNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        AutomationError::UnrecognizedCondition(_)
        | AutomationError::InvalidCondition { .. }
        | AutomationError::Config(_) => StatusCode::BAD_REQUEST,
        AutomationError::DuplicateStrategy(_) | AutomationError::ExecutionAlreadyCompleted(_) => {
            StatusCode::CONFLICT
        }
        AutomationError::MarketData(_) | AutomationError::ActionFailed(_) => StatusCode::BAD_GATEWAY,
        AutomationError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

pub fn storage_error(e: StorageError) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
