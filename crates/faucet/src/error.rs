//! Error types for the faucet ledger

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sled::transaction::TransactionError;
use tco2_common::{Address, Amount, CommonError};
use thiserror::Error;

/// Errors raised by token contracts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Unknown token: {0}")]
    UnknownToken(Address),

    #[error("ERC20: transfer amount exceeds balance ({balance} < {amount})")]
    InsufficientBalance { balance: Amount, amount: Amount },

    #[error("ERC20: insufficient allowance ({allowance} < {amount})")]
    InsufficientAllowance { allowance: Amount, amount: Amount },

    #[error("ERC20: transfer to the zero address")]
    ZeroAddress,

    #[error("ERC20: balance overflow")]
    Overflow,

    #[error("Token storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for TokenError {
    fn from(err: sled::Error) -> Self {
        TokenError::Storage(err.to_string())
    }
}

impl From<TransactionError<TokenError>> for TokenError {
    fn from(err: TransactionError<TokenError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => e.into(),
        }
    }
}

/// Faucet ledger errors
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Ownable: caller is not the owner")]
    Unauthorized { caller: Address },

    #[error("Token rejected")]
    TokenRejected(Address),

    #[error("Cannot withdraw that often")]
    WithdrawalTimeout { remaining_secs: u64 },

    #[error("Amount too high")]
    AmountTooHigh { amount: Amount, max: Amount },

    #[error("Ownable: new owner is the zero address")]
    InvalidOwner,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<CommonError> for FaucetError {
    fn from(err: CommonError) -> Self {
        FaucetError::InvalidInput(err.to_string())
    }
}

impl From<TransactionError<FaucetError>> for FaucetError {
    fn from(err: TransactionError<FaucetError>) -> Self {
        match err {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => FaucetError::DatabaseError(e),
        }
    }
}

impl From<JsonRejection> for FaucetError {
    fn from(rejection: JsonRejection) -> Self {
        FaucetError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for FaucetError {
    fn from(rejection: PathRejection) -> Self {
        FaucetError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for FaucetError {
    fn from(rejection: QueryRejection) -> Self {
        FaucetError::InvalidInput(rejection.body_text())
    }
}

impl From<bincode::Error> for FaucetError {
    fn from(err: bincode::Error) -> Self {
        FaucetError::Serialization(err.to_string())
    }
}

impl FaucetError {
    /// Stable machine-readable code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            FaucetError::Unauthorized { .. } => "UNAUTHORIZED",
            FaucetError::TokenRejected(_) => "TOKEN_REJECTED",
            FaucetError::WithdrawalTimeout { .. } => "WITHDRAWAL_TIMEOUT",
            FaucetError::AmountTooHigh { .. } => "AMOUNT_TOO_HIGH",
            FaucetError::InvalidOwner => "INVALID_OWNER",
            FaucetError::Token(_) => "TOKEN_ERROR",
            FaucetError::InvalidInput(_) => "INVALID_INPUT",
            FaucetError::DatabaseError(_) => "DATABASE_ERROR",
            FaucetError::Serialization(_) => "SERIALIZATION_ERROR",
            FaucetError::Config(_) => "CONFIG_ERROR",
            FaucetError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            FaucetError::Unauthorized { .. } => StatusCode::FORBIDDEN,
            FaucetError::TokenRejected(_) | FaucetError::AmountTooHigh { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            FaucetError::WithdrawalTimeout { .. } => StatusCode::TOO_MANY_REQUESTS,
            FaucetError::InvalidOwner | FaucetError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            FaucetError::Token(TokenError::UnknownToken(_)) => StatusCode::NOT_FOUND,
            FaucetError::Token(TokenError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            FaucetError::Token(_) => StatusCode::UNPROCESSABLE_ENTITY,
            FaucetError::DatabaseError(_)
            | FaucetError::Serialization(_)
            | FaucetError::Config(_)
            | FaucetError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if let FaucetError::WithdrawalTimeout { remaining_secs } = &self {
            body["retry_after_secs"] = json!(remaining_secs);
        }

        (status, Json(body)).into_response()
    }
}

pub type FaucetResult<T> = Result<T, FaucetError>;
