use thiserror::Error;

/// Errors raised while parsing or converting shared primitives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Input was not valid hex
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded bytes had the wrong length
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Decimal amount could not be parsed
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Arithmetic overflowed the amount type
    #[error("Amount overflow")]
    Overflow,
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, CommonError>;

impl From<hex::FromHexError> for CommonError {
    fn from(err: hex::FromHexError) -> Self {
        CommonError::InvalidHex(err.to_string())
    }
}
