//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum CashierError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Stripe {operation} failed: {message}")]
    RemoteApi {
        operation: &'static str,
        message: String,
    },

    #[error("Payment validation failed: {0}")]
    PaymentValidation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CashierError {
    /// Wrap a gateway failure with the operation that produced it.
    pub fn remote(operation: &'static str, err: impl std::fmt::Display) -> Self {
        CashierError::RemoteApi {
            operation,
            message: err.to_string(),
        }
    }
}

impl From<sqlx::Error> for CashierError {
    fn from(err: sqlx::Error) -> Self {
        CashierError::Database(err.to_string())
    }
}

pub type CashierResult<T> = Result<T, CashierError>;
