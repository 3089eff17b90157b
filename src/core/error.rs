//! Error taxonomy for user-facing operations.

use crate::core::store::StoreError;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced at an operation boundary. The `Display` text of every
/// variant is what the user sees.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("Please enter a valid amount.")]
    InvalidAmount,

    #[error("No valid market price is available for this asset.")]
    InvalidPrice,

    #[error("Insufficient USD balance: required ${required:.2}, available ${available:.2}.")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("Please enter a gift card code.")]
    MissingCode,

    #[error("Message cannot be empty.")]
    EmptyMessage,

    #[error("{0}")]
    FeedUnavailable(String),

    #[error("{0}")]
    AuthFailure(String),

    #[error("Storage is unavailable: {0}")]
    StoreUnavailable(String),

    #[error("No account found for {0}.")]
    AccountNotFound(String),

    #[error("The account was modified concurrently. Please try again.")]
    WriteConflict,
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(_) => Error::WriteConflict,
            other => Error::StoreUnavailable(other.to_string()),
        }
    }
}
