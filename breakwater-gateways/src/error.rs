//! Error types for gateway operations

use breakwater_core::{Money, StoreError};
use thiserror::Error;

/// Gateway error types
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Non-positive or malformed charge amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Requested amount disagrees with the stored order amount
    #[error("Amount mismatch for order {order_id}: requested {requested}, stored {stored}")]
    AmountMismatch {
        order_id: String,
        requested: Money,
        stored: Money,
    },

    /// Split rules do not fit inside the order amount
    #[error("Invalid split: {0}")]
    InvalidSplit(String),

    /// Card charge without a card token
    #[error("Card token required for card charges")]
    MissingCardToken,

    /// Order referenced by the charge does not exist
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Operation the provider cannot perform
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    /// Provider rejected the request
    #[error("Provider error: {0}")]
    Provider(String),

    /// Transport failure talking to the provider
    #[error("Network error: {0}")]
    Network(String),

    /// Provider rejected our credentials
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Local configuration is missing or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage error from the order store
    #[error("Storage error: {0}")]
    Storage(String),

    /// Circuit breaker rejected the call before any I/O
    #[error("Circuit open for {0}")]
    CircuitOpen(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
