//! Error types for pipeline operations

use thiserror::Error;

/// Errors produced by pipeline collaborators.
///
/// The pipeline itself never propagates these out of a run; each step's
/// error is caught, recorded on the [`crate::PipelineReport`], and the
/// remaining steps still execute.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Access provisioning (grant or revoke) failed
    #[error("Access provisioning failed: {0}")]
    Access(String),

    /// Confirmation email could not be sent
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// Analytics dispatch failed
    #[error("Analytics dispatch failed: {0}")]
    Analytics(String),

    /// Outbound notification payload could not be serialized
    #[error("Payload error: {0}")]
    Payload(#[from] serde_json::Error),

    /// Webhook target rejected at registration
    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(#[from] url::ParseError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
