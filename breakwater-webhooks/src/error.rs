//! Error vocabulary for webhook ingestion.
//!
//! Providers key redelivery off the HTTP status line, but operators grep
//! logs and dead letter entries for the machine-readable codes below, so
//! every rejection carries both.

use std::fmt;

use thiserror::Error;

/// Result type for webhook verification and processing.
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Stable machine-readable codes carried in webhook error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Notification did not name a payment id.
    PaymentIdMissing,
    /// No order matches the provider's payment reference.
    OrderNotFound,
    /// Provider credentials are not configured for detail fetches.
    GatewayNotConfigured,
    /// Provider API returned an error while fetching payment detail.
    GatewayApiError,
    /// Order status update failed at the store.
    UpdateError,
    /// Unclassified processing failure.
    InternalError,
    /// Webhook secret or token is not configured.
    SecretNotConfigured,
    /// Request lacks the signature headers the provider documents.
    MissingSignatureHeaders,
    /// Signature header present but not in the documented format.
    InvalidSignatureFormat,
    /// Signed timestamp is older than the acceptance window.
    WebhookExpired,
    /// Computed HMAC does not match the presented signature.
    SignatureMismatch,
    /// Signature material could not be evaluated.
    ValidationError,
    /// Shared token or source address check failed.
    Unauthorized,
    /// Circuit breaker is open for the provider API.
    CircuitOpen,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentIdMissing => "PAYMENT_ID_MISSING",
            Self::OrderNotFound => "ORDER_NOT_FOUND",
            Self::GatewayNotConfigured => "GATEWAY_NOT_CONFIGURED",
            Self::GatewayApiError => "GATEWAY_API_ERROR",
            Self::UpdateError => "UPDATE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::SecretNotConfigured => "SECRET_NOT_CONFIGURED",
            Self::MissingSignatureHeaders => "MISSING_SIGNATURE_HEADERS",
            Self::InvalidSignatureFormat => "INVALID_SIGNATURE_FORMAT",
            Self::WebhookExpired => "WEBHOOK_EXPIRED",
            Self::SignatureMismatch => "SIGNATURE_MISMATCH",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::CircuitOpen => "CIRCUIT_OPEN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rejected or failed webhook request, ready to render as a coded
/// HTTP error response.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct WebhookError {
    /// Machine-readable code for the response body.
    pub code: ErrorCode,
    /// HTTP status the response should carry.
    pub status: u16,
    /// Human-readable detail, safe to return to the provider.
    pub message: String,
}

impl WebhookError {
    pub fn new(code: ErrorCode, status: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_render_screaming_snake() {
        assert_eq!(ErrorCode::PaymentIdMissing.as_str(), "PAYMENT_ID_MISSING");
        assert_eq!(ErrorCode::SignatureMismatch.as_str(), "SIGNATURE_MISMATCH");
        assert_eq!(ErrorCode::CircuitOpen.to_string(), "CIRCUIT_OPEN");
    }

    #[test]
    fn test_webhook_error_displays_message() {
        let err = WebhookError::new(ErrorCode::Unauthorized, 401, "Invalid webhook token");
        assert_eq!(err.to_string(), "Invalid webhook token");
        assert_eq!(err.status, 401);
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }
}
