//! Shared-token verification for providers without request signing.
//!
//! Asaas and PushinPay authenticate webhooks with a static token in a
//! provider-specific header. Comparison is constant time even though
//! the tokens are long-lived.

use secrecy::{ExposeSecret, SecretString};

use crate::error::{ErrorCode, WebhookError, WebhookResult};
use crate::request::InboundRequest;
use crate::verify::constant_time_eq;

/// Checks a static token carried in a request header.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    header: &'static str,
    token: Option<SecretString>,
}

impl TokenVerifier {
    /// The token is `None` when the deployment never configured one;
    /// that is a 500 at verification time, not a silent pass.
    pub fn new(header: &'static str, token: Option<SecretString>) -> Self {
        Self { header, token }
    }

    pub fn header(&self) -> &'static str {
        self.header
    }

    pub fn verify(&self, req: &InboundRequest) -> WebhookResult<()> {
        let Some(expected) = &self.token else {
            return Err(WebhookError::new(
                ErrorCode::SecretNotConfigured,
                500,
                "Webhook token not configured",
            ));
        };

        // An absent header must never pass, even against an empty
        // configured token.
        let presented = match req.header(self.header) {
            Some(value) if !value.is_empty() => value,
            _ => {
                return Err(WebhookError::new(
                    ErrorCode::Unauthorized,
                    401,
                    format!("Missing {} header", self.header),
                ));
            }
        };

        if !constant_time_eq(presented, expected.expose_secret()) {
            return Err(WebhookError::new(
                ErrorCode::Unauthorized,
                401,
                "Invalid webhook token",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(
            "asaas-access-token",
            Some(SecretString::from("tk_liveabc123")),
        )
    }

    #[test]
    fn test_matching_token_passes() {
        let req = InboundRequest::post("{}").with_header("asaas-access-token", "tk_liveabc123");
        assert!(verifier().verify(&req).is_ok());
    }

    #[test]
    fn test_unconfigured_token_is_server_error() {
        let req = InboundRequest::post("{}").with_header("asaas-access-token", "tk_liveabc123");
        let err = TokenVerifier::new("asaas-access-token", None)
            .verify(&req)
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::SecretNotConfigured);
        assert_eq!(err.status, 500);
    }

    #[test]
    fn test_missing_header_rejected() {
        let err = verifier().verify(&InboundRequest::post("{}")).unwrap_err();

        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.status, 401);
        assert!(err.message.contains("asaas-access-token"));
    }

    #[test]
    fn test_wrong_token_rejected() {
        let req = InboundRequest::post("{}").with_header("asaas-access-token", "tk_livewrong0");
        let err = verifier().verify(&req).unwrap_err();

        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.message, "Invalid webhook token");
    }

    #[test]
    fn test_empty_header_rejected_against_empty_token() {
        let verifier = TokenVerifier::new("x-pushinpay-token", Some(SecretString::from("")));
        let req = InboundRequest::post("{}").with_header("x-pushinpay-token", "");

        assert!(verifier.verify(&req).is_err());
    }
}
