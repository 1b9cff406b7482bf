//! MercadoPago HMAC signature verification.
//!
//! MercadoPago signs each notification with `x-signature: ts=...,v1=...`
//! where `v1` is an HMAC-SHA256 over the manifest
//! `id:{data_id};request-id:{request_id};ts:{ts};`. The `data_id` goes
//! into the manifest exactly as received; lowercasing it breaks
//! signatures for alphanumeric payment ids.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::error::{ErrorCode, WebhookError, WebhookResult};
use crate::request::InboundRequest;
use crate::verify::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Oldest signed timestamp accepted, in seconds.
pub const SIGNATURE_MAX_AGE_SECS: i64 = 300;

/// Header names MercadoPago signs with.
pub mod headers {
    /// Carries `ts=...,v1=...`.
    pub const SIGNATURE: &str = "x-signature";
    /// Request id included in the signed manifest.
    pub const REQUEST_ID: &str = "x-request-id";
}

/// Verifies MercadoPago webhook signatures.
///
/// A `None` secret is a deploy-time misconfiguration, reported per
/// request rather than at startup so the endpoint keeps answering.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    secret: Option<SecretString>,
    max_age_secs: i64,
}

impl SignatureVerifier {
    pub fn new(secret: Option<SecretString>) -> Self {
        Self {
            secret,
            max_age_secs: SIGNATURE_MAX_AGE_SECS,
        }
    }

    /// Overrides the acceptance window for signed timestamps.
    pub fn with_max_age_secs(mut self, max_age_secs: i64) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }

    /// Checks the request signature against the manifest built from
    /// `data_id`, the `x-request-id` header and the signed timestamp.
    ///
    /// Every rejection maps to 401 so MercadoPago marks the delivery
    /// failed without retrying a request that can never pass.
    pub fn verify(&self, req: &InboundRequest, data_id: &str) -> WebhookResult<()> {
        let Some(secret) = &self.secret else {
            return Err(WebhookError::new(
                ErrorCode::SecretNotConfigured,
                401,
                "Webhook secret not configured",
            ));
        };

        let (Some(signature), Some(request_id)) =
            (req.header(headers::SIGNATURE), req.header(headers::REQUEST_ID))
        else {
            return Err(WebhookError::new(
                ErrorCode::MissingSignatureHeaders,
                401,
                "Missing x-signature or x-request-id header",
            ));
        };

        let (ts, presented) = parse_signature(signature)?;
        let timestamp: i64 = ts.parse().map_err(|_| {
            WebhookError::new(
                ErrorCode::InvalidSignatureFormat,
                401,
                "Signature timestamp is not a number",
            )
        })?;

        // Future timestamps pass; only stale deliveries are refused.
        let age = chrono::Utc::now().timestamp() - timestamp;
        if age > self.max_age_secs {
            return Err(WebhookError::new(
                ErrorCode::WebhookExpired,
                401,
                format!("Webhook expired: signed {age}s ago"),
            ));
        }

        let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
        let expected = hmac_sha256_hex(secret.expose_secret(), manifest.as_bytes());

        if !constant_time_eq(presented, &expected) {
            return Err(WebhookError::new(
                ErrorCode::SignatureMismatch,
                401,
                "Signature mismatch",
            ));
        }

        Ok(())
    }
}

/// Splits `ts=...,v1=...` into its parts, tolerating whitespace around
/// the separators.
fn parse_signature(signature: &str) -> WebhookResult<(&str, &str)> {
    let mut ts = None;
    let mut v1 = None;

    for part in signature.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next().map(str::trim), kv.next().map(str::trim)) {
            (Some("ts"), Some(value)) => ts = Some(value),
            (Some("v1"), Some(value)) => v1 = Some(value),
            _ => {}
        }
    }

    match (ts, v1) {
        (Some(ts), Some(v1)) => Ok((ts, v1)),
        _ => Err(WebhookError::new(
            ErrorCode::InvalidSignatureFormat,
            401,
            "Expected signature in ts=...,v1=... format",
        )),
    }
}

fn hmac_sha256_hex(secret: &str, data: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take any size key");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";

    fn sign(data_id: &str, request_id: &str, ts: i64) -> String {
        let manifest = format!("id:{data_id};request-id:{request_id};ts:{ts};");
        let v1 = hmac_sha256_hex(SECRET, manifest.as_bytes());
        format!("ts={ts},v1={v1}")
    }

    fn signed_request(data_id: &str, ts: i64) -> InboundRequest {
        InboundRequest::post("{}")
            .with_header(headers::SIGNATURE, sign(data_id, "req-1", ts))
            .with_header(headers::REQUEST_ID, "req-1")
    }

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(Some(SecretString::from(SECRET)))
    }

    #[test]
    fn test_valid_signature_passes() {
        let req = signed_request("12345", chrono::Utc::now().timestamp());
        assert!(verifier().verify(&req, "12345").is_ok());
    }

    #[test]
    fn test_missing_secret_is_reported_per_request() {
        let req = signed_request("12345", chrono::Utc::now().timestamp());
        let err = SignatureVerifier::new(None).verify(&req, "12345").unwrap_err();

        assert_eq!(err.code, ErrorCode::SecretNotConfigured);
        assert_eq!(err.status, 401);
    }

    #[test]
    fn test_missing_headers_rejected() {
        let req = InboundRequest::post("{}");
        let err = verifier().verify(&req, "12345").unwrap_err();

        assert_eq!(err.code, ErrorCode::MissingSignatureHeaders);
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let req = InboundRequest::post("{}")
            .with_header(headers::SIGNATURE, "v2=deadbeef")
            .with_header(headers::REQUEST_ID, "req-1");
        let err = verifier().verify(&req, "12345").unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidSignatureFormat);
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let req = signed_request("12345", chrono::Utc::now().timestamp() - 400);
        let err = verifier().verify(&req, "12345").unwrap_err();

        assert_eq!(err.code, ErrorCode::WebhookExpired);
        assert_eq!(err.status, 401);
    }

    #[test]
    fn test_future_timestamp_within_clock_skew_passes() {
        let req = signed_request("12345", chrono::Utc::now().timestamp() + 100);
        assert!(verifier().verify(&req, "12345").is_ok());
    }

    #[test]
    fn test_tampered_payment_id_rejected() {
        let req = signed_request("12345", chrono::Utc::now().timestamp());
        let err = verifier().verify(&req, "99999").unwrap_err();

        assert_eq!(err.code, ErrorCode::SignatureMismatch);
    }

    #[test]
    fn test_data_id_case_is_significant() {
        let ts = chrono::Utc::now().timestamp();
        let req = signed_request("ABC123", ts);

        assert!(verifier().verify(&req, "ABC123").is_ok());
        assert_eq!(
            verifier().verify(&req, "abc123").unwrap_err().code,
            ErrorCode::SignatureMismatch
        );
    }

    #[test]
    fn test_signature_tolerates_spaces_after_comma() {
        let ts = chrono::Utc::now().timestamp();
        let manifest = format!("id:777;request-id:req-1;ts:{ts};");
        let v1 = hmac_sha256_hex(SECRET, manifest.as_bytes());
        let req = InboundRequest::post("{}")
            .with_header(headers::SIGNATURE, format!("ts={ts}, v1={v1}"))
            .with_header(headers::REQUEST_ID, "req-1");

        assert!(verifier().verify(&req, "777").is_ok());
    }
}
