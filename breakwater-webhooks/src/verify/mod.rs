//! Request authentication for provider endpoints.
//!
//! Three schemes cover the three providers: HMAC signatures for
//! MercadoPago, shared tokens for Asaas and PushinPay, and a source
//! address allowlist for Asaas. Verifiers only judge the request; the
//! calling handler records the audit event and renders the response.

pub mod allowlist;
pub mod signature;
pub mod token;

pub use allowlist::{ASAAS_SOURCE_IPS, AllowlistMode, IpAllowlist};
pub use signature::SignatureVerifier;
pub use token::TokenVerifier;

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("deadbeef", "deadbeef"));
        assert!(!constant_time_eq("deadbeef", "deadbeee"));
        assert!(!constant_time_eq("deadbeef", "deadbee"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }
}
