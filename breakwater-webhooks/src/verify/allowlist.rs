//! Source address allowlisting.
//!
//! Asaas publishes the egress addresses its webhook senders use. The
//! allowlist ships in log-only mode so a provider-side address change
//! cannot silently drop payments; switch to enforce once the published
//! list has been stable in the logs.

use std::net::IpAddr;

use tracing::warn;

use crate::error::{ErrorCode, WebhookError, WebhookResult};
use crate::request::InboundRequest;

/// Egress addresses Asaas documents for webhook delivery.
pub const ASAAS_SOURCE_IPS: &[&str] = &[
    "52.67.12.206",
    "18.230.8.159",
    "54.94.136.112",
    "54.94.183.101",
];

/// What to do with a request from outside the allowlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllowlistMode {
    /// Reject with 403.
    Enforce,
    /// Log and let the request through.
    #[default]
    LogOnly,
}

/// Checks the peer address of inbound webhooks against a fixed list.
#[derive(Debug, Clone)]
pub struct IpAllowlist {
    allowed: Vec<IpAddr>,
    mode: AllowlistMode,
}

impl IpAllowlist {
    /// Builds an allowlist from textual addresses.
    ///
    /// # Panics
    ///
    /// Panics when an entry is not a valid IP address. The lists are
    /// compiled-in constants, so this fires at startup or never.
    pub fn new(addrs: &[&str], mode: AllowlistMode) -> Self {
        let allowed = addrs
            .iter()
            .map(|addr| addr.parse().expect("allowlist entries must be IP addresses"))
            .collect();
        Self { allowed, mode }
    }

    /// The published Asaas sender list.
    pub fn asaas(mode: AllowlistMode) -> Self {
        Self::new(ASAAS_SOURCE_IPS, mode)
    }

    pub fn mode(&self) -> AllowlistMode {
        self.mode
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.allowed.contains(&ip)
    }

    /// In enforce mode an unknown peer address also rejects: a missing
    /// address means the transport never captured one, and "could not
    /// check" must not read as "checked".
    pub fn verify(&self, req: &InboundRequest) -> WebhookResult<()> {
        match req.client_ip() {
            Some(ip) if self.contains(ip) => Ok(()),
            Some(ip) => match self.mode {
                AllowlistMode::Enforce => Err(WebhookError::new(
                    ErrorCode::Unauthorized,
                    403,
                    format!("Source address {ip} not in allowlist"),
                )),
                AllowlistMode::LogOnly => {
                    warn!(client_ip = %ip, "Webhook from address outside the allowlist");
                    Ok(())
                }
            },
            None => match self.mode {
                AllowlistMode::Enforce => Err(WebhookError::new(
                    ErrorCode::Unauthorized,
                    403,
                    "Source address unknown, allowlist enforced",
                )),
                AllowlistMode::LogOnly => {
                    warn!("Source address unknown, allowlist not evaluated");
                    Ok(())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_from(ip: &str) -> InboundRequest {
        InboundRequest::post("{}").with_client_ip(ip.parse().unwrap())
    }

    #[test]
    fn test_listed_address_passes_in_enforce_mode() {
        let allowlist = IpAllowlist::asaas(AllowlistMode::Enforce);
        for ip in ASAAS_SOURCE_IPS {
            assert!(allowlist.verify(&request_from(ip)).is_ok());
        }
    }

    #[test]
    fn test_unlisted_address_rejected_in_enforce_mode() {
        let allowlist = IpAllowlist::asaas(AllowlistMode::Enforce);
        let err = allowlist.verify(&request_from("198.51.100.7")).unwrap_err();

        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(err.status, 403);
        assert!(err.message.contains("198.51.100.7"));
    }

    #[test]
    fn test_unknown_address_rejected_in_enforce_mode() {
        let allowlist = IpAllowlist::asaas(AllowlistMode::Enforce);
        let err = allowlist.verify(&InboundRequest::post("{}")).unwrap_err();

        assert_eq!(err.status, 403);
    }

    #[test]
    fn test_log_only_mode_never_rejects() {
        let allowlist = IpAllowlist::asaas(AllowlistMode::LogOnly);

        assert!(allowlist.verify(&request_from("198.51.100.7")).is_ok());
        assert!(allowlist.verify(&InboundRequest::post("{}")).is_ok());
    }

    #[test]
    fn test_log_only_is_the_default_mode() {
        assert_eq!(AllowlistMode::default(), AllowlistMode::LogOnly);
    }
}
