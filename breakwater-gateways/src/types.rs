//! Charge types shared by every gateway adapter

use breakwater_core::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Canonical status a gateway reports for a freshly created charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Pending,
    Approved,
    Refused,
    Error,
}

/// Recipient role of a split portion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitRole {
    /// Vendor selling the product; keeps the remainder implicitly
    Producer,
    Platform,
    Affiliate,
}

impl SplitRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitRole::Producer => "producer",
            SplitRole::Platform => "platform",
            SplitRole::Affiliate => "affiliate",
        }
    }
}

/// One portion of a split charge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitRule {
    pub role: SplitRole,
    /// Recipient account at the provider (wallet id, collector id)
    pub recipient_id: Option<String>,
    /// Portion in minor units
    pub amount: i64,
}

impl SplitRule {
    pub fn new(role: SplitRole, amount: i64) -> Self {
        Self {
            role,
            recipient_id: None,
            amount,
        }
    }

    /// With recipient account id
    pub fn recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }
}

/// Charge request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Order being paid; doubles as external reference and idempotency key
    pub order_id: String,
    /// Amount to charge
    pub amount: Money,
    /// Customer name
    pub customer_name: String,
    /// Customer email
    pub customer_email: String,
    /// CPF (11 digits) or CNPJ (14 digits)
    pub customer_document: Option<String>,
    /// Description shown on the charge
    pub description: Option<String>,
    /// Tokenized card, required for card charges
    pub card_token: Option<String>,
    /// Card installments
    pub installments: Option<u32>,
    /// Split portions
    pub split_rules: Vec<SplitRule>,
    /// Metadata
    pub metadata: HashMap<String, String>,
}

impl ChargeRequest {
    /// Create a charge request for an order
    pub fn new(
        order_id: impl Into<String>,
        amount: Money,
        customer_name: impl Into<String>,
        customer_email: impl Into<String>,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            amount,
            customer_name: customer_name.into(),
            customer_email: customer_email.into(),
            customer_document: None,
            description: None,
            card_token: None,
            installments: None,
            split_rules: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// With customer document (CPF/CNPJ)
    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.customer_document = Some(document.into());
        self
    }

    /// With description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// With a tokenized card
    pub fn card_token(mut self, token: impl Into<String>) -> Self {
        self.card_token = Some(token.into());
        self
    }

    /// With card installments
    pub fn installments(mut self, installments: u32) -> Self {
        self.installments = Some(installments);
        self
    }

    /// Add a split portion
    pub fn split(mut self, rule: SplitRule) -> Self {
        self.split_rules.push(rule);
        self
    }

    /// With metadata
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Charge result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeResponse {
    /// Whether the provider accepted the charge
    pub success: bool,
    /// Provider-assigned payment id
    pub transaction_id: Option<String>,
    /// Canonical status
    pub status: GatewayPaymentStatus,
    /// PIX copy-paste code
    pub qr_code: Option<String>,
    /// PIX QR image, base64-encoded by the provider
    pub qr_code_base64: Option<String>,
    /// Raw provider payload, kept for debugging
    pub raw: Option<Value>,
    /// Provider error message, when not successful
    pub error_message: Option<String>,
}

impl ChargeResponse {
    /// Successful charge
    pub fn success(transaction_id: impl Into<String>, status: GatewayPaymentStatus) -> Self {
        Self {
            success: true,
            transaction_id: Some(transaction_id.into()),
            status,
            qr_code: None,
            qr_code_base64: None,
            raw: None,
            error_message: None,
        }
    }

    /// Failed charge
    pub fn failure(status: GatewayPaymentStatus, message: impl Into<String>) -> Self {
        Self {
            success: false,
            transaction_id: None,
            status,
            qr_code: None,
            qr_code_base64: None,
            raw: None,
            error_message: Some(message.into()),
        }
    }

    /// Synthetic response for an open circuit. No network I/O happened.
    pub fn unavailable(provider: &str) -> Self {
        Self::failure(
            GatewayPaymentStatus::Error,
            format!("{provider} temporarily unavailable, try again shortly"),
        )
    }

    /// With PIX QR code payloads
    pub fn with_qr(mut self, code: impl Into<String>, image_base64: Option<String>) -> Self {
        self.qr_code = Some(code.into());
        self.qr_code_base64 = image_base64;
        self
    }

    /// With the raw provider payload
    pub fn with_raw(mut self, raw: Value) -> Self {
        self.raw = Some(raw);
        self
    }

    /// True when the response is the open-circuit synthetic
    pub fn is_unavailable(&self) -> bool {
        !self.success
            && self
                .error_message
                .as_deref()
                .is_some_and(|m| m.contains("temporarily unavailable"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_request_builder() {
        let req = ChargeRequest::new("order_42", Money::brl(9900), "Ana Souza", "ana@example.com")
            .document("12345678901")
            .description("Curso de fotografia")
            .split(SplitRule::new(SplitRole::Affiliate, 990).recipient("wallet_abc"))
            .metadata("campaign", "launch");

        assert_eq!(req.order_id, "order_42");
        assert_eq!(req.amount.amount, 9900);
        assert_eq!(req.split_rules.len(), 1);
        assert_eq!(req.metadata.get("campaign"), Some(&"launch".to_string()));
        assert!(req.card_token.is_none());
    }

    #[test]
    fn test_unavailable_response() {
        let resp = ChargeResponse::unavailable("mercadopago");
        assert!(!resp.success);
        assert_eq!(resp.status, GatewayPaymentStatus::Error);
        assert!(resp.is_unavailable());

        let refused = ChargeResponse::failure(GatewayPaymentStatus::Refused, "insufficient funds");
        assert!(!refused.is_unavailable());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&GatewayPaymentStatus::Approved).unwrap();
        assert_eq!(json, "\"approved\"");
    }
}
