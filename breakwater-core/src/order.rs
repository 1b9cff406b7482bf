//! Canonical order model and status lattice.
//!
//! Every provider-specific payment state is normalized into [`OrderStatus`]
//! before anything downstream sees it. Transitions are monotonic: an order
//! can only move forward through the lattice, and a transition to the status
//! it already holds is a duplicate delivery, not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Canonical, provider-agnostic order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Awaiting payment (initial state).
    Pending,
    /// Payment confirmed by the provider.
    Paid,
    /// Payment attempt declined by the provider.
    Refused,
    /// Charge cancelled before completion.
    Cancelled,
    /// Full refund issued.
    Refunded,
    /// Partial refund issued.
    PartiallyRefunded,
    /// Payment disputed and reversed by the issuer.
    Chargeback,
}

impl OrderStatus {
    /// Lowercase wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refused => "refused",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::PartiallyRefunded => "partially_refunded",
            Self::Chargeback => "chargeback",
        }
    }

    /// Whether `next` is a legal forward move in the lattice.
    ///
    /// `pending → {paid, refused, cancelled}` and
    /// `paid → {refunded, partially_refunded, chargeback}`. A same-status
    /// transition is not "legal" here; callers treat it as a duplicate
    /// before consulting the lattice.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (
                Self::Pending,
                Self::Paid | Self::Refused | Self::Cancelled
            ) | (
                Self::Paid,
                Self::Refunded | Self::PartiallyRefunded | Self::Chargeback
            )
        )
    }

    /// Statuses that trigger the revoke-access path.
    pub fn is_refund_family(&self) -> bool {
        matches!(
            self,
            Self::Refunded | Self::PartiallyRefunded | Self::Chargeback
        )
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider sub-state that does not move the canonical lattice.
///
/// A PIX that expired or a refund the provider is still working through
/// leaves the canonical status untouched but is worth surfacing to
/// operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechnicalStatus {
    /// Charge expired before payment (PIX timeout, overdue invoice).
    Expired,
    /// Provider accepted a refund request and is processing it.
    RefundInProgress,
}

impl TechnicalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::RefundInProgress => "refund_in_progress",
        }
    }
}

/// Semantic event emitted alongside a status mapping.
///
/// This is the vocabulary the analytics dispatcher and outbound
/// notifications speak; it is deliberately coarser than provider event
/// names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PixGenerated,
    PurchaseApproved,
    PurchaseRefused,
    Refund,
    PartialRefund,
    Chargeback,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PixGenerated => "pix_generated",
            Self::PurchaseApproved => "purchase_approved",
            Self::PurchaseRefused => "purchase_refused",
            Self::Refund => "refund",
            Self::PartialRefund => "partial_refund",
            Self::Chargeback => "chargeback",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of mapping one provider status string.
///
/// `status: None` means the input is known but carries no canonical
/// transition (or is unknown entirely): the order row is left alone apart
/// from an optional technical status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMapping {
    /// Canonical status to move to, if any.
    pub status: Option<OrderStatus>,
    /// Semantic event for downstream consumers.
    pub event: EventType,
    /// Sub-state to record without moving the lattice.
    pub technical: Option<TechnicalStatus>,
}

impl StatusMapping {
    /// Mapping that applies a canonical transition.
    pub const fn to(status: OrderStatus, event: EventType) -> Self {
        Self {
            status: Some(status),
            event,
            technical: None,
        }
    }

    /// Mapping that records a technical sub-state only.
    pub const fn technical(event: EventType, technical: TechnicalStatus) -> Self {
        Self {
            status: None,
            event,
            technical: Some(technical),
        }
    }
}

/// Buyer identity attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub email: String,
    /// CPF or CNPJ, digits only.
    pub document: Option<String>,
    pub phone: Option<String>,
}

impl Customer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            document: None,
            phone: None,
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// A single purchase attempt.
///
/// Created by the checkout flow (outside this workspace); mutated
/// exclusively through [`crate::update::OrderUpdater`] once webhooks start
/// arriving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub vendor_id: String,
    pub product_id: String,
    pub offer_id: Option<String>,
    pub customer: Customer,
    /// Authoritative charge amount in minor units.
    pub amount: Money,
    pub status: OrderStatus,
    pub technical_status: Option<TechnicalStatus>,
    /// Provider the charge was created on, once known.
    pub gateway: Option<String>,
    /// Provider-assigned payment identifier.
    pub gateway_payment_id: Option<String>,
    /// PIX transaction identifier (PushinPay), lowercase.
    pub pix_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: impl Into<String>,
        vendor_id: impl Into<String>,
        product_id: impl Into<String>,
        customer: Customer,
        amount: Money,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            vendor_id: vendor_id.into(),
            product_id: product_id.into(),
            offer_id: None,
            customer,
            amount,
            status: OrderStatus::Pending,
            technical_status: None,
            gateway: None,
            gateway_payment_id: None,
            pix_id: None,
            created_at: now,
            paid_at: None,
            updated_at: now,
        }
    }

    pub fn with_offer(mut self, offer_id: impl Into<String>) -> Self {
        self.offer_id = Some(offer_id.into());
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    pub fn with_gateway_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.gateway_payment_id = Some(payment_id.into());
        self
    }

    pub fn with_pix_id(mut self, pix_id: impl Into<String>) -> Self {
        self.pix_id = Some(pix_id.into().to_lowercase());
        self
    }

    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    #[test]
    fn test_lattice_forward_moves() {
        use OrderStatus::*;

        assert!(Pending.can_transition_to(Paid));
        assert!(Pending.can_transition_to(Refused));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Paid.can_transition_to(Refunded));
        assert!(Paid.can_transition_to(PartiallyRefunded));
        assert!(Paid.can_transition_to(Chargeback));
    }

    #[test]
    fn test_lattice_rejects_backward_moves() {
        use OrderStatus::*;

        assert!(!Paid.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Paid));
        assert!(!Refused.can_transition_to(Paid));
        assert!(!Chargeback.can_transition_to(Pending));
        // Same-status is handled as a duplicate upstream, not a move.
        assert!(!Paid.can_transition_to(Paid));
    }

    #[test]
    fn test_refund_family() {
        assert!(OrderStatus::Refunded.is_refund_family());
        assert!(OrderStatus::PartiallyRefunded.is_refund_family());
        assert!(OrderStatus::Chargeback.is_refund_family());
        assert!(!OrderStatus::Paid.is_refund_family());
        assert!(!OrderStatus::Refused.is_refund_family());
    }

    #[test]
    fn test_status_serde_lowercase() {
        let json = serde_json::to_string(&OrderStatus::PartiallyRefunded).unwrap();
        assert_eq!(json, "\"partially_refunded\"");

        let back: OrderStatus = serde_json::from_str("\"chargeback\"").unwrap();
        assert_eq!(back, OrderStatus::Chargeback);
    }

    #[test]
    fn test_order_builder() {
        let order = Order::new(
            "order_42",
            "vendor_1",
            "product_1",
            Customer::new("Ana Souza", "ana@example.com").with_document("12345678900"),
            Money::brl(9900),
        )
        .with_gateway("mercadopago")
        .with_pix_id("ABC123");

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.pix_id.as_deref(), Some("abc123"));
        assert_eq!(order.amount.amount, 9900);
        assert!(order.paid_at.is_none());
    }

    #[test]
    fn test_status_mapping_constructors() {
        let m = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);
        assert_eq!(m.status, Some(OrderStatus::Paid));
        assert!(m.technical.is_none());

        let t = StatusMapping::technical(EventType::PixGenerated, TechnicalStatus::Expired);
        assert!(t.status.is_none());
        assert_eq!(t.technical, Some(TechnicalStatus::Expired));
    }
}
