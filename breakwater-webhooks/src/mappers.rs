//! Provider vocabulary to canonical status mapping.
//!
//! One table per provider, checked in order. A miss means the input is
//! unknown to us: the handler logs it and acknowledges without touching
//! the order, because a redelivery of an unknown value will never start
//! succeeding.
//!
//! Rejected and cancelled are distinct targets on purpose. A declined
//! charge (`refused`) and a charge withdrawn before completion
//! (`cancelled`) answer different support questions.

use breakwater_core::{EventType, OrderStatus, StatusMapping, TechnicalStatus};

/// MercadoPago payment `status` values, as returned by the payment
/// detail fetch (the notification itself carries no status).
pub static MERCADOPAGO_STATUS_MAP: &[(&str, StatusMapping)] = &[
    (
        "approved",
        StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved),
    ),
    (
        "pending",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "in_process",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "in_mediation",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "rejected",
        StatusMapping::to(OrderStatus::Refused, EventType::PurchaseRefused),
    ),
    (
        "cancelled",
        StatusMapping::to(OrderStatus::Cancelled, EventType::PurchaseRefused),
    ),
    (
        "refunded",
        StatusMapping::to(OrderStatus::Refunded, EventType::Refund),
    ),
    (
        "charged_back",
        StatusMapping::to(OrderStatus::Chargeback, EventType::Chargeback),
    ),
];

/// Asaas webhook `event` names. Keyed by event rather than by the
/// embedded payment status: Asaas events already say what happened,
/// and payment status lags the event during refunds.
pub static ASAAS_EVENT_MAP: &[(&str, StatusMapping)] = &[
    (
        "PAYMENT_CONFIRMED",
        StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved),
    ),
    (
        "PAYMENT_RECEIVED",
        StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved),
    ),
    (
        "PAYMENT_CREATED",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "PAYMENT_AWAITING_RISK_ANALYSIS",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "PAYMENT_APPROVED_BY_RISK_ANALYSIS",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "PAYMENT_OVERDUE",
        StatusMapping::technical(EventType::PixGenerated, TechnicalStatus::Expired),
    ),
    (
        "PAYMENT_REFUNDED",
        StatusMapping::to(OrderStatus::Refunded, EventType::Refund),
    ),
    (
        "PAYMENT_PARTIALLY_REFUNDED",
        StatusMapping::to(OrderStatus::PartiallyRefunded, EventType::PartialRefund),
    ),
    (
        "PAYMENT_REFUND_REQUESTED",
        StatusMapping::technical(EventType::Refund, TechnicalStatus::RefundInProgress),
    ),
    (
        "PAYMENT_REFUND_IN_PROGRESS",
        StatusMapping::technical(EventType::Refund, TechnicalStatus::RefundInProgress),
    ),
    (
        "PAYMENT_CHARGEBACK_REQUESTED",
        StatusMapping::to(OrderStatus::Chargeback, EventType::Chargeback),
    ),
    (
        "PAYMENT_CHARGEBACK_DISPUTE",
        StatusMapping::to(OrderStatus::Chargeback, EventType::Chargeback),
    ),
    (
        "PAYMENT_DELETED",
        StatusMapping::to(OrderStatus::Cancelled, EventType::PurchaseRefused),
    ),
];

/// PushinPay PIX `status` values carried in the webhook body.
pub static PUSHINPAY_STATUS_MAP: &[(&str, StatusMapping)] = &[
    (
        "paid",
        StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved),
    ),
    (
        "created",
        StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated),
    ),
    (
        "expired",
        StatusMapping::technical(EventType::PixGenerated, TechnicalStatus::Expired),
    ),
    (
        "canceled",
        StatusMapping::to(OrderStatus::Cancelled, EventType::PurchaseRefused),
    ),
];

pub fn mercadopago_mapping(status: &str) -> Option<StatusMapping> {
    lookup(MERCADOPAGO_STATUS_MAP, status)
}

pub fn asaas_mapping(event: &str) -> Option<StatusMapping> {
    lookup(ASAAS_EVENT_MAP, event)
}

pub fn pushinpay_mapping(status: &str) -> Option<StatusMapping> {
    lookup(PUSHINPAY_STATUS_MAP, status)
}

fn lookup(table: &[(&str, StatusMapping)], key: &str) -> Option<StatusMapping> {
    table
        .iter()
        .find_map(|(candidate, mapping)| (*candidate == key).then_some(*mapping))
}
