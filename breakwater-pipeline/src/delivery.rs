//! Outbound notification payloads and delivery records.

use breakwater_core::{EventType, Order};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response bodies and error messages keep at most this many characters.
const MAX_STORED_BODY: usize = 1000;

/// JSON body sent to a vendor's webhook endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Delivery identifier, echoed in `X-Breakwater-Delivery-Id`.
    pub id: String,
    /// Event name, e.g. `purchase_approved`.
    pub event: String,
    pub timestamp: DateTime<Utc>,
    /// Order snapshot at notification time.
    pub data: serde_json::Value,
}

impl NotificationPayload {
    /// Snapshot `order` for delivery under `event`.
    ///
    /// The snapshot is a stable contract with vendor integrations: fields
    /// are only ever added, never renamed or removed.
    pub fn for_order(order: &Order, event: EventType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event: event.as_str().to_string(),
            timestamp: Utc::now(),
            data: serde_json::json!({
                "order_id": order.id,
                "vendor_id": order.vendor_id,
                "product_id": order.product_id,
                "offer_id": order.offer_id,
                "status": order.status.as_str(),
                "amount_cents": order.amount.amount,
                "currency": order.amount.currency.code(),
                "customer": {
                    "name": order.customer.name,
                    "email": order.customer.email,
                    "document": order.customer.document,
                    "phone": order.customer.phone,
                },
                "gateway": order.gateway,
                "gateway_payment_id": order.gateway_payment_id,
                "created_at": order.created_at,
                "paid_at": order.paid_at,
            }),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Where a delivery stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InProgress,
    Succeeded,
    /// Failed, another attempt is scheduled.
    Failed,
    /// Failed with no attempts left.
    PermanentlyFailed,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PermanentlyFailed)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Record of one notification delivery, kept for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundDelivery {
    /// Same id as the payload it carries.
    pub id: String,
    pub target_id: String,
    pub url: String,
    pub event: String,
    pub order_id: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_status_code: Option<u16>,
    pub last_error: Option<String>,
    /// Truncated response body from the last attempt.
    pub last_response_body: Option<String>,
    /// When the next attempt is due. `None` once terminal.
    pub next_retry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OutboundDelivery {
    pub fn new(
        payload: &NotificationPayload,
        target_id: impl Into<String>,
        url: impl Into<String>,
        order_id: impl Into<String>,
    ) -> Self {
        let created = Utc::now();
        Self {
            id: payload.id.clone(),
            target_id: target_id.into(),
            url: url.into(),
            event: payload.event.clone(),
            order_id: order_id.into(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_attempt: None,
            last_status_code: None,
            last_error: None,
            last_response_body: None,
            next_retry: None,
            created_at: created,
            updated_at: created,
        }
    }

    /// Book an attempt that just finished, whatever its outcome.
    fn touch(&mut self) {
        let now = Utc::now();
        self.attempts += 1;
        self.last_attempt = Some(now);
        self.updated_at = now;
    }

    pub fn mark_succeeded(&mut self, status_code: u16, response_body: Option<String>) {
        self.touch();
        self.status = DeliveryStatus::Succeeded;
        self.last_status_code = Some(status_code);
        self.last_response_body = response_body.map(|s| truncate(&s));
        self.last_error = None;
        self.next_retry = None;
    }

    /// Record a failed attempt. `next_retry: None` makes the failure
    /// permanent.
    pub fn mark_failed(&mut self, error: String, next_retry: Option<DateTime<Utc>>) {
        self.touch();
        self.status = match next_retry {
            Some(_) => DeliveryStatus::Failed,
            None => DeliveryStatus::PermanentlyFailed,
        };
        self.last_error = Some(truncate(&error));
        self.next_retry = next_retry;
    }

    pub fn mark_failed_with_status(
        &mut self,
        status_code: u16,
        response_body: Option<String>,
        next_retry: Option<DateTime<Utc>>,
    ) {
        self.last_status_code = Some(status_code);
        self.last_response_body = response_body.map(|s| truncate(&s));
        self.mark_failed(format!("HTTP {status_code}"), next_retry);
    }
}

// Char-based; vendor endpoints answer in whatever encoding they like.
fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_STORED_BODY {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX_STORED_BODY).collect();
        format!("{cut}...")
    }
}
