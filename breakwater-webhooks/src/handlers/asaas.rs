//! Asaas webhook endpoint.
//!
//! Asaas sends `{event, payment}` envelopes authenticated by a shared
//! token in `asaas-access-token`, optionally cross-checked against the
//! published sender addresses. Mapping keys off the event name: Asaas
//! events already say what happened, and the embedded payment status
//! lags the event during refund processing.
//!
//! The order id travels in `payment.externalReference`, set when the
//! charge was created. The Asaas payment id is written back to the
//! order on the first transition so later lookups can go the other way.

use std::sync::Arc;

use breakwater_core::{SecurityEventKind, TransitionOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::IngestionConfig;
use crate::error::{ErrorCode, WebhookError};
use crate::handlers::IngestionContext;
use crate::mappers::asaas_mapping;
use crate::request::InboundRequest;
use crate::response::{BASE_ALLOW_HEADERS, WebhookResponse};
use crate::verify::{IpAllowlist, TokenVerifier};

const GATEWAY: &str = "asaas";

/// Header carrying the shared webhook token.
pub const TOKEN_HEADER: &str = "asaas-access-token";

#[derive(Debug, Deserialize)]
struct AsaasEnvelope {
    event: Option<String>,
    payment: Option<AsaasPayment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsaasPayment {
    id: Option<String>,
    external_reference: Option<String>,
    confirmed_date: Option<String>,
    payment_date: Option<String>,
}

/// Handles Asaas payment event webhooks.
pub struct AsaasWebhookHandler {
    ctx: Arc<IngestionContext>,
    token: TokenVerifier,
    allowlist: IpAllowlist,
    allow_headers: String,
}

impl AsaasWebhookHandler {
    pub fn new(ctx: Arc<IngestionContext>, config: &IngestionConfig) -> Self {
        Self {
            ctx,
            token: TokenVerifier::new(TOKEN_HEADER, config.asaas_token.clone()),
            allowlist: IpAllowlist::asaas(config.asaas_allowlist_mode),
            allow_headers: format!("{BASE_ALLOW_HEADERS}, {TOKEN_HEADER}"),
        }
    }

    pub async fn handle(&self, req: &InboundRequest) -> WebhookResponse {
        if req.is_preflight() {
            return WebhookResponse::preflight(&self.allow_headers);
        }
        self.process(req).await.with_allow_headers(&self.allow_headers)
    }

    async fn process(&self, req: &InboundRequest) -> WebhookResponse {
        if let Err(err) = self.token.verify(req) {
            self.ctx
                .record_rejection(GATEWAY, SecurityEventKind::AccessDenied, req, &err);
            return WebhookResponse::error(&err);
        }

        if let Err(err) = self.allowlist.verify(req) {
            self.ctx
                .record_rejection(GATEWAY, SecurityEventKind::AccessDenied, req, &err);
            return WebhookResponse::error(&err);
        }

        let payload: Value = match req.json() {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "Asaas webhook body is not valid JSON");
                return WebhookResponse::error(&WebhookError::new(
                    ErrorCode::InternalError,
                    400,
                    "Invalid JSON body",
                ));
            }
        };
        let envelope: AsaasEnvelope = match serde_json::from_value(payload.clone()) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(error = %err, "Asaas envelope has unexpected shape");
                return WebhookResponse::error(&WebhookError::new(
                    ErrorCode::InternalError,
                    400,
                    "Invalid event body",
                ));
            }
        };

        let event = envelope.event.unwrap_or_default();
        let Some(payment) = envelope.payment else {
            debug!(event = %event, "Asaas event without payment, acknowledging");
            return WebhookResponse::received(json!({ "message": "No payment in event" }));
        };

        let Some(mapping) = asaas_mapping(&event) else {
            debug!(event = %event, "Asaas event not processed");
            return WebhookResponse::received(json!({
                "message": "Event not processed",
                "event": event,
            }));
        };

        let Some(order_id) = payment.external_reference.as_deref().filter(|r| !r.is_empty())
        else {
            info!(event = %event, "Asaas payment without external reference, acknowledging");
            return WebhookResponse::received(json!({ "message": "No external reference" }));
        };

        match self.ctx.orders.get(order_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                info!(order_id = %order_id, event = %event, "No order for Asaas payment, acknowledging");
                return WebhookResponse::received(json!({ "message": "No matching order" }));
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "Order lookup failed, dead lettering");
                self.ctx
                    .dead_letters
                    .save(
                        GATEWAY,
                        &event,
                        payload,
                        ErrorCode::InternalError.as_str(),
                        &err.to_string(),
                        Some(order_id),
                        req.headers(),
                    )
                    .await;
                return WebhookResponse::received(json!({ "message": "Notification dead lettered" }));
            }
        }

        let paid_at = payment
            .confirmed_date
            .as_deref()
            .and_then(parse_asaas_date)
            .or_else(|| payment.payment_date.as_deref().and_then(parse_asaas_date));

        match self
            .ctx
            .updater
            .apply(order_id, &mapping, payment.id.as_deref(), paid_at)
            .await
        {
            Ok(TransitionOutcome::Applied { event: event_type, status, .. }) => {
                info!(
                    order_id = %order_id,
                    event = %event,
                    status = status.as_str(),
                    "Order updated from Asaas webhook"
                );
                self.ctx
                    .dispatch_side_effects(order_id, event_type, status, &payload)
                    .await;
                WebhookResponse::received(json!({
                    "order_id": order_id,
                    "status": status.as_str(),
                    "event_type": event_type.as_str(),
                    "asaas_payment_id": payment.id,
                }))
            }
            Ok(TransitionOutcome::Duplicate) => {
                debug!(order_id = %order_id, event = %event, "Duplicate Asaas delivery");
                WebhookResponse::received(json!({
                    "order_id": order_id,
                    "message": "Already processed",
                }))
            }
            Ok(TransitionOutcome::Ignored { reason }) => {
                info!(order_id = %order_id, event = %event, reason = %reason, "Asaas transition ignored");
                WebhookResponse::received(json!({ "order_id": order_id, "message": reason }))
            }
            Ok(TransitionOutcome::NotFound) => {
                warn!(order_id = %order_id, "Order disappeared during update");
                WebhookResponse::received(json!({ "message": "Order no longer exists" }))
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "Order update failed");
                WebhookResponse::error(&WebhookError::new(
                    ErrorCode::UpdateError,
                    500,
                    "Failed to update order status",
                ))
            }
        }
    }
}

/// Asaas dates come as `YYYY-MM-DD`, with full RFC 3339 on some
/// endpoints. Date-only values resolve to midnight UTC.
fn parse_asaas_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
