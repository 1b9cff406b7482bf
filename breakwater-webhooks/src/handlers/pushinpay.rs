//! PushinPay webhook endpoint.
//!
//! PushinPay delivers PIX transaction updates keyed by the transaction
//! id the charge was created with, as JSON or form encoded bodies.
//! Transaction ids compare case-insensitively: the API returns them
//! uppercase but webhooks have been observed with either casing, so
//! lookups normalize to lowercase.
//!
//! Unlike the other providers, an unknown transaction answers 404.
//! PushinPay charges are always created by us, so "no such order" means
//! a real inconsistency rather than someone else's payment.

use std::sync::Arc;

use breakwater_core::{SecurityEventKind, TransitionOutcome};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::IngestionConfig;
use crate::error::{ErrorCode, WebhookError};
use crate::handlers::IngestionContext;
use crate::mappers::pushinpay_mapping;
use crate::ratelimit::RateLimiter;
use crate::request::InboundRequest;
use crate::response::{BASE_ALLOW_HEADERS, WebhookResponse};
use crate::verify::TokenVerifier;

const GATEWAY: &str = "pushinpay";

/// Header carrying the shared webhook token.
pub const TOKEN_HEADER: &str = "x-pushinpay-token";

#[derive(Debug, Default, Deserialize)]
struct PushinPayNotification {
    id: Option<String>,
    status: Option<String>,
    payer_name: Option<String>,
    payer_national_registration: Option<String>,
}

/// Handles PushinPay PIX webhooks.
pub struct PushinPayWebhookHandler {
    ctx: Arc<IngestionContext>,
    token: TokenVerifier,
    limiter: RateLimiter,
    allow_headers: String,
}

impl PushinPayWebhookHandler {
    pub fn new(ctx: Arc<IngestionContext>, config: &IngestionConfig) -> Self {
        Self {
            ctx,
            token: TokenVerifier::new(TOKEN_HEADER, config.pushinpay_token.clone()),
            limiter: RateLimiter::per_minute(config.pushinpay_rate_limit),
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
        if !self.limiter.allow(req) {
            warn!(
                max = self.limiter.max_requests(),
                window_secs = self.limiter.window().as_secs(),
                "PushinPay webhook rate limited"
            );
            return WebhookResponse::too_many_requests();
        }

        if let Err(err) = self.token.verify(req) {
            self.ctx
                .record_rejection(GATEWAY, SecurityEventKind::AccessDenied, req, &err);
            return WebhookResponse::error(&err);
        }

        let (payload, notification) = match parse_body(req) {
            Ok(parsed) => parsed,
            Err(resp) => return *resp,
        };

        let Some(id) = notification.id.as_deref().filter(|id| !id.is_empty()) else {
            return WebhookResponse::error(&WebhookError::new(
                ErrorCode::PaymentIdMissing,
                400,
                "Transaction ID missing in webhook",
            ));
        };
        let pix_id = id.to_lowercase();
        let status = notification.status.clone().unwrap_or_default().to_lowercase();

        let order = match self.ctx.orders.find_by_pix_id(&pix_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(pix_id = %pix_id, status = %status, "No order for PushinPay transaction");
                return WebhookResponse::error(&WebhookError::new(
                    ErrorCode::OrderNotFound,
                    404,
                    "No order for this transaction",
                ));
            }
            Err(err) => {
                error!(pix_id = %pix_id, error = %err, "Order lookup failed");
                self.ctx
                    .dead_letters
                    .save(
                        GATEWAY,
                        &status,
                        payload,
                        ErrorCode::InternalError.as_str(),
                        &err.to_string(),
                        None,
                        req.headers(),
                    )
                    .await;
                return WebhookResponse::error(&WebhookError::new(
                    ErrorCode::InternalError,
                    500,
                    "Failed to load order",
                ));
            }
        };

        // A `created` delivery repeats what charge creation already
        // recorded, and late ones arrive after payment. Acknowledge
        // without consulting the lattice.
        if status == "created" {
            debug!(order_id = %order.id, pix_id = %pix_id, "PushinPay charge created event");
            return WebhookResponse::received(json!({
                "order_id": order.id,
                "message": "Event logged",
            }));
        }

        if notification.payer_name.is_some() || notification.payer_national_registration.is_some()
        {
            if let Err(err) = self
                .ctx
                .orders
                .backfill_customer(
                    &order.id,
                    notification.payer_name.as_deref(),
                    notification.payer_national_registration.as_deref(),
                )
                .await
            {
                // Identity backfill is best effort; the transition matters more.
                warn!(order_id = %order.id, error = %err, "Customer backfill failed");
            }
        }

        let Some(mapping) = pushinpay_mapping(&status) else {
            info!(order_id = %order.id, status = %status, "Unknown PushinPay status, ignoring");
            return WebhookResponse::received(json!({
                "message": "Unknown status",
                "status": status,
            }));
        };

        match self.ctx.updater.apply(&order.id, &mapping, None, None).await {
            Ok(TransitionOutcome::Applied { event, status: new_status, .. }) => {
                info!(
                    order_id = %order.id,
                    pix_id = %pix_id,
                    status = new_status.as_str(),
                    event = event.as_str(),
                    "Order updated from PushinPay webhook"
                );
                self.ctx
                    .dispatch_side_effects(&order.id, event, new_status, &payload)
                    .await;
                WebhookResponse::received(json!({
                    "order_id": order.id,
                    "status": new_status.as_str(),
                    "event_type": event.as_str(),
                }))
            }
            Ok(TransitionOutcome::Duplicate) => {
                debug!(order_id = %order.id, status = %status, "Duplicate PushinPay delivery");
                WebhookResponse::received(json!({
                    "order_id": order.id,
                    "message": "Already processed",
                }))
            }
            Ok(TransitionOutcome::Ignored { reason }) => {
                info!(order_id = %order.id, reason = %reason, "PushinPay transition ignored");
                WebhookResponse::received(json!({ "order_id": order.id, "message": reason }))
            }
            Ok(TransitionOutcome::NotFound) => {
                warn!(order_id = %order.id, "Order disappeared during update");
                WebhookResponse::received(json!({ "message": "Order no longer exists" }))
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Order update failed, dead lettering");
                self.ctx
                    .dead_letters
                    .save(
                        GATEWAY,
                        &status,
                        payload,
                        ErrorCode::UpdateError.as_str(),
                        &err.to_string(),
                        Some(&order.id),
                        req.headers(),
                    )
                    .await;
                WebhookResponse::error(&WebhookError::new(
                    ErrorCode::UpdateError,
                    500,
                    "Failed to update order status",
                ))
            }
        }
    }
}

/// Accepts JSON and form encoded bodies, returning both the raw payload
/// for dead lettering and the typed notification.
fn parse_body(
    req: &InboundRequest,
) -> Result<(Value, PushinPayNotification), Box<WebhookResponse>> {
    if req.is_form_encoded() {
        let form = req.form();
        let notification = PushinPayNotification {
            id: form.get("id").cloned(),
            status: form.get("status").cloned(),
            payer_name: form.get("payer_name").cloned(),
            payer_national_registration: form.get("payer_national_registration").cloned(),
        };
        let payload = serde_json::to_value(&form).unwrap_or(Value::Null);
        return Ok((payload, notification));
    }

    let payload: Value = match req.json() {
        Ok(value) => value,
        Err(err) => {
            debug!(error = %err, "PushinPay webhook body is not valid JSON");
            return Err(Box::new(WebhookResponse::error(&WebhookError::new(
                ErrorCode::InternalError,
                400,
                "Invalid webhook body",
            ))));
        }
    };
    match serde_json::from_value(payload.clone()) {
        Ok(notification) => Ok((payload, notification)),
        Err(err) => {
            debug!(error = %err, "PushinPay webhook has unexpected shape");
            Err(Box::new(WebhookResponse::error(&WebhookError::new(
                ErrorCode::InternalError,
                400,
                "Invalid webhook body",
            ))))
        }
    }
}
