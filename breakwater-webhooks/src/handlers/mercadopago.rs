//! MercadoPago webhook endpoint.
//!
//! MercadoPago notifications carry only `{type, data.id}`; the payment
//! status lives behind an API fetch. The handler verifies the HMAC
//! signature, loads the payment detail through the circuit-broken
//! gateway client, maps the status and applies the transition.
//!
//! Acknowledgement policy: anything a redelivery cannot fix answers
//! 200. When our own infrastructure is the reason a processable
//! notification gets dropped, the payload is dead lettered first so it
//! can be replayed.

use std::sync::Arc;

use breakwater_core::{SecurityEventKind, TransitionOutcome};
use breakwater_gateways::{GatewayError, MercadoPagoGateway};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::config::IngestionConfig;
use crate::error::{ErrorCode, WebhookError};
use crate::handlers::IngestionContext;
use crate::mappers::mercadopago_mapping;
use crate::ratelimit::RateLimiter;
use crate::request::InboundRequest;
use crate::response::{BASE_ALLOW_HEADERS, WebhookResponse};
use crate::verify::SignatureVerifier;

const GATEWAY: &str = "mercadopago";

/// Notification body: `{"type": "payment", "data": {"id": ...}}`.
/// MercadoPago sends `data.id` as a string or a number depending on
/// the notification topic.
#[derive(Debug, Deserialize)]
struct MpNotification {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<MpNotificationData>,
}

#[derive(Debug, Deserialize)]
struct MpNotificationData {
    id: Option<Value>,
}

impl MpNotification {
    fn payment_id(&self) -> Option<String> {
        match self.data.as_ref()?.id.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Handles MercadoPago payment notifications.
pub struct MercadoPagoWebhookHandler {
    ctx: Arc<IngestionContext>,
    signature: SignatureVerifier,
    limiter: RateLimiter,
    gateway: Option<Arc<MercadoPagoGateway>>,
}

impl MercadoPagoWebhookHandler {
    pub fn new(ctx: Arc<IngestionContext>, config: &IngestionConfig) -> Self {
        let signature = SignatureVerifier::new(config.mercadopago_secret.clone())
            .with_max_age_secs(config.signature_max_age_secs);
        Self {
            ctx,
            signature,
            limiter: RateLimiter::per_minute(config.mercadopago_rate_limit),
            gateway: None,
        }
    }

    /// Attaches the API client used for payment detail fetches. Without
    /// one, verified notifications are dead lettered and acknowledged.
    pub fn with_gateway(mut self, gateway: Arc<MercadoPagoGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub async fn handle(&self, req: &InboundRequest) -> WebhookResponse {
        if req.is_preflight() {
            return WebhookResponse::preflight(BASE_ALLOW_HEADERS);
        }
        self.process(req).await.with_allow_headers(BASE_ALLOW_HEADERS)
    }

    async fn process(&self, req: &InboundRequest) -> WebhookResponse {
        if !self.limiter.allow(req) {
            warn!(
                max = self.limiter.max_requests(),
                window_secs = self.limiter.window().as_secs(),
                "MercadoPago webhook rate limited"
            );
            return WebhookResponse::too_many_requests();
        }

        let payload: Value = match req.json() {
            Ok(value) => value,
            Err(err) => {
                debug!(error = %err, "MercadoPago webhook body is not valid JSON");
                return WebhookResponse::error(&WebhookError::new(
                    ErrorCode::InternalError,
                    400,
                    "Invalid JSON body",
                ));
            }
        };
        let notification: MpNotification = match serde_json::from_value(payload.clone()) {
            Ok(notification) => notification,
            Err(err) => {
                debug!(error = %err, "MercadoPago notification has unexpected shape");
                return WebhookResponse::error(&WebhookError::new(
                    ErrorCode::InternalError,
                    400,
                    "Invalid notification body",
                ));
            }
        };

        if notification.kind.as_deref() != Some("payment") {
            debug!(
                kind = notification.kind.as_deref().unwrap_or("none"),
                "Ignoring non-payment MercadoPago notification"
            );
            return WebhookResponse::received(json!({ "message": "Event type ignored" }));
        }

        let Some(payment_id) = notification.payment_id() else {
            return WebhookResponse::error(&WebhookError::new(
                ErrorCode::PaymentIdMissing,
                400,
                "Payment ID missing in notification",
            ));
        };

        if let Err(err) = self.signature.verify(req, &payment_id) {
            self.ctx
                .record_rejection(GATEWAY, SecurityEventKind::WebhookRejected, req, &err);
            return WebhookResponse::error(&err);
        }

        let order = match self
            .ctx
            .orders
            .find_by_gateway_payment_id(GATEWAY, &payment_id)
            .await
        {
            Ok(Some(order)) => order,
            Ok(None) => {
                info!(payment_id = %payment_id, "No order for MercadoPago payment, acknowledging");
                return WebhookResponse::received(json!({ "message": "No matching order" }));
            }
            Err(err) => {
                warn!(payment_id = %payment_id, error = %err, "Order lookup failed, dead lettering");
                self.ctx
                    .dead_letters
                    .save(
                        GATEWAY,
                        "payment",
                        payload,
                        ErrorCode::InternalError.as_str(),
                        &err.to_string(),
                        None,
                        req.headers(),
                    )
                    .await;
                return WebhookResponse::received(json!({ "message": "Notification dead lettered" }));
            }
        };

        let Some(gateway) = &self.gateway else {
            warn!(
                payment_id = %payment_id,
                order_id = %order.id,
                code = ErrorCode::GatewayNotConfigured.as_str(),
                "MercadoPago API client not configured, dead lettering notification"
            );
            self.ctx
                .dead_letters
                .save(
                    GATEWAY,
                    "payment",
                    payload,
                    ErrorCode::GatewayNotConfigured.as_str(),
                    "MercadoPago API client not configured",
                    Some(&order.id),
                    req.headers(),
                )
                .await;
            return WebhookResponse::received(json!({ "message": "Gateway not configured" }));
        };

        let payment = match gateway.get_payment(&payment_id).await {
            Ok(payment) => payment,
            Err(err) => {
                let code = match &err {
                    GatewayError::CircuitOpen(_) => ErrorCode::CircuitOpen,
                    _ => ErrorCode::GatewayApiError,
                };
                warn!(
                    payment_id = %payment_id,
                    order_id = %order.id,
                    code = code.as_str(),
                    error = %err,
                    "Payment detail fetch failed, dead lettering"
                );
                self.ctx
                    .dead_letters
                    .save(
                        GATEWAY,
                        "payment",
                        payload,
                        code.as_str(),
                        &err.to_string(),
                        Some(&order.id),
                        req.headers(),
                    )
                    .await;
                return WebhookResponse::received(
                    json!({ "message": "Payment detail unavailable, notification dead lettered" }),
                );
            }
        };

        let Some(mapping) = mercadopago_mapping(&payment.status) else {
            info!(payment_id = %payment_id, status = %payment.status, "Unmapped MercadoPago status, ignoring");
            return WebhookResponse::received(json!({
                "message": "Unmapped payment status",
                "status": payment.status,
            }));
        };

        match self
            .ctx
            .updater
            .apply(&order.id, &mapping, None, payment.date_approved)
            .await
        {
            Ok(TransitionOutcome::Applied { event, status, .. }) => {
                info!(
                    order_id = %order.id,
                    payment_id = %payment_id,
                    status = status.as_str(),
                    event = event.as_str(),
                    "Order updated from MercadoPago webhook"
                );
                self.ctx
                    .dispatch_side_effects(&order.id, event, status, &payload)
                    .await;
                WebhookResponse::received(json!({
                    "order_id": order.id,
                    "status": status.as_str(),
                    "event_type": event.as_str(),
                }))
            }
            Ok(TransitionOutcome::Duplicate) => {
                debug!(order_id = %order.id, status = %payment.status, "Duplicate MercadoPago delivery");
                WebhookResponse::received(json!({
                    "order_id": order.id,
                    "message": "Already processed",
                }))
            }
            Ok(TransitionOutcome::Ignored { reason }) => {
                info!(order_id = %order.id, reason = %reason, "MercadoPago transition ignored");
                WebhookResponse::received(json!({ "order_id": order.id, "message": reason }))
            }
            Ok(TransitionOutcome::NotFound) => {
                warn!(order_id = %order.id, "Order disappeared during update");
                WebhookResponse::received(json!({ "message": "Order no longer exists" }))
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "Order update failed");
                WebhookResponse::error(&WebhookError::new(
                    ErrorCode::UpdateError,
                    500,
                    "Failed to update order status",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testutil::{TestContext, sign_mercadopago};

    fn handler(ctx: &TestContext) -> MercadoPagoWebhookHandler {
        let config = IngestionConfig::builder()
            .mercadopago_secret(crate::handlers::testutil::MP_SECRET)
            .build();
        MercadoPagoWebhookHandler::new(Arc::clone(&ctx.ctx), &config)
    }

    fn signed_notification(payment_id: &str) -> InboundRequest {
        let body = json!({ "type": "payment", "data": { "id": payment_id } }).to_string();
        let (signature, request_id) = sign_mercadopago(payment_id);
        InboundRequest::post(body)
            .with_header("x-signature", signature)
            .with_header("x-request-id", request_id)
    }

    #[tokio::test]
    async fn test_preflight_answers_ok() {
        let ctx = TestContext::new();
        let resp = handler(&ctx).handle(&InboundRequest::options()).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.header("access-control-allow-headers"),
            Some(BASE_ALLOW_HEADERS)
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_a_client_error() {
        let ctx = TestContext::new();
        let resp = handler(&ctx).handle(&InboundRequest::post("not json")).await;

        assert_eq!(resp.status(), 400);
        assert_eq!(resp.body()["code"], "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn test_non_payment_notification_is_ignored() {
        let ctx = TestContext::new();
        let req = InboundRequest::post(json!({ "type": "test" }).to_string());
        let resp = handler(&ctx).handle(&req).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body()["received"], true);
        assert_eq!(resp.body()["message"], "Event type ignored");
    }

    #[tokio::test]
    async fn test_missing_payment_id_is_a_client_error() {
        let ctx = TestContext::new();
        let req = InboundRequest::post(json!({ "type": "payment", "data": {} }).to_string());
        let resp = handler(&ctx).handle(&req).await;

        assert_eq!(resp.status(), 400);
        assert_eq!(resp.body()["code"], "PAYMENT_ID_MISSING");
    }

    #[tokio::test]
    async fn test_unsigned_notification_is_rejected_and_audited() {
        let ctx = TestContext::new();
        let body = json!({ "type": "payment", "data": { "id": "777" } }).to_string();
        let resp = handler(&ctx).handle(&InboundRequest::post(body)).await;

        assert_eq!(resp.status(), 401);
        assert_eq!(resp.body()["code"], "MISSING_SIGNATURE_HEADERS");

        let audited = ctx.audit.events();
        assert_eq!(audited.len(), 1);
        assert_eq!(audited[0].gateway, "mercadopago");
    }

    #[tokio::test]
    async fn test_unknown_payment_acknowledged_without_order() {
        let ctx = TestContext::new();
        let resp = handler(&ctx).handle(&signed_notification("42")).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.body()["message"], "No matching order");
    }

    #[tokio::test]
    async fn test_missing_gateway_client_dead_letters_the_notification() {
        let ctx = TestContext::new();
        ctx.insert_order(
            TestContext::pending_order("order-1")
                .with_gateway(GATEWAY)
                .with_gateway_payment_id("42"),
        )
        .await;

        let resp = handler(&ctx).handle(&signed_notification("42")).await;

        assert_eq!(resp.status(), 200);
        let entries = ctx.dead_letter_entries().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].error_code, "GATEWAY_NOT_CONFIGURED");
        assert_eq!(entries[0].order_id.as_deref(), Some("order-1"));
    }

    #[tokio::test]
    async fn test_rate_limit_answers_429() {
        let ctx = TestContext::new();
        let config = IngestionConfig::builder()
            .mercadopago_secret(crate::handlers::testutil::MP_SECRET)
            .mercadopago_rate_limit(1)
            .build();
        let handler = MercadoPagoWebhookHandler::new(Arc::clone(&ctx.ctx), &config);

        let req = InboundRequest::post("{}").with_client_ip("203.0.113.9".parse().unwrap());
        assert_ne!(handler.handle(&req).await.status(), 429);
        assert_eq!(handler.handle(&req).await.status(), 429);
    }
}
