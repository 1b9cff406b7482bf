//! Provider dispatch.
//!
//! One router owns all three provider handlers over a shared
//! [`IngestionContext`]. Callers resolve the provider segment of the
//! request path and hand the rest of the request over; everything
//! behind that line is framework agnostic.

use std::sync::Arc;

use breakwater_gateways::MercadoPagoGateway;
use serde_json::json;
use tracing::warn;

use crate::config::IngestionConfig;
use crate::handlers::{
    AsaasWebhookHandler, IngestionContext, MercadoPagoWebhookHandler, PushinPayWebhookHandler,
};
use crate::request::InboundRequest;
use crate::response::WebhookResponse;

/// Routes inbound webhook requests to the matching provider handler.
pub struct WebhookRouter {
    mercadopago: MercadoPagoWebhookHandler,
    asaas: AsaasWebhookHandler,
    pushinpay: PushinPayWebhookHandler,
}

impl WebhookRouter {
    /// Builds handlers for every provider from one config.
    ///
    /// Providers without credentials still get a handler; they answer
    /// each request with a coded error instead of failing at startup.
    pub fn new(ctx: Arc<IngestionContext>, config: &IngestionConfig) -> Self {
        Self {
            mercadopago: MercadoPagoWebhookHandler::new(Arc::clone(&ctx), config),
            asaas: AsaasWebhookHandler::new(Arc::clone(&ctx), config),
            pushinpay: PushinPayWebhookHandler::new(ctx, config),
        }
    }

    /// Attaches the Mercado Pago API client used to fetch payment
    /// detail before applying a transition.
    pub fn with_mercadopago_gateway(mut self, gateway: Arc<MercadoPagoGateway>) -> Self {
        self.mercadopago = self.mercadopago.with_gateway(gateway);
        self
    }

    /// Dispatches a request by provider slug.
    pub async fn ingest(&self, provider: &str, req: &InboundRequest) -> WebhookResponse {
        match provider {
            "mercadopago" => self.mercadopago.handle(req).await,
            "asaas" => self.asaas.handle(req).await,
            "pushinpay" => self.pushinpay.handle(req).await,
            other => {
                warn!(provider = %other, "Webhook for unknown provider");
                WebhookResponse::not_found(json!({
                    "error": format!("Unknown webhook provider: {other}"),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handlers::testutil::{PUSHINPAY_TOKEN, TestContext};

    #[tokio::test]
    async fn test_unknown_provider_is_not_found() {
        let ctx = TestContext::new();
        let router = WebhookRouter::new(Arc::clone(&ctx.ctx), &IngestionConfig::default());

        let resp = router.ingest("stripe", &InboundRequest::post("{}")).await;

        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn test_provider_slug_reaches_matching_handler() {
        let ctx = TestContext::new();
        let config = IngestionConfig::builder()
            .pushinpay_token(PUSHINPAY_TOKEN)
            .build();
        let router = WebhookRouter::new(Arc::clone(&ctx.ctx), &config);

        let req = InboundRequest::post("{}")
            .with_header("x-pushinpay-token", PUSHINPAY_TOKEN);
        let resp = router.ingest("pushinpay", &req).await;

        // Reached the PushinPay handler: authenticated, then rejected
        // for the missing transaction id.
        assert_eq!(resp.status(), 400);
        assert_eq!(resp.body()["code"], "PAYMENT_ID_MISSING");
    }

    #[tokio::test]
    async fn test_preflight_is_answered_per_provider() {
        let ctx = TestContext::new();
        let router = WebhookRouter::new(Arc::clone(&ctx.ctx), &IngestionConfig::default());

        let resp = router.ingest("asaas", &InboundRequest::options()).await;

        assert_eq!(resp.status(), 200);
        let allow = resp.header("access-control-allow-headers").unwrap();
        assert!(allow.contains("asaas-access-token"));
    }
}
