//! Webhook ingestion for Breakwater payment providers.
//!
//! This crate turns provider webhooks into order transitions. Each
//! provider (Mercado Pago, Asaas, PushinPay) gets a handler that
//! authenticates the delivery with that provider's scheme, maps the
//! payload onto a canonical status transition, applies it through the
//! shared updater and runs delivery side effects inline. Failed side
//! effects are parked as lifecycle events for the queue worker;
//! notifications our own infrastructure dropped are dead lettered.
//!
//! Requests and responses are framework neutral: the embedding HTTP
//! layer converts to [`InboundRequest`], picks the provider slug off
//! the path and renders the returned [`WebhookResponse`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use breakwater_core::{
//!     DeadLetterQueue, MemoryDeadLetterStore, MemoryLifecycleEventStore, MemoryOrderStore,
//!     TracingAuditLog,
//! };
//! use breakwater_pipeline::{
//!     MemoryAccessProvisioner, MemoryAnalytics, MemoryMailer, OrderPipeline,
//!     OutboundNotifier, TargetRegistry,
//! };
//! use breakwater_webhooks::{
//!     InboundRequest, IngestionConfig, IngestionContext, WebhookRouter,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = Arc::new(OrderPipeline::new(
//!         Arc::new(MemoryAccessProvisioner::new()),
//!         Arc::new(MemoryMailer::new()),
//!         Arc::new(OutboundNotifier::new(Arc::new(TargetRegistry::new()))),
//!         Arc::new(MemoryAnalytics::new()),
//!     ));
//!     let ctx = Arc::new(IngestionContext::new(
//!         Arc::new(MemoryOrderStore::new()),
//!         Arc::new(MemoryLifecycleEventStore::new()),
//!         pipeline,
//!         DeadLetterQueue::new(Arc::new(MemoryDeadLetterStore::new())),
//!         Arc::new(TracingAuditLog),
//!     ));
//!
//!     let config = IngestionConfig::builder()
//!         .pushinpay_token("webhook-token")
//!         .build();
//!     let router = WebhookRouter::new(ctx, &config);
//!
//!     let req = InboundRequest::post(r#"{"id":"9c91a5e9","status":"paid"}"#)
//!         .with_header("x-pushinpay-token", "webhook-token");
//!     let resp = router.ingest("pushinpay", &req).await;
//!     println!("{} {}", resp.status(), resp.body());
//! }
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod mappers;
pub mod ratelimit;
pub mod request;
pub mod response;
pub mod router;
pub mod verify;

pub use config::{
    DEFAULT_MERCADOPAGO_RATE_LIMIT, DEFAULT_PUSHINPAY_RATE_LIMIT, IngestionConfig,
    IngestionConfigBuilder,
};
pub use error::{ErrorCode, WebhookError, WebhookResult};
pub use handlers::{
    AsaasWebhookHandler, IngestionContext, MercadoPagoWebhookHandler, PushinPayWebhookHandler,
};
pub use ratelimit::RateLimiter;
pub use request::InboundRequest;
pub use response::{BASE_ALLOW_HEADERS, WebhookResponse};
pub use router::WebhookRouter;
pub use verify::{ASAAS_SOURCE_IPS, AllowlistMode, IpAllowlist, SignatureVerifier, TokenVerifier};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::IngestionConfig;
    pub use crate::error::{ErrorCode, WebhookError, WebhookResult};
    pub use crate::handlers::IngestionContext;
    pub use crate::request::InboundRequest;
    pub use crate::response::WebhookResponse;
    pub use crate::router::WebhookRouter;
}
