//! Provider webhook handlers.
//!
//! One handler per provider endpoint. Verification and flood control
//! differ per provider; from the mapping table onwards the flow is
//! shared: map the provider vocabulary, apply the transition through
//! the order updater, then run side effects for transitions that carry
//! them.

pub mod asaas;
pub mod mercadopago;
pub mod pushinpay;

pub use asaas::AsaasWebhookHandler;
pub use mercadopago::MercadoPagoWebhookHandler;
pub use pushinpay::PushinPayWebhookHandler;

use std::sync::Arc;

use breakwater_core::{
    AuditLog, DeadLetterQueue, EventType, LifecycleEvent, LifecycleEventStore, OrderStatus,
    OrderStore, OrderUpdater, SecurityEvent, SecurityEventKind,
};
use breakwater_pipeline::OrderPipeline;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::WebhookError;
use crate::request::InboundRequest;

/// Collaborators shared by every provider endpoint.
pub struct IngestionContext {
    orders: Arc<dyn OrderStore>,
    events: Arc<dyn LifecycleEventStore>,
    updater: OrderUpdater,
    pipeline: Arc<OrderPipeline>,
    dead_letters: DeadLetterQueue,
    audit: Arc<dyn AuditLog>,
}

impl IngestionContext {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        events: Arc<dyn LifecycleEventStore>,
        pipeline: Arc<OrderPipeline>,
        dead_letters: DeadLetterQueue,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        let updater = OrderUpdater::new(Arc::clone(&orders));
        Self {
            orders,
            events,
            updater,
            pipeline,
            dead_letters,
            audit,
        }
    }

    /// Records a rejected request in the audit trail.
    fn record_rejection(
        &self,
        gateway: &str,
        kind: SecurityEventKind,
        req: &InboundRequest,
        err: &WebhookError,
    ) {
        let mut event = SecurityEvent::new(kind, gateway, err.message.clone());
        if let Some(ip) = req.client_ip() {
            event = event.with_client_ip(ip.to_string());
        }
        self.audit.record(event);
    }

    /// Runs post-transition work for events that carry side effects.
    ///
    /// The order is reloaded first: the updater just rewrote it and the
    /// pipeline must see the post-transition row, not the one the
    /// handler looked up before applying. Failed steps park a lifecycle
    /// event so the worker retries them; the webhook is still
    /// acknowledged, because the provider cannot fix our mailer.
    async fn dispatch_side_effects(
        &self,
        order_id: &str,
        event: EventType,
        status: OrderStatus,
        payload: &Value,
    ) {
        let order = match self.orders.get(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(order_id, "Order vanished between update and side effects");
                return;
            }
            Err(err) => {
                self.park_for_retry(order_id, status, event, payload, &err.to_string())
                    .await;
                return;
            }
        };

        let report = match event {
            EventType::PurchaseApproved => self.pipeline.run_paid(&order, event).await,
            EventType::Refund | EventType::PartialRefund | EventType::Chargeback => {
                self.pipeline.run_refund(&order, event).await
            }
            // pix_generated and purchase_refused carry no side effects
            _ => return,
        };

        if report.has_failures() {
            let summary = report
                .error_summary()
                .unwrap_or_else(|| "Pipeline reported failures".to_string());
            self.park_for_retry(order_id, status, event, payload, &summary)
                .await;
        }
    }

    async fn park_for_retry(
        &self,
        order_id: &str,
        status: OrderStatus,
        event: EventType,
        payload: &Value,
        error: &str,
    ) {
        warn!(
            order_id,
            event = event.as_str(),
            error,
            "Side effects incomplete, queueing lifecycle event for the worker"
        );

        let mut lifecycle = LifecycleEvent::new(order_id, status, event, payload.clone());
        lifecycle.last_error = Some(error.to_string());

        match self.events.enqueue(lifecycle).await {
            Ok(event_id) => debug!(order_id, event_id = %event_id, "Lifecycle event queued"),
            Err(err) => warn!(order_id, error = %err, "Failed to queue lifecycle event"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for handler tests.

    use std::sync::Arc;

    use breakwater_core::{
        Customer, DeadLetterEntry, DeadLetterQueue, DeadLetterStore, MemoryAuditLog,
        MemoryDeadLetterStore, MemoryLifecycleEventStore, MemoryOrderStore, Money, Order,
        OrderStatus, OrderStore,
    };
    use breakwater_pipeline::{
        MemoryAccessProvisioner, MemoryAnalytics, MemoryMailer, OrderPipeline, OutboundNotifier,
        RetryPolicy, TargetRegistry,
    };
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    use super::IngestionContext;

    pub(crate) const MP_SECRET: &str = "mp-test-secret";
    pub(crate) const ASAAS_TOKEN: &str = "asaas-test-token";
    pub(crate) const PUSHINPAY_TOKEN: &str = "pushinpay-test-token";

    /// A full ingestion context over memory doubles, with handles kept
    /// for assertions.
    pub(crate) struct TestContext {
        pub ctx: Arc<IngestionContext>,
        pub orders: Arc<MemoryOrderStore>,
        pub events: Arc<MemoryLifecycleEventStore>,
        pub dead_letters: Arc<MemoryDeadLetterStore>,
        pub audit: Arc<MemoryAuditLog>,
        pub access: Arc<MemoryAccessProvisioner>,
        pub mailer: Arc<MemoryMailer>,
        pub analytics: Arc<MemoryAnalytics>,
    }

    impl TestContext {
        pub fn new() -> Self {
            let orders = Arc::new(MemoryOrderStore::new());
            let events = Arc::new(MemoryLifecycleEventStore::new());
            let dead_letters = Arc::new(MemoryDeadLetterStore::new());
            let audit = Arc::new(MemoryAuditLog::new());
            let access = Arc::new(MemoryAccessProvisioner::new());
            let mailer = Arc::new(MemoryMailer::new());
            let analytics = Arc::new(MemoryAnalytics::new());

            let notifier = Arc::new(
                OutboundNotifier::new(Arc::new(TargetRegistry::new()))
                    .with_retry_policy(RetryPolicy::none()),
            );
            let pipeline = Arc::new(OrderPipeline::new(
                access.clone(),
                mailer.clone(),
                notifier,
                analytics.clone(),
            ));

            let ctx = Arc::new(IngestionContext::new(
                orders.clone(),
                events.clone(),
                pipeline,
                DeadLetterQueue::new(dead_letters.clone()),
                audit.clone(),
            ));

            Self {
                ctx,
                orders,
                events,
                dead_letters,
                audit,
                access,
                mailer,
                analytics,
            }
        }

        pub fn pending_order(id: &str) -> Order {
            let customer = Customer::new("Ana Souza", "ana@example.com");
            Order::new(id, "vendor-1", "product-1", customer, Money::brl(19_900))
        }

        pub fn paid_order(id: &str) -> Order {
            let mut order = Self::pending_order(id);
            order.status = OrderStatus::Paid;
            order.paid_at = Some(chrono::Utc::now());
            order
        }

        pub async fn insert_order(&self, order: Order) {
            self.orders.insert(order).await.unwrap();
        }

        pub async fn dead_letter_entries(&self) -> Vec<DeadLetterEntry> {
            self.dead_letters.entries().await.unwrap()
        }
    }

    /// Signs a MercadoPago manifest for `payment_id` the way the
    /// provider does, returning the `x-signature` and `x-request-id`
    /// header values.
    pub(crate) fn sign_mercadopago(payment_id: &str) -> (String, String) {
        let request_id = "req-test-1".to_string();
        let ts = chrono::Utc::now().timestamp();
        let manifest = format!("id:{payment_id};request-id:{request_id};ts:{ts};");
        let mut mac = Hmac::<Sha256>::new_from_slice(MP_SECRET.as_bytes())
            .expect("HMAC can take any size key");
        mac.update(manifest.as_bytes());
        let v1 = hex::encode(mac.finalize().into_bytes());
        (format!("ts={ts},v1={v1}"), request_id)
    }
}
