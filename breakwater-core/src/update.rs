//! Order update & dedup guard.
//!
//! Every webhook handler funnels its mapped status through
//! [`OrderUpdater::apply`]. The updater is the single place that enforces
//! the status lattice and collapses duplicate deliveries, so handlers never
//! need to reason about ordering or races themselves.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::order::{EventType, OrderStatus, StatusMapping};
use crate::store::{OrderStore, StatusUpdate, StoreResult};

/// What applying a provider mapping did to the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Status moved along the lattice; side effects should run.
    Applied {
        event: EventType,
        previous: OrderStatus,
        status: OrderStatus,
    },
    /// Redelivery of a status the order already holds. No write.
    Duplicate,
    /// No canonical transition (mapping carried none, or the lattice
    /// forbids the move).
    Ignored { reason: String },
    NotFound,
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Applies [`StatusMapping`]s to stored orders with dedup semantics.
pub struct OrderUpdater {
    store: Arc<dyn OrderStore>,
}

impl OrderUpdater {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Apply a mapped provider status to an order.
    ///
    /// Reads the current status and attempts a conditional write against it.
    /// A lost write re-reads and re-evaluates, so two concurrent deliveries
    /// of the same webhook produce exactly one `Applied`; the loser sees the
    /// winner's status and reports `Duplicate` or `Ignored`.
    pub async fn apply(
        &self,
        order_id: &str,
        mapping: &StatusMapping,
        gateway_payment_id: Option<&str>,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<TransitionOutcome> {
        let Some(target) = mapping.status else {
            return self.apply_technical_only(order_id, mapping).await;
        };

        loop {
            let Some(order) = self.store.get(order_id).await? else {
                return Ok(TransitionOutcome::NotFound);
            };

            if order.status == target {
                info!(
                    order_id,
                    status = target.as_str(),
                    "Duplicate delivery, status unchanged"
                );
                return Ok(TransitionOutcome::Duplicate);
            }

            if !order.status.can_transition_to(target) {
                warn!(
                    order_id,
                    from = order.status.as_str(),
                    to = target.as_str(),
                    "Transition rejected"
                );
                return Ok(TransitionOutcome::Ignored {
                    reason: format!("{} -> {} not allowed", order.status, target),
                });
            }

            let mut update = StatusUpdate::new(target);
            update.technical_status = mapping.technical;
            if let Some(payment_id) = gateway_payment_id {
                update = update.with_gateway_payment_id(payment_id);
            }
            if target == OrderStatus::Paid {
                update = update.with_paid_at(paid_at.unwrap_or_else(Utc::now));
            }

            let applied = self
                .store
                .update_status_if(order_id, order.status, update)
                .await?;
            if applied {
                info!(
                    order_id,
                    from = order.status.as_str(),
                    to = target.as_str(),
                    event = mapping.event.as_str(),
                    "Order status updated"
                );
                return Ok(TransitionOutcome::Applied {
                    event: mapping.event,
                    previous: order.status,
                    status: target,
                });
            }
            // Lost the write; re-read and re-evaluate.
        }
    }

    async fn apply_technical_only(
        &self,
        order_id: &str,
        mapping: &StatusMapping,
    ) -> StoreResult<TransitionOutcome> {
        if let Some(technical) = mapping.technical {
            if self.store.get(order_id).await?.is_none() {
                return Ok(TransitionOutcome::NotFound);
            }
            self.store
                .set_technical_status(order_id, Some(technical))
                .await?;
            info!(
                order_id,
                technical = technical.as_str(),
                event = mapping.event.as_str(),
                "Recorded technical status"
            );
        }
        Ok(TransitionOutcome::Ignored {
            reason: "no canonical transition".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::order::{Customer, Order, TechnicalStatus};
    use crate::store::{MemoryOrderStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn pending_order(id: &str) -> Order {
        Order::new(
            id,
            "vendor_1",
            "product_1",
            Customer::new("Ana Souza", "ana@example.com"),
            Money::brl(9900),
        )
    }

    async fn store_with(order: Order) -> Arc<MemoryOrderStore> {
        let store = Arc::new(MemoryOrderStore::new());
        store.insert(order).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_applies_forward_transition() {
        let store = store_with(pending_order("order_1")).await;
        let updater = OrderUpdater::new(store.clone());

        let mapping = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);
        let outcome = updater
            .apply("order_1", &mapping, Some("pay_123"), None)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TransitionOutcome::Applied {
                event: EventType::PurchaseApproved,
                previous: OrderStatus::Pending,
                status: OrderStatus::Paid,
            }
        );

        let stored = store.get("order_1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
        assert_eq!(stored.gateway_payment_id.as_deref(), Some("pay_123"));
        assert!(stored.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_second_delivery_is_duplicate() {
        let store = store_with(pending_order("order_1")).await;
        let updater = OrderUpdater::new(store);

        let mapping = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);
        let first = updater.apply("order_1", &mapping, None, None).await.unwrap();
        let second = updater.apply("order_1", &mapping, None, None).await.unwrap();

        assert!(first.is_applied());
        assert_eq!(second, TransitionOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_backward_transition_ignored() {
        let store = store_with(pending_order("order_1")).await;
        let updater = OrderUpdater::new(store.clone());

        let paid = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);
        updater.apply("order_1", &paid, None, None).await.unwrap();

        let pending = StatusMapping::to(OrderStatus::Pending, EventType::PixGenerated);
        let outcome = updater.apply("order_1", &pending, None, None).await.unwrap();

        assert!(matches!(outcome, TransitionOutcome::Ignored { .. }));
        let stored = store.get("order_1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let updater = OrderUpdater::new(Arc::new(MemoryOrderStore::new()));
        let mapping = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);

        let outcome = updater.apply("ghost", &mapping, None, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_technical_only_mapping() {
        let store = store_with(pending_order("order_1")).await;
        let updater = OrderUpdater::new(store.clone());

        let mapping = StatusMapping::technical(EventType::PixGenerated, TechnicalStatus::Expired);
        let outcome = updater.apply("order_1", &mapping, None, None).await.unwrap();

        assert!(matches!(outcome, TransitionOutcome::Ignored { .. }));
        let stored = store.get("order_1").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.technical_status, Some(TechnicalStatus::Expired));
    }

    #[tokio::test]
    async fn test_explicit_paid_at_wins() {
        let store = store_with(pending_order("order_1")).await;
        let updater = OrderUpdater::new(store.clone());

        let confirmed = Utc::now() - chrono::Duration::minutes(5);
        let mapping = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);
        updater
            .apply("order_1", &mapping, None, Some(confirmed))
            .await
            .unwrap();

        let stored = store.get("order_1").await.unwrap().unwrap();
        assert_eq!(stored.paid_at, Some(confirmed));
    }

    /// Store that loses the first conditional write to a simulated
    /// concurrent handler which lands the same transition.
    struct RacingStore {
        inner: MemoryOrderStore,
        writes: AtomicU32,
    }

    #[async_trait]
    impl OrderStore for RacingStore {
        async fn get(&self, order_id: &str) -> StoreResult<Option<Order>> {
            self.inner.get(order_id).await
        }

        async fn insert(&self, order: Order) -> StoreResult<()> {
            self.inner.insert(order).await
        }

        async fn find_by_gateway_payment_id(
            &self,
            gateway: &str,
            payment_id: &str,
        ) -> StoreResult<Option<Order>> {
            self.inner.find_by_gateway_payment_id(gateway, payment_id).await
        }

        async fn find_by_pix_id(&self, pix_id: &str) -> StoreResult<Option<Order>> {
            self.inner.find_by_pix_id(pix_id).await
        }

        async fn update_status_if(
            &self,
            order_id: &str,
            expected: OrderStatus,
            update: StatusUpdate,
        ) -> StoreResult<bool> {
            if self.writes.fetch_add(1, Ordering::SeqCst) == 0 {
                // The other delivery wins the write underneath us.
                self.inner
                    .update_status_if(order_id, expected, update)
                    .await?;
                return Ok(false);
            }
            self.inner.update_status_if(order_id, expected, update).await
        }

        async fn set_technical_status(
            &self,
            order_id: &str,
            technical: Option<TechnicalStatus>,
        ) -> StoreResult<()> {
            self.inner.set_technical_status(order_id, technical).await
        }

        async fn backfill_customer(
            &self,
            order_id: &str,
            name: Option<&str>,
            document: Option<&str>,
        ) -> StoreResult<()> {
            self.inner.backfill_customer(order_id, name, document).await
        }
    }

    #[tokio::test]
    async fn test_lost_write_reports_duplicate() {
        let store = Arc::new(RacingStore {
            inner: MemoryOrderStore::new(),
            writes: AtomicU32::new(0),
        });
        store.insert(pending_order("order_1")).await.unwrap();

        let updater = OrderUpdater::new(store.clone());
        let mapping = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);

        let outcome = updater.apply("order_1", &mapping, None, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Duplicate);
        assert_eq!(
            store.get("order_1").await.unwrap().unwrap().status,
            OrderStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        struct FailingStore;

        #[async_trait]
        impl OrderStore for FailingStore {
            async fn get(&self, _order_id: &str) -> StoreResult<Option<Order>> {
                Err(StoreError::Backend("connection reset".to_string()))
            }
            async fn insert(&self, _order: Order) -> StoreResult<()> {
                unreachable!()
            }
            async fn find_by_gateway_payment_id(
                &self,
                _gateway: &str,
                _payment_id: &str,
            ) -> StoreResult<Option<Order>> {
                unreachable!()
            }
            async fn find_by_pix_id(&self, _pix_id: &str) -> StoreResult<Option<Order>> {
                unreachable!()
            }
            async fn update_status_if(
                &self,
                _order_id: &str,
                _expected: OrderStatus,
                _update: StatusUpdate,
            ) -> StoreResult<bool> {
                unreachable!()
            }
            async fn set_technical_status(
                &self,
                _order_id: &str,
                _technical: Option<TechnicalStatus>,
            ) -> StoreResult<()> {
                unreachable!()
            }
            async fn backfill_customer(
                &self,
                _order_id: &str,
                _name: Option<&str>,
                _document: Option<&str>,
            ) -> StoreResult<()> {
                unreachable!()
            }
        }

        let updater = OrderUpdater::new(Arc::new(FailingStore));
        let mapping = StatusMapping::to(OrderStatus::Paid, EventType::PurchaseApproved);
        let err = updater.apply("order_1", &mapping, None, None).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
