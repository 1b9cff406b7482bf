//! Order persistence contract.
//!
//! The relational store behind orders is an external collaborator; this
//! module defines the async trait the rest of the system programs against
//! plus an in-memory implementation used by tests and local runs. The one
//! hard requirement is `update_status_if`: a compare-and-set on the current
//! status, which is the synchronization point that keeps concurrent
//! duplicate webhook deliveries from double-applying a transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::order::{Order, OrderStatus, TechnicalStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(Uuid),

    #[error("Storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Fields written together when a status transition lands.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    /// Provider sub-state accompanying the transition. Overwrites the stored
    /// value, so a transition clears any stale technical marker.
    pub technical_status: Option<TechnicalStatus>,
    /// Set only when present; a transition without one keeps the stored id.
    pub gateway_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn new(status: OrderStatus) -> Self {
        Self {
            status,
            technical_status: None,
            gateway_payment_id: None,
            paid_at: None,
        }
    }

    pub fn with_gateway_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.gateway_payment_id = Some(payment_id.into());
        self
    }

    pub fn with_technical_status(mut self, technical: TechnicalStatus) -> Self {
        self.technical_status = Some(technical);
        self
    }

    pub fn with_paid_at(mut self, paid_at: DateTime<Utc>) -> Self {
        self.paid_at = Some(paid_at);
        self
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get(&self, order_id: &str) -> StoreResult<Option<Order>>;

    async fn insert(&self, order: Order) -> StoreResult<()>;

    /// Look up the order a provider webhook refers to by the payment id the
    /// provider issued at charge creation.
    async fn find_by_gateway_payment_id(
        &self,
        gateway: &str,
        payment_id: &str,
    ) -> StoreResult<Option<Order>>;

    /// PIX transaction id lookup. Ids are stored lowercased.
    async fn find_by_pix_id(&self, pix_id: &str) -> StoreResult<Option<Order>>;

    /// Conditional status write: applies `update` only while the stored
    /// status still equals `expected`. Returns `false` when another writer
    /// got there first.
    async fn update_status_if(
        &self,
        order_id: &str,
        expected: OrderStatus,
        update: StatusUpdate,
    ) -> StoreResult<bool>;

    /// Record a provider sub-state without moving the canonical status.
    async fn set_technical_status(
        &self,
        order_id: &str,
        technical: Option<TechnicalStatus>,
    ) -> StoreResult<()>;

    /// Fill missing customer identity from a webhook payload. Existing
    /// values are never overwritten.
    async fn backfill_customer(
        &self,
        order_id: &str,
        name: Option<&str>,
        document: Option<&str>,
    ) -> StoreResult<()>;
}

/// In-memory store keyed by order id.
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn get(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.orders.read().await.get(order_id).cloned())
    }

    async fn insert(&self, order: Order) -> StoreResult<()> {
        self.orders.write().await.insert(order.id.clone(), order);
        Ok(())
    }

    async fn find_by_gateway_payment_id(
        &self,
        gateway: &str,
        payment_id: &str,
    ) -> StoreResult<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|order| {
                order.gateway.as_deref() == Some(gateway)
                    && order.gateway_payment_id.as_deref() == Some(payment_id)
            })
            .cloned())
    }

    async fn find_by_pix_id(&self, pix_id: &str) -> StoreResult<Option<Order>> {
        let needle = pix_id.to_lowercase();
        let orders = self.orders.read().await;
        Ok(orders
            .values()
            .find(|order| order.pix_id.as_deref() == Some(needle.as_str()))
            .cloned())
    }

    async fn update_status_if(
        &self,
        order_id: &str,
        expected: OrderStatus,
        update: StatusUpdate,
    ) -> StoreResult<bool> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;

        if order.status != expected {
            return Ok(false);
        }

        order.status = update.status;
        order.technical_status = update.technical_status;
        if let Some(payment_id) = update.gateway_payment_id {
            order.gateway_payment_id = Some(payment_id);
        }
        if let Some(paid_at) = update.paid_at {
            order.paid_at = Some(paid_at);
        }
        order.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_technical_status(
        &self,
        order_id: &str,
        technical: Option<TechnicalStatus>,
    ) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
        order.technical_status = technical;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn backfill_customer(
        &self,
        order_id: &str,
        name: Option<&str>,
        document: Option<&str>,
    ) -> StoreResult<()> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;

        let mut changed = false;
        if let Some(name) = name
            && order.customer.name.is_empty()
        {
            order.customer.name = name.to_string();
            changed = true;
        }
        if let Some(document) = document
            && order.customer.document.is_none()
        {
            order.customer.document = Some(document.to_string());
            changed = true;
        }
        if changed {
            order.updated_at = Utc::now();
        }
        Ok(())
    }
}
