//! Durable lifecycle event queue.
//!
//! When a status transition lands but its side-effect pipeline reports
//! failures, the handler records a [`LifecycleEvent`] here. The worker in
//! `breakwater-queue` drains unprocessed events in batches and re-runs the
//! pipeline. Events are marked, never deleted, so rows that exhaust their
//! retries stay visible for operators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::order::{EventType, OrderStatus};
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub order_id: String,
    /// Canonical status the order entered when the event was recorded.
    pub new_status: OrderStatus,
    pub event_type: EventType,
    /// Raw provider payload, kept for replay and debugging.
    pub payload: Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Version tag of the processor that completed or last attempted it.
    pub processed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(
        order_id: impl Into<String>,
        new_status: OrderStatus,
        event_type: EventType,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: order_id.into(),
            new_status,
            event_type,
            payload,
            processed: false,
            processed_at: None,
            retry_count: 0,
            last_error: None,
            processed_by: None,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait LifecycleEventStore: Send + Sync {
    async fn enqueue(&self, event: LifecycleEvent) -> StoreResult<Uuid>;

    /// Unprocessed events with `retry_count < max_retries`, oldest first,
    /// at most `limit`.
    async fn fetch_unprocessed(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> StoreResult<Vec<LifecycleEvent>>;

    async fn mark_processed(&self, id: Uuid, processor: &str) -> StoreResult<()>;

    /// Record a failed attempt: bumps the retry count and stores the error.
    async fn mark_error(&self, id: Uuid, error: &str, processor: &str) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<LifecycleEvent>>;
}

/// In-memory queue ordered by insertion.
#[derive(Debug, Default)]
pub struct MemoryLifecycleEventStore {
    events: RwLock<Vec<LifecycleEvent>>,
}

impl MemoryLifecycleEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl LifecycleEventStore for MemoryLifecycleEventStore {
    async fn enqueue(&self, event: LifecycleEvent) -> StoreResult<Uuid> {
        let id = event.id;
        self.events.write().await.push(event);
        Ok(id)
    }

    async fn fetch_unprocessed(
        &self,
        limit: usize,
        max_retries: u32,
    ) -> StoreResult<Vec<LifecycleEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| !event.processed && event.retry_count < max_retries)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: Uuid, processor: &str) -> StoreResult<()> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or(StoreError::EventNotFound(id))?;
        event.processed = true;
        event.processed_at = Some(Utc::now());
        event.processed_by = Some(processor.to_string());
        event.last_error = None;
        Ok(())
    }

    async fn mark_error(&self, id: Uuid, error: &str, processor: &str) -> StoreResult<()> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|event| event.id == id)
            .ok_or(StoreError::EventNotFound(id))?;
        event.retry_count += 1;
        event.last_error = Some(truncate_error(error));
        event.processed_by = Some(processor.to_string());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<LifecycleEvent>> {
        let events = self.events.read().await;
        Ok(events.iter().find(|event| event.id == id).cloned())
    }
}

const MAX_ERROR_LEN: usize = 1000;

// Char-based; provider messages carry multibyte text.
fn truncate_error(error: &str) -> String {
    if error.chars().count() <= MAX_ERROR_LEN {
        error.to_string()
    } else {
        let cut: String = error.chars().take(MAX_ERROR_LEN).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(order_id: &str) -> LifecycleEvent {
        LifecycleEvent::new(
            order_id,
            OrderStatus::Paid,
            EventType::PurchaseApproved,
            json!({"type": "payment"}),
        )
    }

    #[tokio::test]
    async fn test_fetch_honors_limit_and_order() {
        let store = MemoryLifecycleEventStore::new();
        for i in 0..5 {
            store.enqueue(event(&format!("order_{i}"))).await.unwrap();
        }

        let batch = store.fetch_unprocessed(3, 3).await.unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[0].order_id, "order_0");
        assert_eq!(batch[2].order_id, "order_2");
    }

    #[tokio::test]
    async fn test_processed_events_drop_out() {
        let store = MemoryLifecycleEventStore::new();
        let id = store.enqueue(event("order_1")).await.unwrap();
        store.enqueue(event("order_2")).await.unwrap();

        store.mark_processed(id, "worker/1").await.unwrap();

        let batch = store.fetch_unprocessed(10, 3).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].order_id, "order_2");

        let done = store.get(id).await.unwrap().unwrap();
        assert!(done.processed);
        assert!(done.processed_at.is_some());
        assert_eq!(done.processed_by.as_deref(), Some("worker/1"));
    }

    #[tokio::test]
    async fn test_retry_ceiling_hides_exhausted_events() {
        let store = MemoryLifecycleEventStore::new();
        let id = store.enqueue(event("order_1")).await.unwrap();

        for _ in 0..3 {
            store.mark_error(id, "mailer timeout", "worker/1").await.unwrap();
        }

        let batch = store.fetch_unprocessed(10, 3).await.unwrap();
        assert!(batch.is_empty());

        // Exhausted rows stay queryable, never deleted.
        let stuck = store.get(id).await.unwrap().unwrap();
        assert_eq!(stuck.retry_count, 3);
        assert_eq!(stuck.last_error.as_deref(), Some("mailer timeout"));
        assert!(!stuck.processed);
    }

    #[tokio::test]
    async fn test_mark_error_truncates() {
        let store = MemoryLifecycleEventStore::new();
        let id = store.enqueue(event("order_1")).await.unwrap();

        let long = "x".repeat(5000);
        store.mark_error(id, &long, "worker/1").await.unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        let error = stored.last_error.unwrap();
        assert_eq!(error.chars().count(), MAX_ERROR_LEN + 3);
        assert!(error.ends_with("..."));
    }

    #[tokio::test]
    async fn test_mark_unknown_event() {
        let store = MemoryLifecycleEventStore::new();
        let err = store
            .mark_processed(Uuid::new_v4(), "worker/1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EventNotFound(_)));
    }
}
