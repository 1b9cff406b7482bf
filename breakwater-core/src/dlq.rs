//! Dead letter queue for failed webhook processing.
//!
//! Anything that blows up after a webhook was accepted lands here with
//! enough context to replay it by hand. Saving is deliberately infallible:
//! a DLQ write failure must never stop the HTTP response from reaching the
//! provider, so backend errors are logged and swallowed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};
use uuid::Uuid;

use crate::store::StoreResult;

/// Headers whose values are secrets. Stored masked.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "x-pushinpay-token",
    "asaas-access-token",
    "x-signature",
];

const MAX_ERROR_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub gateway: String,
    pub event_type: String,
    pub payload: Value,
    pub error_code: String,
    /// Truncated to [`MAX_ERROR_LEN`] chars.
    pub error_message: String,
    pub order_id: Option<String>,
    /// Request headers with secret values masked.
    pub headers: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    async fn append(&self, entry: DeadLetterEntry) -> StoreResult<()>;

    async fn entries(&self) -> StoreResult<Vec<DeadLetterEntry>>;
}

#[derive(Debug, Default)]
pub struct MemoryDeadLetterStore {
    entries: RwLock<Vec<DeadLetterEntry>>,
}

impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn append(&self, entry: DeadLetterEntry) -> StoreResult<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<DeadLetterEntry>> {
        Ok(self.entries.read().await.clone())
    }
}

/// Append-only facade over a [`DeadLetterStore`].
pub struct DeadLetterQueue {
    store: Arc<dyn DeadLetterStore>,
}

impl DeadLetterQueue {
    pub fn new(store: Arc<dyn DeadLetterStore>) -> Self {
        Self { store }
    }

    /// Record a failed webhook. Never returns an error.
    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        gateway: &str,
        event_type: &str,
        payload: Value,
        error_code: &str,
        error_message: &str,
        order_id: Option<&str>,
        headers: &HashMap<String, String>,
    ) {
        let entry = DeadLetterEntry {
            id: Uuid::new_v4(),
            gateway: gateway.to_string(),
            event_type: event_type.to_string(),
            payload,
            error_code: error_code.to_string(),
            error_message: truncate_message(error_message),
            order_id: order_id.map(str::to_string),
            headers: mask_headers(headers),
            created_at: Utc::now(),
        };

        match self.store.append(entry).await {
            Ok(()) => {
                debug!(gateway, event_type, error_code, "Saved dead letter");
            }
            Err(err) => {
                error!(
                    gateway,
                    event_type,
                    error_code,
                    error = %err,
                    "Failed to save dead letter"
                );
            }
        }
    }
}

fn mask_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked = if SENSITIVE_HEADERS.contains(&name.to_lowercase().as_str()) {
                mask_value(value)
            } else {
                value.clone()
            };
            (name.clone(), masked)
        })
        .collect()
}

fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

// Char-based; provider messages carry multibyte text.
fn truncate_message(message: &str) -> String {
    if message.chars().count() <= MAX_ERROR_LEN {
        message.to_string()
    } else {
        let cut: String = message.chars().take(MAX_ERROR_LEN).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use serde_json::json;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_save_masks_sensitive_headers() {
        let store = Arc::new(MemoryDeadLetterStore::new());
        let dlq = DeadLetterQueue::new(store.clone());

        dlq.save(
            "pushinpay",
            "payment",
            json!({"id": "abc"}),
            "UPDATE_ERROR",
            "write failed",
            Some("order_1"),
            &headers(&[
                ("x-pushinpay-token", "tok_1234567890secret"),
                ("content-type", "application/json"),
                ("x-signature", "short"),
            ]),
        )
        .await;

        let entries = store.entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.headers["x-pushinpay-token"], "tok_...cret");
        assert_eq!(entry.headers["content-type"], "application/json");
        assert_eq!(entry.headers["x-signature"], "***");
        assert_eq!(entry.order_id.as_deref(), Some("order_1"));
    }

    #[tokio::test]
    async fn test_save_truncates_error_message() {
        let store = Arc::new(MemoryDeadLetterStore::new());
        let dlq = DeadLetterQueue::new(store.clone());

        let long = "e".repeat(4000);
        dlq.save(
            "asaas",
            "PAYMENT_CONFIRMED",
            json!({}),
            "INTERNAL_ERROR",
            &long,
            None,
            &HashMap::new(),
        )
        .await;

        let entries = store.entries().await.unwrap();
        let message = &entries[0].error_message;
        assert_eq!(message.chars().count(), MAX_ERROR_LEN + 3);
        assert!(message.ends_with("..."));
    }

    #[tokio::test]
    async fn test_save_swallows_backend_failure() {
        struct FailingStore;

        #[async_trait]
        impl DeadLetterStore for FailingStore {
            async fn append(&self, _entry: DeadLetterEntry) -> StoreResult<()> {
                Err(StoreError::Backend("disk full".to_string()))
            }
            async fn entries(&self) -> StoreResult<Vec<DeadLetterEntry>> {
                Ok(Vec::new())
            }
        }

        let dlq = DeadLetterQueue::new(Arc::new(FailingStore));
        // Must not panic or propagate.
        dlq.save(
            "mercadopago",
            "payment",
            json!({}),
            "INTERNAL_ERROR",
            "boom",
            None,
            &HashMap::new(),
        )
        .await;
    }

    #[test]
    fn test_mask_value_boundaries() {
        assert_eq!(mask_value("12345678"), "***");
        assert_eq!(mask_value("123456789"), "1234...6789");
        assert_eq!(mask_value(""), "***");
    }
}
