//! Security audit trail.
//!
//! Verification failures and tamper attempts are recorded here before the
//! request is rejected. Recording is synchronous and infallible so callers
//! on the hot path never block on it.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    /// Authentication or allowlist rejection.
    AccessDenied,
    /// Requested amount disagreed with the stored order amount.
    ValueMismatch,
    /// Webhook dropped before processing (bad signature, stale timestamp).
    WebhookRejected,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::ValueMismatch => "value_mismatch",
            Self::WebhookRejected => "webhook_rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    pub gateway: String,
    pub client_ip: Option<String>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, gateway: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            gateway: gateway.into(),
            client_ip: None,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }

    pub fn with_client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }
}

pub trait AuditLog: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Emits audit events as structured warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn record(&self, event: SecurityEvent) {
        warn!(
            kind = event.kind.as_str(),
            gateway = %event.gateway,
            client_ip = event.client_ip.as_deref().unwrap_or("-"),
            detail = %event.detail,
            "Security event"
        );
    }
}

/// Collects events for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    events: RwLock<Vec<SecurityEvent>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl AuditLog for MemoryAuditLog {
    fn record(&self, event: SecurityEvent) {
        self.events.write().push(event);
    }
}
