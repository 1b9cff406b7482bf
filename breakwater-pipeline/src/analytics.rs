//! Conversion-tracker vocabulary and dispatcher doubles.
//!
//! The tracker API speaks its own status language; the mapping from our
//! event types is fixed data, so it lives here rather than in any
//! dispatcher implementation.

use async_trait::async_trait;
use breakwater_core::{EventType, Order};
use parking_lot::RwLock;
use tracing::debug;

use crate::collaborators::AnalyticsDispatcher;
use crate::error::PipelineResult;

/// Tracker-side status for an event.
pub fn tracker_status(event: EventType) -> &'static str {
    match event {
        EventType::PixGenerated => "waiting_payment",
        EventType::PurchaseApproved => "paid",
        EventType::PurchaseRefused => "refused",
        EventType::Refund | EventType::PartialRefund => "refunded",
        EventType::Chargeback => "chargedback",
    }
}

/// Dispatcher that only logs, for vendors without tracking configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnalytics;

#[async_trait]
impl AnalyticsDispatcher for TracingAnalytics {
    async fn dispatch(&self, order: &Order, event: EventType) -> PipelineResult<()> {
        debug!(
            order_id = %order.id,
            vendor_id = %order.vendor_id,
            event = %event,
            status = tracker_status(event),
            "Analytics event (tracking not configured)"
        );
        Ok(())
    }
}

/// One recorded analytics dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedEvent {
    pub order_id: String,
    pub event: EventType,
    pub status: &'static str,
}

/// Collects dispatches for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryAnalytics {
    events: RwLock<Vec<TrackedEvent>>,
}

impl MemoryAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackedEvent> {
        self.events.read().clone()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl AnalyticsDispatcher for MemoryAnalytics {
    async fn dispatch(&self, order: &Order, event: EventType) -> PipelineResult<()> {
        self.events.write().push(TrackedEvent {
            order_id: order.id.clone(),
            event,
            status: tracker_status(event),
        });
        Ok(())
    }
}
