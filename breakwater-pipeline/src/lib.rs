//! Post-transition side effects for Breakwater orders.
//!
//! When an order moves through the status lattice, the transition itself
//! is a single conditional update in `breakwater-core`. Everything that
//! should happen *because* of the transition lives here:
//!
//! - **Paid**: grant members-area access, send the confirmation email,
//!   notify the vendor's webhook targets, dispatch the analytics event.
//! - **Refunded / partially refunded / chargeback**: revoke access,
//!   remove group memberships, notify, dispatch.
//!
//! Steps never short-circuit each other. Every run returns a
//! [`PipelineReport`] with per-step outcomes; callers that see failures
//! enqueue a lifecycle event so the worker can re-run the (idempotent)
//! pipeline later.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use breakwater_core::{Customer, EventType, Money, Order};
//! use breakwater_pipeline::{
//!     MemoryAccessProvisioner, MemoryAnalytics, MemoryMailer, OrderPipeline,
//!     OutboundNotifier, TargetRegistry, WebhookTarget,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = Arc::new(TargetRegistry::new());
//!     registry
//!         .register(
//!             "vendor_1",
//!             WebhookTarget::new("https://vendor.example/hooks", "whsec_abc")
//!                 .with_events(vec!["purchase_approved", "refund"]),
//!         )
//!         .unwrap();
//!
//!     let pipeline = OrderPipeline::new(
//!         Arc::new(MemoryAccessProvisioner::new()),
//!         Arc::new(MemoryMailer::new()),
//!         Arc::new(OutboundNotifier::new(registry)),
//!         Arc::new(MemoryAnalytics::new()),
//!     );
//!
//!     let order = Order::new(
//!         "order_1",
//!         "vendor_1",
//!         "prod_1",
//!         Customer::new("Ana Souza", "ana@example.com"),
//!         Money::brl(9900),
//!     );
//!     let report = pipeline.run_paid(&order, EventType::PurchaseApproved).await;
//!     assert!(!report.has_failures());
//! }
//! ```

mod analytics;
mod collaborators;
mod delivery;
mod error;
mod notifier;
mod pipeline;

pub use analytics::{tracker_status, MemoryAnalytics, TracingAnalytics, TrackedEvent};
pub use collaborators::{
    AccessGrant, AccessProvisioner, AnalyticsDispatcher, Mailer, MemoryAccessProvisioner,
    MemoryMailer, RevokeReason, SentMail, TracingMailer,
};
pub use delivery::{DeliveryStatus, NotificationPayload, OutboundDelivery};
pub use error::{PipelineError, PipelineResult};
pub use notifier::{headers, OutboundNotifier, RetryPolicy, TargetRegistry, WebhookTarget, USER_AGENT};
pub use pipeline::{steps, OrderPipeline, PipelineReport, StepOutcome, StepReport};
