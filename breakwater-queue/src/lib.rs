//! Lifecycle event worker for Breakwater background processing.
//!
//! Ingestion handlers enqueue lifecycle events when post-transition side
//! effects fail; this crate drains that queue. The worker loads each event's
//! order, re-runs the matching pipeline sequence and marks the event
//! processed or failed, with a retry ceiling so poison events eventually
//! stop being retried (they stay in the store for inspection).
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use breakwater_core::{MemoryLifecycleEventStore, MemoryOrderStore};
//! use breakwater_pipeline::{
//!     MemoryAccessProvisioner, MemoryAnalytics, MemoryMailer, OrderPipeline,
//!     OutboundNotifier, TargetRegistry,
//! };
//! use breakwater_queue::{LifecycleWorker, WorkerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), breakwater_queue::QueueError> {
//!     let events = Arc::new(MemoryLifecycleEventStore::new());
//!     let orders = Arc::new(MemoryOrderStore::new());
//!
//!     let registry = Arc::new(TargetRegistry::new());
//!     let pipeline = Arc::new(OrderPipeline::new(
//!         Arc::new(MemoryAccessProvisioner::new()),
//!         Arc::new(MemoryMailer::new()),
//!         Arc::new(OutboundNotifier::new(registry)),
//!         Arc::new(MemoryAnalytics::new()),
//!     ));
//!
//!     let mut worker =
//!         LifecycleWorker::with_config(events, orders, pipeline, WorkerConfig::default());
//!
//!     // One-shot drain, or `worker.start()` for a polling loop.
//!     let report = worker.run_once().await?;
//!     println!("processed {} of {}", report.processed, report.total);
//!
//!     worker.start().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod worker;

pub use error::{QueueError, QueueResult};
pub use worker::{LifecycleWorker, WorkerConfig, WorkerReport, PROCESSOR};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::worker::{LifecycleWorker, WorkerConfig, WorkerReport, PROCESSOR};
}
