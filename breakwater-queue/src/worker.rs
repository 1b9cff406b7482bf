//! Worker that drains the lifecycle event queue.
//!
//! Webhook handlers enqueue a [`LifecycleEvent`] whenever the post-transition
//! pipeline reports failures. The worker picks those events up in batches,
//! reloads the order and re-runs the pipeline. Pipeline steps are idempotent,
//! so a re-run after a partial failure only redoes the missing work.

use std::sync::Arc;
use std::time::Duration;

use breakwater_core::{EventType, LifecycleEvent, LifecycleEventStore, OrderStore};
use breakwater_pipeline::OrderPipeline;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{QueueError, QueueResult};

/// Version tag written into `processed_by` on every event the worker touches.
pub const PROCESSOR: &str = concat!("lifecycle-worker/", env!("CARGO_PKG_VERSION"));

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Events fetched per batch
    pub batch_size: usize,

    /// Attempts before an event is left for manual inspection
    pub max_retries: u32,

    /// Pause between polling runs
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_retries: 3,
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// Counts from a single batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub processed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
}

enum ProcessOutcome {
    Processed,
    Skipped,
    Errored,
}

struct WorkerInner {
    events: Arc<dyn LifecycleEventStore>,
    orders: Arc<dyn OrderStore>,
    pipeline: Arc<OrderPipeline>,
    config: WorkerConfig,
}

impl WorkerInner {
    async fn run_batch(&self) -> QueueResult<WorkerReport> {
        let batch = self
            .events
            .fetch_unprocessed(self.config.batch_size, self.config.max_retries)
            .await?;

        let mut report = WorkerReport {
            total: batch.len(),
            ..WorkerReport::default()
        };

        for event in &batch {
            match self.process_event(event).await {
                ProcessOutcome::Processed => report.processed += 1,
                ProcessOutcome::Skipped => report.skipped += 1,
                ProcessOutcome::Errored => report.errors += 1,
            }
        }

        Ok(report)
    }

    async fn process_event(&self, event: &LifecycleEvent) -> ProcessOutcome {
        let order = match self.orders.get(&event.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                return self
                    .mark_failed(event, &format!("Order not found: {}", event.order_id))
                    .await;
            }
            Err(err) => {
                return self
                    .mark_failed(event, &format!("Order lookup failed: {err}"))
                    .await;
            }
        };

        let report = match event.event_type {
            // Only re-run the paid sequence while the order is still paid.
            // A later refund makes re-granting access wrong.
            EventType::PurchaseApproved if order.is_paid() => {
                self.pipeline.run_paid(&order, event.event_type).await
            }
            EventType::Refund | EventType::PartialRefund | EventType::Chargeback => {
                self.pipeline.run_refund(&order, event.event_type).await
            }
            other => {
                debug!(
                    event_id = %event.id,
                    order_id = %event.order_id,
                    event_type = %other,
                    "No worker action for event"
                );
                return self.mark_done(event, ProcessOutcome::Skipped).await;
            }
        };

        if report.has_failures() {
            let summary = report
                .error_summary()
                .unwrap_or_else(|| "Pipeline reported failures".to_string());
            self.mark_failed(event, &summary).await
        } else {
            self.mark_done(event, ProcessOutcome::Processed).await
        }
    }

    /// A flag that fails to persist counts as an error so the event stays
    /// eligible for the next pass.
    async fn mark_done(&self, event: &LifecycleEvent, outcome: ProcessOutcome) -> ProcessOutcome {
        match self.events.mark_processed(event.id, PROCESSOR).await {
            Ok(()) => outcome,
            Err(err) => {
                error!(event_id = %event.id, error = %err, "Failed to mark event processed");
                ProcessOutcome::Errored
            }
        }
    }

    async fn mark_failed(&self, event: &LifecycleEvent, reason: &str) -> ProcessOutcome {
        warn!(
            event_id = %event.id,
            order_id = %event.order_id,
            retry_count = event.retry_count,
            error = %reason,
            "Event processing failed"
        );
        if let Err(err) = self.events.mark_error(event.id, reason, PROCESSOR).await {
            error!(event_id = %event.id, error = %err, "Failed to record event error");
        }
        ProcessOutcome::Errored
    }
}

/// Background worker polling the event queue.
///
/// [`run_once`](LifecycleWorker::run_once) drains a single batch for callers
/// that schedule runs themselves; [`start`](LifecycleWorker::start) spawns a
/// tokio loop that polls on an interval. Overlapping runs are safe: processed
/// flags and idempotent pipeline steps keep duplicate work harmless.
pub struct LifecycleWorker {
    inner: Arc<WorkerInner>,
    running: Arc<RwLock<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl LifecycleWorker {
    /// Create a worker with the default configuration.
    pub fn new(
        events: Arc<dyn LifecycleEventStore>,
        orders: Arc<dyn OrderStore>,
        pipeline: Arc<OrderPipeline>,
    ) -> Self {
        Self::with_config(events, orders, pipeline, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(
        events: Arc<dyn LifecycleEventStore>,
        orders: Arc<dyn OrderStore>,
        pipeline: Arc<OrderPipeline>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                events,
                orders,
                pipeline,
                config,
            }),
            running: Arc::new(RwLock::new(false)),
            handle: None,
        }
    }

    /// Drain one batch and return its counts.
    pub async fn run_once(&self) -> QueueResult<WorkerReport> {
        self.inner.run_batch().await
    }

    /// Start the polling loop.
    pub async fn start(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if *running {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        *running = true;
        drop(running);

        info!(
            batch_size = self.inner.config.batch_size,
            poll_interval_secs = self.inner.config.poll_interval.as_secs(),
            processor = PROCESSOR,
            "Starting lifecycle worker"
        );

        let inner = self.inner.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(inner.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            while *running.read().await {
                ticker.tick().await;

                match inner.run_batch().await {
                    Ok(report) if report.total > 0 => {
                        info!(
                            processed = report.processed,
                            skipped = report.skipped,
                            errors = report.errors,
                            total = report.total,
                            "Lifecycle batch complete"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        error!(error = %err, "Lifecycle batch failed");
                    }
                }
            }
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the polling loop.
    pub async fn stop(&mut self) -> QueueResult<()> {
        let mut running = self.running.write().await;
        if !*running {
            return Err(QueueError::WorkerNotRunning);
        }
        *running = false;
        drop(running);

        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        info!("Lifecycle worker stopped");
        Ok(())
    }

    /// Check if the worker is running.
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
