//! Error types for the lifecycle worker.

use thiserror::Error;

/// Result type for worker operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Worker and event-queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Event or order store failure
    #[error("Store error: {0}")]
    Store(#[from] breakwater_core::StoreError),

    /// Stop requested while the polling loop is not running
    #[error("Lifecycle worker is not running")]
    WorkerNotRunning,

    /// Second start while the polling loop is active
    #[error("Lifecycle worker already started")]
    WorkerAlreadyRunning,
}
