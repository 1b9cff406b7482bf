//! Breakwater core types and seams.
//!
//! Everything the rest of the workspace agrees on lives here: the canonical
//! order model and its status lattice, minor-unit money, the storage traits
//! (orders, lifecycle events, dead letters) with in-memory reference
//! implementations, the order update / dedup guard, the security audit log,
//! and the circuit breaker protecting outbound provider calls.
//!
//! Crates higher up the stack (`breakwater-gateways`, `breakwater-webhooks`,
//! `breakwater-pipeline`, `breakwater-queue`) depend on these contracts and
//! never on each other's internals.

pub mod audit;
pub mod dlq;
pub mod lifecycle;
pub mod money;
pub mod order;
pub mod resilience;
pub mod store;
pub mod update;

pub use audit::{AuditLog, MemoryAuditLog, SecurityEvent, SecurityEventKind, TracingAuditLog};
pub use dlq::{DeadLetterEntry, DeadLetterQueue, DeadLetterStore, MemoryDeadLetterStore};
pub use lifecycle::{LifecycleEvent, LifecycleEventStore, MemoryLifecycleEventStore};
pub use money::{Currency, Money};
pub use order::{Customer, EventType, Order, OrderStatus, StatusMapping, TechnicalStatus};
pub use resilience::{
    BreakerRegistry, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState,
};
pub use store::{MemoryOrderStore, OrderStore, StatusUpdate, StoreError, StoreResult};
pub use update::{OrderUpdater, TransitionOutcome};
