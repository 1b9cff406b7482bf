//! Resilience primitives for outbound provider calls.

mod circuit_breaker;
mod registry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitBreakerStats, CircuitState,
};
pub use registry::BreakerRegistry;
