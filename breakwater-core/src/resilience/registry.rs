//! Named circuit breaker registry.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats};

/// Process-wide map of named breakers, one per outbound target.
///
/// Adapters ask for their breaker by name (`"mercadopago-api"`); the first
/// request lazily constructs it from the template config. Two adapters
/// sharing a name share breaker state.
pub struct BreakerRegistry {
    template: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        Self::with_template(CircuitBreakerConfig::default())
    }

    /// Registry whose breakers start from `template`; the name is
    /// overridden per entry.
    pub fn with_template(template: CircuitBreakerConfig) -> Self {
        Self {
            template,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write();
        // entry() re-checks under the write lock; a racing caller may have
        // built it already.
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                let mut config = self.template.clone();
                config.name = name.to_string();
                CircuitBreaker::new(config)
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().get(name).cloned()
    }

    /// Stats snapshot across every registered breaker.
    pub fn stats(&self) -> Vec<CircuitBreakerStats> {
        self.breakers.read().values().map(|b| b.stats()).collect()
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
