//! Circuit breaker guarding outbound payment-provider calls.
//!
//! Each provider adapter owns a named breaker. While the provider is
//! healthy the circuit stays closed and calls pass straight through.
//! Enough failures inside a sliding window trip it open, after which
//! calls are rejected before any network I/O, so checkout and webhook
//! paths fail fast instead of stacking timeouts onto a dead API. Once
//! `reset_timeout` elapses, a bounded number of trial calls probe the
//! provider: enough successes close the circuit, any failure reopens it.
//!
//! ## Example
//!
//! ```rust,ignore
//! let breaker = CircuitBreaker::new(
//!     CircuitBreakerConfig::new("mercadopago-api").trip_after(5, Duration::from_secs(60)),
//! );
//!
//! match breaker.call(|| client.create_payment(&request)).await {
//!     Ok(response) => handle(response),
//!     Err(CircuitBreakerError::Open | CircuitBreakerError::HalfOpenLimitReached) => {
//!         // Rejected locally; the provider never saw the call.
//!     }
//!     Err(CircuitBreakerError::Execution(e)) => handle_provider_error(e),
//! }
//! ```

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected without executing.
    Open,
    /// Bounded trial calls probe for recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tuning for a single breaker.
///
/// The defaults suit payment-provider REST APIs: five failures inside a
/// one-minute window open the circuit, and after thirty seconds up to
/// three trial calls probe for recovery.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Breaker name, e.g. `"mercadopago-api"`. Appears in every log line.
    pub name: String,
    /// Failures inside `failure_window` that trip the circuit.
    pub failure_threshold: u32,
    /// Trial successes that close the circuit from half-open.
    pub success_threshold: u32,
    /// How long the circuit stays open before admitting trial calls.
    pub reset_timeout: Duration,
    /// Trial calls admitted while half-open.
    pub half_open_requests: u32,
    /// Sliding window over which failures are counted.
    pub failure_window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(30),
            half_open_requests: 3,
            failure_window: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Trip the circuit after `failures` failures inside `window`.
    pub fn trip_after(mut self, failures: u32, window: Duration) -> Self {
        self.failure_threshold = failures;
        self.failure_window = window;
        self
    }

    /// How long to stay open before admitting trial calls.
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Half-open probing: admit `trial_calls`, close after `successes`.
    pub fn half_open(mut self, trial_calls: u32, successes: u32) -> Self {
        self.half_open_requests = trial_calls;
        self.success_threshold = successes;
        self
    }
}

/// Error returned by [`CircuitBreaker::call`].
#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open; the call never executed.
    Open,
    /// Half-open trial quota already taken; the call never executed.
    HalfOpenLimitReached,
    /// The call executed and returned an error.
    Execution(E),
}

impl<E> CircuitBreakerError<E> {
    /// True when the call was rejected before executing.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::Execution(_))
    }
}

impl<E: std::fmt::Display> std::fmt::Display for CircuitBreakerError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "circuit open"),
            Self::HalfOpenLimitReached => write!(f, "half-open trial quota exhausted"),
            Self::Execution(e) => write!(f, "call failed: {}", e),
        }
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for CircuitBreakerError<E> {}

enum Permit {
    Allowed,
    RejectedOpen,
    RejectedHalfOpenLimit,
}

/// Mutable breaker core. Every transition happens under one lock.
struct Core {
    state: CircuitState,
    /// When the circuit last opened. `None` while closed.
    opened_at: Option<Instant>,
    /// Failure instants inside the sliding window, oldest first.
    failures: VecDeque<Instant>,
    /// Trial calls admitted since entering half-open.
    trials_admitted: u32,
    /// Trial successes since entering half-open.
    trials_succeeded: u32,
}

impl Core {
    fn fresh() -> Self {
        Self {
            state: CircuitState::Closed,
            opened_at: None,
            failures: VecDeque::new(),
            trials_admitted: 0,
            trials_succeeded: 0,
        }
    }

    /// Drop failures that have aged out of the window.
    fn prune(&mut self, window: Duration, now: Instant) {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Lifetime counters, surfaced through [`CircuitBreaker::stats`].
#[derive(Default)]
struct Totals {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

/// Per-provider circuit breaker.
///
/// Cheap to share: adapters hold an `Arc<CircuitBreaker>` handed out by
/// the [`BreakerRegistry`](super::BreakerRegistry), so every call site
/// for a provider feeds the same failure window.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    core: Mutex<Core>,
    totals: Totals,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Arc<Self> {
        info!(
            breaker = %config.name,
            failure_threshold = config.failure_threshold,
            reset_timeout = ?config.reset_timeout,
            "Circuit breaker ready"
        );

        Arc::new(Self {
            config,
            core: Mutex::new(Core::fresh()),
            totals: Totals::default(),
        })
    }

    /// Current state, advancing open to half-open when the reset
    /// timeout has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut core = self.core.lock();
        self.advance(&mut core);
        core.state
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Failures currently inside the sliding window.
    pub fn failure_count(&self) -> u32 {
        self.core.lock().failures.len() as u32
    }

    /// Run a provider call through the breaker.
    ///
    /// Open circuits and exhausted trial quotas reject the call before
    /// any I/O; executed calls feed their outcome back into the window.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.totals.requests.fetch_add(1, Ordering::Relaxed);

        let permit = self.admit(&mut self.core.lock());
        match permit {
            Permit::Allowed => {}
            Permit::RejectedOpen => {
                self.totals.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(breaker = %self.config.name, "Call rejected, circuit open");
                return Err(CircuitBreakerError::Open);
            }
            Permit::RejectedHalfOpenLimit => {
                self.totals.rejections.fetch_add(1, Ordering::Relaxed);
                debug!(breaker = %self.config.name, "Call rejected, trial quota exhausted");
                return Err(CircuitBreakerError::HalfOpenLimitReached);
            }
        }

        match f().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure();
                Err(CircuitBreakerError::Execution(err))
            }
        }
    }

    fn admit(&self, core: &mut Core) -> Permit {
        self.advance(core);
        match core.state {
            CircuitState::Closed => Permit::Allowed,
            CircuitState::Open => Permit::RejectedOpen,
            CircuitState::HalfOpen => {
                if core.trials_admitted < self.config.half_open_requests {
                    core.trials_admitted += 1;
                    Permit::Allowed
                } else {
                    Permit::RejectedHalfOpenLimit
                }
            }
        }
    }

    /// Feed a success into the breaker without going through [`call`].
    ///
    /// [`call`]: CircuitBreaker::call
    pub fn record_success(&self) {
        self.totals.successes.fetch_add(1, Ordering::Relaxed);

        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => {
                // A healthy call clears the failure window outright.
                core.failures.clear();
            }
            CircuitState::HalfOpen => {
                core.trials_succeeded += 1;
                if core.trials_succeeded >= self.config.success_threshold {
                    self.restore(&mut core);
                }
            }
            CircuitState::Open => {
                debug!(breaker = %self.config.name, "Success while circuit open");
            }
        }
    }

    /// Feed a failure into the breaker without going through [`call`].
    ///
    /// [`call`]: CircuitBreaker::call
    pub fn record_failure(&self) {
        self.totals.failures.fetch_add(1, Ordering::Relaxed);

        let mut core = self.core.lock();
        match core.state {
            CircuitState::Closed => {
                let now = Instant::now();
                core.prune(self.config.failure_window, now);
                core.failures.push_back(now);
                if core.failures.len() as u32 >= self.config.failure_threshold {
                    self.trip(&mut core);
                }
            }
            CircuitState::HalfOpen => {
                // The provider is still unhealthy; reopen immediately.
                self.trip(&mut core);
            }
            CircuitState::Open => {}
        }
    }

    /// Trip the circuit regardless of the failure window.
    pub fn force_open(&self) {
        self.trip(&mut self.core.lock());
    }

    fn trip(&self, core: &mut Core) {
        if core.state == CircuitState::Open {
            return;
        }
        warn!(
            breaker = %self.config.name,
            window_failures = core.failures.len(),
            "Circuit opened, rejecting calls"
        );
        core.state = CircuitState::Open;
        core.opened_at = Some(Instant::now());
        core.trials_admitted = 0;
        core.trials_succeeded = 0;
    }

    fn restore(&self, core: &mut Core) {
        if core.state == CircuitState::Closed {
            return;
        }
        info!(breaker = %self.config.name, "Circuit closed, provider recovered");
        core.state = CircuitState::Closed;
        core.opened_at = None;
        core.failures.clear();
        core.trials_admitted = 0;
        core.trials_succeeded = 0;
    }

    /// Move open to half-open once the reset timeout has elapsed.
    fn advance(&self, core: &mut Core) {
        if core.state != CircuitState::Open {
            return;
        }
        let due = core
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.config.reset_timeout);
        if due {
            debug!(breaker = %self.config.name, "Circuit half-open, admitting trial calls");
            core.state = CircuitState::HalfOpen;
            core.trials_admitted = 0;
            core.trials_succeeded = 0;
        }
    }

    /// Point-in-time snapshot for health endpoints and logs.
    pub fn stats(&self) -> CircuitBreakerStats {
        let mut core = self.core.lock();
        self.advance(&mut core);
        CircuitBreakerStats {
            name: self.config.name.clone(),
            state: core.state,
            total_requests: self.totals.requests.load(Ordering::Relaxed),
            total_successes: self.totals.successes.load(Ordering::Relaxed),
            total_failures: self.totals.failures.load(Ordering::Relaxed),
            total_rejections: self.totals.rejections.load(Ordering::Relaxed),
            current_failure_count: core.failures.len() as u32,
        }
    }
}

/// Point-in-time breaker statistics.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Calls rejected without executing.
    pub total_rejections: u64,
    /// Failures currently inside the sliding window.
    pub current_failure_count: u32,
}

impl CircuitBreakerStats {
    /// Success rate over all requests (0.0 - 1.0).
    pub fn success_rate(&self) -> f64 {
        match self.total_requests {
            0 => 1.0,
            n => self.total_successes as f64 / n as f64,
        }
    }
}
