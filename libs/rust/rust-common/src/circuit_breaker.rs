//! Circuit breaker implementation for resilience.
//!
//! This module provides a circuit breaker pattern implementation to protect
//! services from cascading failures when downstream dependencies are unavailable.
//!
//! All state lives behind a single mutex. Admission (including the
//! OPEN -> HALF_OPEN timeout check and half-open slot accounting) and outcome
//! recording are each one critical section, so concurrent callers can never
//! be admitted as more trials than `half_open_max_calls`.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed, requests are allowed
    Closed,
    /// Circuit is open, requests are rejected
    Open,
    /// Circuit is half-open, limited requests are allowed to test recovery
    HalfOpen,
}

impl CircuitState {
    /// Stable lowercase label, used for metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of failures before opening the circuit
    pub failure_threshold: u32,
    /// Number of consecutive successes in half-open state to close the circuit
    pub success_threshold: u32,
    /// Time to wait before transitioning from open to half-open
    pub recovery_timeout: Duration,
    /// Maximum trial requests admitted in half-open state
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Create a new config with custom recovery timeout.
    #[must_use]
    pub const fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Create a new config with a custom half-open trial budget.
    #[must_use]
    pub const fn with_half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.half_open_max_calls = max_calls;
        self
    }
}

/// A state change performed by the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// State before the change
    pub from: CircuitState,
    /// State after the change
    pub to: CircuitState,
}

/// Returned when the breaker refuses a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitOpenError {
    /// Time until the breaker will admit a trial
    pub retry_after: Duration,
}

/// Point-in-time copy of the breaker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    /// Current state
    pub state: CircuitState,
    /// Failures counted in the closed state
    pub failure_count: u32,
    /// Successes counted in the half-open state
    pub consecutive_successes: u32,
    /// Probes admitted in the current half-open window
    pub half_open_call_count: u32,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    consecutive_successes: u32,
    last_failure_time: Option<Instant>,
    half_open_call_count: u32,
}

impl Inner {
    const fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            half_open_call_count: 0,
        }
    }

    fn open(&mut self) -> Transition {
        let from = self.state;
        self.state = CircuitState::Open;
        self.last_failure_time = Some(Instant::now());
        self.consecutive_successes = 0;
        self.half_open_call_count = 0;
        Transition {
            from,
            to: CircuitState::Open,
        }
    }

    fn close(&mut self) -> Transition {
        let from = self.state;
        *self = Self::new();
        Transition {
            from,
            to: CircuitState::Closed,
        }
    }
}

/// Circuit breaker for protecting external services.
///
/// Implements the circuit breaker pattern with three states:
/// - Closed: Normal operation, requests are allowed
/// - Open: Failure threshold reached, requests are rejected
/// - Half-Open: Testing recovery, a bounded number of trials allowed
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner::new()),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Name of the protected dependency.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration this breaker was built with.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask for permission to make one call.
    ///
    /// The returned permit must be resolved with
    /// [`CallPermit::record_success`], [`CallPermit::record_failure`] or
    /// [`CallPermit::discard`]. Dropping it unresolved is the same as
    /// discarding it.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitOpenError`] when the circuit is open and the recovery
    /// timeout has not elapsed, or when the half-open trial budget is spent.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(CallPermit::new(self, false, None)),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure_time
                    .map_or(Duration::MAX, |last| last.elapsed());
                if elapsed > self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    inner.half_open_call_count = 1;
                    info!(circuit = %self.name, "Circuit transitioning to half-open");
                    let transition = Transition {
                        from: CircuitState::Open,
                        to: CircuitState::HalfOpen,
                    };
                    Ok(CallPermit::new(self, true, Some(transition)))
                } else {
                    Err(CircuitOpenError {
                        retry_after: self.config.recovery_timeout.saturating_sub(elapsed),
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_call_count < self.config.half_open_max_calls {
                    inner.half_open_call_count += 1;
                    Ok(CallPermit::new(self, true, None))
                } else {
                    Err(CircuitOpenError {
                        retry_after: Duration::ZERO,
                    })
                }
            }
        }
    }

    /// Check if a request would be allowed right now, consuming the permit.
    #[must_use]
    pub fn allow_request(&self) -> bool {
        self.try_acquire().map(CallPermit::discard).is_ok()
    }

    /// Record a successful request.
    ///
    /// In the closed state a success walks the failure count back toward
    /// zero; in half-open, consecutive successes close the circuit.
    pub fn record_success(&self) -> Option<Transition> {
        self.settle_success(true)
    }

    /// Success of a permitted call. Only trials count toward closing a
    /// half-open circuit; a call admitted while closed that finishes after
    /// the circuit reopened or went half-open is ignored.
    fn settle_success(&self, trial: bool) -> Option<Transition> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen if !trial => None,
            CircuitState::Closed => {
                inner.failure_count = inner.failure_count.saturating_sub(1);
                None
            }
            CircuitState::HalfOpen => {
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    let transition = inner.close();
                    info!(circuit = %self.name, "Circuit closed after recovery");
                    Some(transition)
                } else {
                    None
                }
            }
            // Late result from a call admitted before the circuit opened.
            CircuitState::Open => None,
        }
    }

    /// Record a failed request.
    ///
    /// Failures in the closed state open the circuit once the threshold is
    /// reached; any failure in half-open reopens it immediately.
    pub fn record_failure(&self) -> Option<Transition> {
        self.settle_failure(true)
    }

    fn settle_failure(&self, trial: bool) -> Option<Transition> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen if !trial => None,
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    let failures = inner.failure_count;
                    let transition = inner.open();
                    warn!(circuit = %self.name, failures, "Circuit opened due to failures");
                    Some(transition)
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => {
                let transition = inner.open();
                warn!(circuit = %self.name, "Circuit re-opened from half-open");
                Some(transition)
            }
            CircuitState::Open => None,
        }
    }

    fn release_trial(&self) {
        let mut inner = self.inner.lock();
        if inner.state == CircuitState::HalfOpen {
            inner.half_open_call_count = inner.half_open_call_count.saturating_sub(1);
        }
    }

    /// Get the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Get the current failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    /// Copy out all counters under one lock.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            consecutive_successes: inner.consecutive_successes,
            half_open_call_count: inner.half_open_call_count,
        }
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        *self.inner.lock() = Inner::new();
    }
}

/// Permission to make one call through a [`CircuitBreaker`].
///
/// A half-open trial that is dropped without an outcome (the caller was
/// cancelled, or the backend answered with a client error) gives its slot
/// back so the breaker cannot get stuck in half-open.
#[must_use = "a permit must be resolved with an outcome"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    transition: Option<Transition>,
    resolved: bool,
}

impl<'a> CallPermit<'a> {
    const fn new(
        breaker: &'a CircuitBreaker,
        trial: bool,
        transition: Option<Transition>,
    ) -> Self {
        Self {
            breaker,
            trial,
            transition,
            resolved: false,
        }
    }

    /// Whether this call is a half-open trial.
    #[must_use]
    pub const fn is_trial(&self) -> bool {
        self.trial
    }

    /// The transition performed while admitting this call, if any.
    #[must_use]
    pub const fn transition(&self) -> Option<Transition> {
        self.transition
    }

    /// Resolve the call as a success.
    pub fn record_success(mut self) -> Option<Transition> {
        self.resolved = true;
        self.breaker.settle_success(self.trial)
    }

    /// Resolve the call as a failure.
    pub fn record_failure(mut self) -> Option<Transition> {
        self.resolved = true;
        self.breaker.settle_failure(self.trial)
    }

    /// Resolve the call without affecting the breaker's counters.
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            self.breaker.release_trial();
        }
    }
}
