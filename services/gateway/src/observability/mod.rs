//! Metrics and alert collaborators.
//!
//! The gateway core never owns a metrics registry or alert channel. It is
//! handed a [`Telemetry`] bundle and reports through it; the binary opens the
//! bundle at startup and closes it at shutdown.

pub mod alerts;
pub mod metrics;

use std::sync::Arc;
use std::time::Duration;

use rust_common::{CircuitState, Transition};

pub use alerts::LogAlertSink;
pub use metrics::PrometheusObserver;

/// Receives call and circuit measurements.
pub trait GatewayObserver: Send + Sync {
    /// Called once before the first measurement
    fn open(&self) {}

    /// Called once after the last measurement
    fn close(&self) {}

    /// One finished tool call. `outcome` is `success` or an error code.
    fn record_call(&self, tool: &str, outcome: &str, latency: Duration);

    /// A circuit breaker changed state.
    fn record_transition(&self, backend: &str, transition: Transition);
}

/// Delivers operator alerts.
pub trait AlertSink: Send + Sync {
    /// Called once before the first alert
    fn open(&self) {}

    /// Called once after the last alert
    fn close(&self) {}

    /// A backend's circuit opened; calls fail fast for `retry_after`.
    fn circuit_opened(&self, backend: &str, retry_after: Duration);

    /// A backend's circuit closed again after probing.
    fn circuit_recovered(&self, backend: &str);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl GatewayObserver for NoopObserver {
    fn record_call(&self, _tool: &str, _outcome: &str, _latency: Duration) {}

    fn record_transition(&self, _backend: &str, _transition: Transition) {}
}

/// Discards every alert.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn circuit_opened(&self, _backend: &str, _retry_after: Duration) {}

    fn circuit_recovered(&self, _backend: &str) {}
}

/// Observer and alert sink, cloned into every component that reports.
#[derive(Clone)]
pub struct Telemetry {
    observer: Arc<dyn GatewayObserver>,
    alerts: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::noop()
    }
}

impl Telemetry {
    #[must_use]
    pub fn new(observer: Arc<dyn GatewayObserver>, alerts: Arc<dyn AlertSink>) -> Self {
        Self { observer, alerts }
    }

    /// Telemetry that records nothing.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopObserver), Arc::new(NoopAlertSink))
    }

    pub fn open(&self) {
        self.observer.open();
        self.alerts.open();
    }

    pub fn close(&self) {
        self.alerts.close();
        self.observer.close();
    }

    pub fn record_call(&self, tool: &str, outcome: &str, latency: Duration) {
        self.observer.record_call(tool, outcome, latency);
    }

    /// Report a breaker transition, alerting on open and on recovery.
    pub fn circuit_transition(&self, backend: &str, transition: Transition, retry_after: Duration) {
        self.observer.record_transition(backend, transition);
        match transition.to {
            CircuitState::Open => self.alerts.circuit_opened(backend, retry_after),
            CircuitState::Closed => self.alerts.circuit_recovered(backend),
            CircuitState::HalfOpen => {}
        }
    }
}
