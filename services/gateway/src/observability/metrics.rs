//! Tool Call and Circuit Breaker Metrics
//!
//! Provides Prometheus metrics for tool calls and circuit breaker state changes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use rust_common::{CircuitState, Transition};
use tracing::{debug, info};

use crate::observability::GatewayObserver;

const NAMESPACE: &str = "finance_gateway";

/// Prometheus-backed [`GatewayObserver`] with its own registry.
pub struct PrometheusObserver {
    registry: Registry,
    /// Calls by tool and outcome
    calls: CounterVec,
    /// Call latency by tool
    call_latency: HistogramVec,
    /// State changes counter
    state_changes: CounterVec,
    /// Current state gauge (0=closed, 1=open, 2=half-open)
    current_state: GaugeVec,
    open: AtomicBool,
}

impl std::fmt::Debug for PrometheusObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusObserver")
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl PrometheusObserver {
    /// Creates the metric families and registers them.
    ///
    /// # Errors
    ///
    /// Returns an error if a metric cannot be created or registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let calls = CounterVec::new(
            Opts::new("tool_calls_total", "Total tool calls").namespace(NAMESPACE),
            &["tool", "outcome"],
        )?;
        registry.register(Box::new(calls.clone()))?;

        let call_latency = HistogramVec::new(
            HistogramOpts::new("tool_call_latency_seconds", "Tool call latency in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["tool"],
        )?;
        registry.register(Box::new(call_latency.clone()))?;

        let state_changes = CounterVec::new(
            Opts::new(
                "circuit_breaker_state_changes_total",
                "Total circuit breaker state changes",
            )
            .namespace(NAMESPACE),
            &["backend", "from_state", "to_state"],
        )?;
        registry.register(Box::new(state_changes.clone()))?;

        let current_state = GaugeVec::new(
            Opts::new("circuit_breaker_state", "Current circuit breaker state").namespace(NAMESPACE),
            &["backend"],
        )?;
        registry.register(Box::new(current_state.clone()))?;

        Ok(Self {
            registry,
            calls,
            call_latency,
            state_changes,
            current_state,
            open: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of every metric.
    #[must_use]
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(err) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            debug!(error = %err, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    const fn state_value(state: CircuitState) -> f64 {
        match state {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl GatewayObserver for PrometheusObserver {
    fn open(&self) {
        self.open.store(true, Ordering::Release);
        info!("Metrics observer opened");
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            // Stdout belongs to the protocol, so the final snapshot goes to the log
            debug!(metrics = %self.render(), "Final metrics snapshot");
            info!("Metrics observer closed");
        }
    }

    fn record_call(&self, tool: &str, outcome: &str, latency: Duration) {
        self.calls.with_label_values(&[tool, outcome]).inc();
        self.call_latency
            .with_label_values(&[tool])
            .observe(latency.as_secs_f64());
    }

    fn record_transition(&self, backend: &str, transition: Transition) {
        self.state_changes
            .with_label_values(&[backend, transition.from.as_str(), transition.to.as_str()])
            .inc();
        self.current_state
            .with_label_values(&[backend])
            .set(Self::state_value(transition.to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_and_transitions() {
        let observer = PrometheusObserver::new().unwrap();
        observer.open();

        observer.record_call("get_account", "success", Duration::from_millis(12));
        observer.record_call("get_account", "NOT_FOUND", Duration::from_millis(3));
        observer.record_transition(
            "accounts",
            Transition {
                from: CircuitState::Closed,
                to: CircuitState::Open,
            },
        );

        assert_eq!(
            observer
                .calls
                .with_label_values(&["get_account", "success"])
                .get(),
            1.0
        );
        assert_eq!(observer.current_state.with_label_values(&["accounts"]).get(), 1.0);

        let text = observer.render();
        assert!(text.contains("finance_gateway_tool_calls_total"));
        assert!(text.contains("finance_gateway_circuit_breaker_state_changes_total"));

        observer.close();
    }

    #[test]
    fn observers_have_independent_registries() {
        let first = PrometheusObserver::new().unwrap();
        let second = PrometheusObserver::new().unwrap();
        first.record_call("list_accounts", "success", Duration::ZERO);
        assert!(second.render().find("list_accounts").is_none());
    }
}
