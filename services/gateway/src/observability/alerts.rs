use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::observability::AlertSink;

/// Raises alerts as `warn!` log events.
///
/// Delivery to chat or paging channels is left to whatever ships the logs.
#[derive(Debug, Default)]
pub struct LogAlertSink {
    raised: AtomicU64,
}

impl LogAlertSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts raised since creation.
    #[must_use]
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }
}

impl AlertSink for LogAlertSink {
    fn open(&self) {
        info!("Alert sink opened");
    }

    fn close(&self) {
        info!(alerts_raised = self.raised(), "Alert sink closed");
    }

    fn circuit_opened(&self, backend: &str, retry_after: Duration) {
        self.raised.fetch_add(1, Ordering::Relaxed);
        warn!(
            alert = "circuit_open",
            backend = %backend,
            retry_after_secs = retry_after.as_secs(),
            "Backend circuit opened, calls will fail fast"
        );
    }

    fn circuit_recovered(&self, backend: &str) {
        info!(alert = "circuit_recovered", backend = %backend, "Backend circuit closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_open_alerts_only() {
        let sink = LogAlertSink::new();
        sink.open();
        sink.circuit_opened("accounts", Duration::from_secs(60));
        sink.circuit_recovered("accounts");
        sink.circuit_opened("transactions", Duration::from_secs(60));
        sink.close();
        assert_eq!(sink.raised(), 2);
    }
}
