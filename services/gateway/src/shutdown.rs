//! Graceful Shutdown Module
//!
//! Tracks spawned work in a `JoinSet` and drains it with a bounded timeout.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Shutdown coordinator for graceful termination
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: JoinSet<()>,
}

impl ShutdownCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled when shutdown begins.
    ///
    /// Tracked tasks derive their own tokens from it with `child_token` so
    /// that shutdown stops retries and backoff instead of waiting them out.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawns a tracked task.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            future.await;
            debug!(task = name, "Task completed");
        });
    }

    /// Collect tasks that already finished, logging any that panicked.
    pub fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(err) = result {
                warn!(error = %err, "Task failed");
            }
        }
    }

    /// Number of tasks still tracked
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Cancels the token, then waits up to `timeout` for every task.
    ///
    /// Returns how many tasks had to be aborted.
    pub async fn shutdown(self, timeout: Duration) -> usize {
        self.drain(timeout, true).await
    }

    /// Waits up to `timeout` for every task to finish on its own, then
    /// cancels and aborts whatever is left.
    ///
    /// Returns how many tasks had to be aborted.
    pub async fn finish(self, timeout: Duration) -> usize {
        self.drain(timeout, false).await
    }

    async fn drain(mut self, timeout: Duration, cancel_first: bool) -> usize {
        info!(tasks = self.tasks.len(), cancel_first, "Initiating graceful shutdown");
        if cancel_first {
            self.token.cancel();
        }

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "Task failed during shutdown");
                }
            }
        })
        .await;

        let aborted = if drained.is_ok() {
            info!("All tasks completed gracefully");
            0
        } else {
            let remaining = self.tasks.len();
            warn!(remaining, "Shutdown timeout reached, aborting remaining tasks");
            self.token.cancel();
            self.tasks.shutdown().await;
            remaining
        };

        info!("Shutdown complete");
        aborted
    }
}

/// Waits for SIGTERM or SIGINT
///
/// A handler that cannot be installed is logged and never fires.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn drains_finishing_tasks() {
        let mut coordinator = ShutdownCoordinator::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            coordinator.spawn("work", async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        let aborted = coordinator.shutdown(Duration::from_secs(5)).await;
        assert_eq!(aborted, 0);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn aborts_tasks_past_the_timeout() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.spawn("stuck", std::future::pending());
        assert_eq!(coordinator.shutdown(Duration::from_millis(20)).await, 1);
    }

    #[tokio::test]
    async fn token_stops_cooperative_loops() {
        let mut coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();
        coordinator.spawn("loop", async move { token.cancelled().await });
        assert_eq!(coordinator.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn shutdown_cancels_child_tokens() {
        let mut coordinator = ShutdownCoordinator::new();
        let child = coordinator.token().child_token();
        let observed = child.clone();
        coordinator.spawn("retrying", async move {
            tokio::select! {
                () = child.cancelled() => {}
                () = tokio::time::sleep(Duration::from_secs(30)) => {}
            }
        });

        let started = tokio::time::Instant::now();
        assert_eq!(coordinator.shutdown(Duration::from_secs(5)).await, 0);
        assert!(observed.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn finish_lets_tasks_complete_uncancelled() {
        let mut coordinator = ShutdownCoordinator::new();
        let child = coordinator.token().child_token();
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        coordinator.spawn("work", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !child.is_cancelled() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        assert_eq!(coordinator.finish(Duration::from_secs(5)).await, 0);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reap_collects_finished_tasks() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.spawn("quick", async {});
        tokio::time::sleep(Duration::from_millis(10)).await;
        coordinator.reap();
        assert_eq!(coordinator.task_count(), 0);
    }
}
