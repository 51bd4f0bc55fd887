//! In-flight connection tracking and shutdown drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Counts connection tasks that have not finished yet.
///
/// Independent of the registry: an evicted connection leaves the registry
/// immediately, but its task still counts here until it has closed the socket.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running task. The count drops when the guard does.
    #[must_use]
    pub fn track(&self) -> ActiveGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            active: Arc::clone(&self.active),
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for every tracked task to finish, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) -> DrainResult {
        let deadline = Instant::now() + timeout;
        let mut last_log = Instant::now();

        loop {
            let active = self.count();

            if active == 0 {
                return DrainResult::Complete;
            }

            if Instant::now() > deadline {
                warn!(
                    active_connections = active,
                    "Drain timeout exceeded, forcing shutdown"
                );
                return DrainResult::Timeout { remaining: active };
            }

            if last_log.elapsed() >= Duration::from_secs(1) {
                info!(active_connections = active, "Draining connections...");
                last_log = Instant::now();
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// RAII handle for one tracked task.
#[derive(Debug)]
pub struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of draining connections at shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainResult {
    /// All connections closed before the timeout
    Complete,
    /// Timeout reached with connections still open
    Timeout {
        /// Number of connection tasks still running
        remaining: usize,
    },
}
