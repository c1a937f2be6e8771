//! Graceful shutdown coordination via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

/// Coordinates shutdown of the server task, the poller and every socket.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Tracker for per-socket session tasks, which run outside `handles`.
    pub fn sessions(&self) -> TaskTracker {
        self.sessions.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, wait up to `grace` for `handles` and every tracked
    /// session, then abort the handles still running.
    ///
    /// Returns `true` if everything finished within the grace period.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, grace: Duration) -> bool {
        self.shutdown();
        let _ = self.sessions.close();
        info!(
            task_count = handles.len(),
            session_count = self.sessions.len(),
            grace_ms = grace.as_millis() as u64,
            "waiting for tasks to complete"
        );

        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let sessions = self.sessions.clone();
        let drain = async move {
            let _ = futures::future::join_all(handles).await;
            sessions.wait().await;
        };

        if tokio::time::timeout(grace, drain).await.is_ok() {
            true
        } else {
            warn!("shutdown timed out after {grace:?}, aborting remaining tasks");
            for handle in aborts {
                handle.abort();
            }
            false
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
