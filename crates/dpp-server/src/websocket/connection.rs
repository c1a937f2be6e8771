//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

/// A connected WebSocket client.
///
/// Messages are pushed into a bounded queue drained by the socket's writer
/// task. Pushing never waits: a full or closed queue is a failed write.
pub struct ClientConnection {
    /// Unique connection ID (UUID v7).
    pub id: Uuid,
    /// Send channel to the client's writer task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    connected_at: Instant,
    /// Failed pushes since the last successful one.
    consecutive_failures: AtomicU32,
    /// Failed pushes over the connection's lifetime.
    total_failures: AtomicU64,
}

impl ClientConnection {
    /// Create a connection with a fresh ID.
    pub fn new(tx: mpsc::Sender<Arc<String>>) -> Self {
        Self::with_id(Uuid::now_v7(), tx)
    }

    /// Create a connection with a given ID.
    pub fn with_id(id: Uuid, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            tx,
            connected_at: Instant::now(),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
        }
    }

    /// Queue a text message for the client.
    ///
    /// Returns `false` if the queue is full or the writer has gone away.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            self.consecutive_failures.store(0, Ordering::Relaxed);
            true
        } else {
            let _ = self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            let _ = self.total_failures.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Failed pushes since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Failed pushes over the connection's lifetime.
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Whether the writer side has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
