//! Per-socket lifecycle: register, pump queued notifications, unregister.
//!
//! Clients never send anything meaningful; inbound frames are read only to
//! notice a close. No handshake payload is sent on connect.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL};

/// Serve one upgraded socket until it closes or `cancel` fires.
pub async fn run_session(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    buffer_size: usize,
    cancel: CancellationToken,
) {
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(buffer_size.max(1));
    let conn = Arc::new(ClientConnection::new(tx));
    let conn_id = conn.id;
    registry.register(Arc::clone(&conn));
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).set(registry.len() as f64);
    info!(conn_id = %conn_id, clients = registry.len(), "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Writer: forward queued notifications; on shutdown send a close frame.
    let writer_cancel = cancel.clone();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_cancel.cancelled() => {
                    let frame = CloseFrame {
                        code: close_code::AWAY,
                        reason: Utf8Bytes::from_static("server shutting down"),
                    };
                    let _ = ws_tx.send(Message::Close(Some(frame))).await;
                    break;
                }
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.as_str().to_owned().into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
        // dropping rx here makes later pushes fail, which prunes the client
    });

    // Reader: drain inbound frames until the peer closes.
    let mut reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => {
            // Give the writer a chance to flush a pending close frame.
            if !cancel.is_cancelled() {
                writer.abort();
            }
            let _ = writer.await;
        }
    }

    let _ = registry.remove(&conn_id);
    gauge!(WS_CONNECTIONS_ACTIVE).set(registry.len() as f64);
    debug!(
        conn_id = %conn_id,
        clients = registry.len(),
        connected_secs = conn.age().as_secs(),
        send_failures = conn.total_failures(),
        "client disconnected"
    );
}
