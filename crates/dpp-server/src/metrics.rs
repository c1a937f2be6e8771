//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across modules.

/// Events handed to the broadcaster (counter).
pub const EVENTS_PROCESSED_TOTAL: &str = "dpp_events_processed_total";
/// Events dropped before broadcast, e.g. empty panel id (counter).
pub const EVENTS_SKIPPED_TOTAL: &str = "dpp_events_skipped_total";
/// Poll iterations attempted (counter).
pub const POLL_ITERATIONS_TOTAL: &str = "dpp_poll_iterations_total";
/// Failed poll iterations (counter, labels: category).
pub const POLL_FAILURES_TOTAL: &str = "dpp_poll_failures_total";
/// Last fully processed block (gauge).
pub const CURSOR_BLOCK: &str = "dpp_cursor_block";
/// Current failure streak of the poller (gauge).
pub const POLLER_CONSECUTIVE_FAILURES: &str = "dpp_poller_consecutive_failures";
/// Notifications queued to clients (counter).
pub const BROADCAST_MESSAGES_TOTAL: &str = "dpp_broadcast_messages_total";
/// Notifications that could not be queued (counter).
pub const BROADCAST_FAILURES_TOTAL: &str = "dpp_broadcast_failures_total";
/// Clients removed after failed pushes (counter).
pub const CLIENTS_PRUNED_TOTAL: &str = "dpp_clients_pruned_total";
/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "dpp_ws_connections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "dpp_ws_connections_active";
/// Ledger logs that failed to decode (counter).
pub const LEDGER_DECODE_FAILURES_TOTAL: &str = dpp_ledger::jsonrpc::LEDGER_DECODE_FAILURES_TOTAL;
