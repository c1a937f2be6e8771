//! `/api/test` health check and `/api/relay` status bodies.

use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::poller::PollerStatus;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"success"` when the server is running.
    pub status: &'static str,
    /// Current time, RFC 3339 UTC.
    pub timestamp: String,
}

/// Build a health response stamped with the current time.
pub fn health_check() -> HealthResponse {
    HealthResponse {
        status: "success",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Relay status response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    /// Poller progress.
    pub poller: PollerStatus,
    /// Open WebSocket clients.
    pub connected_clients: usize,
    /// Panels in the state cache.
    pub tracked_panels: usize,
    /// Seconds since the relay started.
    pub uptime_secs: u64,
}

/// Build a relay status from live counters.
pub fn relay_status(
    start_time: Instant,
    poller: PollerStatus,
    connected_clients: usize,
    tracked_panels: usize,
) -> RelayStatus {
    RelayStatus {
        poller,
        connected_clients,
        tracked_panels,
        uptime_secs: start_time.elapsed().as_secs(),
    }
}
