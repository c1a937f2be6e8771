//! Runtime configuration for the relay.
//!
//! [`RelayConfig`] is the resolved, duration-typed view of
//! [`dpp_settings::RelaySettings`]. Its `Default` binds an ephemeral port on
//! localhost, which is what tests want.

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use dpp_core::BackoffConfig;
use dpp_settings::RelaySettings;

use crate::errors::ServerError;

/// Relay configuration.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` for auto-assign).
    pub port: u16,
    /// Outbound queue length per client.
    pub client_buffer_size: usize,
    /// Consecutive failed pushes before a client is pruned.
    pub max_send_failures: u32,
    /// Include hash, attestor, timestamp and block in broadcasts.
    pub include_event_details: bool,
    /// Poller timing.
    pub poller: PollerConfig,
    /// How long tasks may run after shutdown is signalled.
    pub grace_period: Duration,
}

/// Poll loop timing.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    /// Delay between healthy iterations.
    pub interval: Duration,
    /// Delay schedule after failures.
    pub backoff: BackoffConfig,
    /// Upper bound on each ledger call.
    pub request_timeout: Duration,
    /// Consecutive failures before the poller is reported degraded.
    pub failure_alert_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            backoff: BackoffConfig::default(),
            request_timeout: Duration::from_secs(15),
            failure_alert_threshold: 5,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            client_buffer_size: 256,
            max_send_failures: 1,
            include_event_details: false,
            poller: PollerConfig::default(),
            grace_period: Duration::from_secs(10),
        }
    }
}

impl From<&RelaySettings> for RelayConfig {
    fn from(s: &RelaySettings) -> Self {
        Self {
            host: s.server.host.clone(),
            port: s.server.port,
            client_buffer_size: s.server.client_buffer_size,
            max_send_failures: s.server.max_send_failures,
            include_event_details: s.server.include_event_details,
            poller: PollerConfig {
                interval: Duration::from_millis(s.poller.poll_interval_ms),
                backoff: s.poller.backoff(),
                request_timeout: Duration::from_millis(s.ledger.request_timeout_ms),
                failure_alert_threshold: s.poller.failure_alert_threshold,
            },
            grace_period: Duration::from_millis(s.shutdown.grace_period_ms),
        }
    }
}

impl RelayConfig {
    /// Resolve `host:port` to a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ServerError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or(ServerError::InvalidAddress(raw))
    }
}
