//! Relay driver: binds the listener and runs the HTTP server and the poller
//! side by side until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use dpp_ledger::LedgerClient;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::errors::ServerError;
use crate::poller::{EventPoller, PollerHealth};
use crate::server::{AppState, build_router};
use crate::shutdown::ShutdownCoordinator;
use crate::state::StateCache;
use crate::websocket::broadcast::Broadcaster;
use crate::websocket::registry::ConnectionRegistry;

/// Owns the shared state and starts the relay.
pub struct RelayServer {
    config: RelayConfig,
    ledger: Arc<dyn LedgerClient>,
    metrics: PrometheusHandle,
    cache: Arc<StateCache>,
    registry: Arc<ConnectionRegistry>,
    health: Arc<PollerHealth>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
}

impl RelayServer {
    /// Create a relay over `ledger`.
    pub fn new(config: RelayConfig, ledger: Arc<dyn LedgerClient>, metrics: PrometheusHandle) -> Self {
        let health = Arc::new(PollerHealth::new(config.poller.failure_alert_threshold));
        Self {
            config,
            ledger,
            metrics,
            cache: Arc::new(StateCache::new()),
            registry: Arc::new(ConnectionRegistry::new()),
            health,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        }
    }

    /// Build the Axum router over this relay's state.
    pub fn router(&self) -> Router {
        build_router(AppState {
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            health: Arc::clone(&self.health),
            cancel: self.shutdown.token(),
            sessions: self.shutdown.sessions(),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
            client_buffer_size: self.config.client_buffer_size,
        })
    }

    /// Get the state cache.
    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the poller health handle.
    pub fn health(&self) -> &Arc<PollerHealth> {
        &self.health
    }

    /// Get the relay configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    fn poller(&self) -> EventPoller {
        let broadcaster = Broadcaster::new(Arc::clone(&self.cache), Arc::clone(&self.registry))
            .with_max_send_failures(self.config.max_send_failures)
            .with_event_details(self.config.include_event_details);
        EventPoller::new(
            Arc::clone(&self.ledger),
            Arc::new(broadcaster),
            self.config.poller.clone(),
            self.shutdown.token(),
        )
        .with_health(Arc::clone(&self.health))
    }

    /// Bind the listener, then start serving and polling.
    ///
    /// A bind failure is returned before any task is spawned.
    pub async fn listen(self) -> Result<RelayHandle, ServerError> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(&addr, e))?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });

        let poller = tokio::spawn(self.poller().run());

        info!(
            addr = %local_addr,
            poll_interval_ms = self.config.poller.interval.as_millis() as u64,
            "relay listening"
        );

        Ok(RelayHandle {
            local_addr,
            shutdown: self.shutdown,
            grace_period: self.config.grace_period,
            cache: self.cache,
            registry: self.registry,
            health: self.health,
            tasks: vec![server, poller],
        })
    }
}

/// A running relay.
pub struct RelayHandle {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    grace_period: std::time::Duration,
    cache: Arc<StateCache>,
    registry: Arc<ConnectionRegistry>,
    health: Arc<PollerHealth>,
    tasks: Vec<JoinHandle<()>>,
}

impl RelayHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the state cache.
    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the poller health handle.
    pub fn health(&self) -> &Arc<PollerHealth> {
        &self.health
    }

    /// Stop accepting, stop polling and close every socket.
    ///
    /// Returns `true` if the server, the poller and every session finished
    /// within the grace period.
    pub async fn shutdown(self) -> bool {
        info!("relay shutting down");
        let clean = self
            .shutdown
            .graceful_shutdown(self.tasks, self.grace_period)
            .await;
        info!(clean, "relay stopped");
        clean
    }
}
