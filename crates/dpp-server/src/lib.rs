//! # dpp-server
//!
//! Relays `PanelEventAdded` ledger events to WebSocket clients.
//!
//! - [`state::StateCache`]: latest status per panel, served by `/api/visibility`
//! - [`websocket::registry::ConnectionRegistry`]: connected clients
//! - [`websocket::broadcast::Broadcaster`]: cache update + fan-out + pruning
//! - [`poller::EventPoller`]: cursor-tracking poll loop over a [`dpp_ledger::LedgerClient`]
//! - [`relay::RelayServer`]: binds the listener, runs the server and the poller,
//!   and shuts both down via a shared `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod poller;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod websocket;

pub use config::RelayConfig;
pub use errors::ServerError;
pub use relay::{RelayHandle, RelayServer};
