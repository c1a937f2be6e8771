//! # dpp-core
//!
//! Shared building blocks for the DPP relay:
//!
//! - [`events`]: decoded ledger events and the notification pushed to clients
//! - [`retry`]: exponential backoff with jitter for ledger polling
//! - [`logging`]: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod events;
pub mod logging;
pub mod retry;

pub use events::{DecodedEvent, EventDetails, PanelNotification};
pub use logging::LogFormat;
pub use retry::BackoffConfig;
