//! # dpp-ledger
//!
//! Read access to the panel registry contract's event log.
//!
//! - [`LedgerClient`]: the two calls the relay needs (head height, events in
//!   an inclusive block range)
//! - [`JsonRpcLedgerClient`]: Ethereum JSON-RPC implementation over `reqwest`
//! - [`abi`]: `PanelEventAdded` event definition and log decoding
//! - `ScriptedLedger` (feature `testutil`): queue-driven in-memory client

#![deny(unsafe_code)]

pub mod abi;
pub mod errors;
pub mod jsonrpc;
pub mod traits;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use errors::{LedgerError, LedgerResult};
pub use jsonrpc::JsonRpcLedgerClient;
pub use traits::LedgerClient;

#[cfg(any(test, feature = "testutil"))]
pub use testutil::ScriptedLedger;
