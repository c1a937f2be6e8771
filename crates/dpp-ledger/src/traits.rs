//! The ledger client contract.

use async_trait::async_trait;
use dpp_core::DecodedEvent;

use crate::errors::LedgerResult;

/// Read access to the registry contract's event log.
///
/// Implementors must be `Send + Sync`; the poller holds one behind an `Arc`.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current head block number.
    async fn current_height(&self) -> LedgerResult<u64>;

    /// Decoded `PanelEventAdded` events in `from..=to`, in ledger order.
    async fn events(&self, from: u64, to: u64) -> LedgerResult<Vec<DecodedEvent>>;
}
