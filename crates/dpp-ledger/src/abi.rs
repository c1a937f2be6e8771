//! `PanelEventAdded` ABI definition and log decoding.

// The sol! macro generates items we can't document
#![allow(missing_docs)]

use alloy_primitives::{B256, hex};
use alloy_sol_types::{SolEvent, sol};
use dpp_core::DecodedEvent;

use crate::errors::{LedgerError, LedgerResult};

sol! {
    /// Emitted by the registry whenever an attested panel event is recorded.
    #[derive(Debug, PartialEq, Eq)]
    event PanelEventAdded(
        string panelId,
        string eventType,
        bytes32 eventHash,
        address validatedBy,
        uint256 timestamp
    );
}

/// Topic 0 of every `PanelEventAdded` log.
pub const PANEL_EVENT_TOPIC: B256 = PanelEventAdded::SIGNATURE_HASH;

/// Decode one raw log into a [`DecodedEvent`].
pub fn decode_panel_event(
    topics: &[B256],
    data: &[u8],
    block_number: u64,
) -> LedgerResult<DecodedEvent> {
    let event = PanelEventAdded::decode_raw_log(topics.iter().copied(), data, true)
        .map_err(|e| LedgerError::malformed(format!("PanelEventAdded: {e}")))?;

    Ok(DecodedEvent {
        panel_id: event.panelId,
        event_type: event.eventType,
        event_hash: hex::encode_prefixed(event.eventHash),
        validated_by: event.validatedBy.to_checksum(None),
        timestamp: event.timestamp.saturating_to::<u64>(),
        block_number,
    })
}
