//! Ledger events and the client-facing notification envelope.

use serde::{Deserialize, Serialize};

/// One `PanelEventAdded` log entry, decoded from the ledger.
///
/// Only `panel_id` and `event_type` feed the state cache; the remaining
/// fields are passed through to clients on request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedEvent {
    /// Entity identifier of the panel the event refers to.
    pub panel_id: String,
    /// Event kind label (`"installed"`, `"fault"`, ...).
    pub event_type: String,
    /// `0x`-prefixed hex of the on-chain event hash.
    pub event_hash: String,
    /// `0x`-prefixed address of the attestor that validated the event.
    pub validated_by: String,
    /// On-chain timestamp in seconds.
    pub timestamp: u64,
    /// Block the log was emitted in.
    pub block_number: u64,
}

impl DecodedEvent {
    /// Build an event with only the fields the state cache cares about.
    pub fn new(panel_id: impl Into<String>, event_type: impl Into<String>) -> Self {
        Self {
            panel_id: panel_id.into(),
            event_type: event_type.into(),
            event_hash: String::new(),
            validated_by: String::new(),
            timestamp: 0,
            block_number: 0,
        }
    }

    /// Set the block number.
    #[must_use]
    pub fn at_block(mut self, block_number: u64) -> Self {
        self.block_number = block_number;
        self
    }
}

/// Auxiliary event fields, flattened into [`PanelNotification`] when enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDetails {
    /// On-chain event hash.
    pub event_hash: String,
    /// Attestor address.
    pub validated_by: String,
    /// On-chain timestamp in seconds.
    pub timestamp: u64,
    /// Block number.
    pub block_number: u64,
}

/// The JSON text frame pushed to every connected client per event.
///
/// Wire format: `{"panelId": "...", "eventType": "..."}`, optionally
/// extended with the [`EventDetails`] fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelNotification {
    /// Entity identifier.
    pub panel_id: String,
    /// Event kind label.
    pub event_type: String,
    /// Pass-through fields.
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub details: Option<EventDetails>,
}

impl PanelNotification {
    /// Build the notification for an event.
    pub fn from_event(event: &DecodedEvent, include_details: bool) -> Self {
        let details = include_details.then(|| EventDetails {
            event_hash: event.event_hash.clone(),
            validated_by: event.validated_by.clone(),
            timestamp: event.timestamp,
            block_number: event.block_number,
        });
        Self {
            panel_id: event.panel_id.clone(),
            event_type: event.event_type.clone(),
            details,
        }
    }
}
