//! Event handling: cache update, fan-out to connected clients, pruning.

use std::sync::Arc;

use dpp_core::{DecodedEvent, PanelNotification};
use metrics::counter;
use tracing::{debug, info, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::{
    BROADCAST_FAILURES_TOTAL, BROADCAST_MESSAGES_TOTAL, CLIENTS_PRUNED_TOTAL,
    EVENTS_PROCESSED_TOTAL, EVENTS_SKIPPED_TOTAL,
};
use crate::state::StateCache;

/// Outcome of handling one event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Clients in the registry snapshot.
    pub recipients: usize,
    /// Clients the notification was queued for.
    pub delivered: usize,
    /// Clients whose push failed.
    pub failed: usize,
    /// Clients removed from the registry as a result.
    pub pruned: usize,
    /// The event was rejected before reaching the cache.
    pub skipped: bool,
}

/// Applies events to the [`StateCache`] and pushes them to every client.
pub struct Broadcaster {
    cache: Arc<StateCache>,
    registry: Arc<ConnectionRegistry>,
    max_send_failures: u32,
    include_details: bool,
}

impl Broadcaster {
    /// Create a broadcaster over shared cache and registry handles.
    pub fn new(cache: Arc<StateCache>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            cache,
            registry,
            max_send_failures: 1,
            include_details: false,
        }
    }

    /// Consecutive failed pushes before a client is pruned (minimum 1).
    #[must_use]
    pub fn with_max_send_failures(mut self, max: u32) -> Self {
        self.max_send_failures = max.max(1);
        self
    }

    /// Add the auxiliary event fields to each notification.
    #[must_use]
    pub fn with_event_details(mut self, include: bool) -> Self {
        self.include_details = include;
        self
    }

    /// Shared cache handle.
    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    /// Shared registry handle.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Record `event` in the cache, then push it to every registered client.
    ///
    /// A failed push never stops delivery to the remaining clients.
    pub fn handle(&self, event: &DecodedEvent) -> BroadcastReport {
        if event.panel_id.is_empty() {
            warn!(
                event_type = %event.event_type,
                block = event.block_number,
                "skipping event without panel id"
            );
            counter!(EVENTS_SKIPPED_TOTAL).increment(1);
            return BroadcastReport {
                skipped: true,
                ..BroadcastReport::default()
            };
        }

        self.cache.set(&event.panel_id, &event.event_type);
        counter!(EVENTS_PROCESSED_TOTAL).increment(1);

        let notification = PanelNotification::from_event(event, self.include_details);
        let json = match serde_json::to_string(&notification) {
            Ok(j) => Arc::new(j),
            Err(e) => {
                warn!(panel_id = %event.panel_id, error = %e, "failed to serialize notification");
                return BroadcastReport::default();
            }
        };

        let mut report = BroadcastReport::default();
        let mut to_remove = Vec::new();
        self.registry.for_each(|conn| {
            report.recipients += 1;
            if conn.send(Arc::clone(&json)) {
                report.delivered += 1;
                return;
            }
            report.failed += 1;
            let failures = conn.consecutive_failures();
            if failures >= self.max_send_failures {
                to_remove.push(conn.id);
            } else {
                debug!(conn_id = %conn.id, failures, "push failed, keeping client");
            }
        });

        for id in &to_remove {
            if self.registry.remove(id) {
                report.pruned += 1;
                warn!(conn_id = %id, "removed client after failed push");
            }
        }

        counter!(BROADCAST_MESSAGES_TOTAL).increment(report.delivered as u64);
        counter!(BROADCAST_FAILURES_TOTAL).increment(report.failed as u64);
        counter!(CLIENTS_PRUNED_TOTAL).increment(report.pruned as u64);

        info!(
            panel_id = %event.panel_id,
            event_type = %event.event_type,
            block = event.block_number,
            recipients = report.recipients,
            delivered = report.delivered,
            pruned = report.pruned,
            "panel event relayed"
        );
        report
    }
}
