//! In-memory ledger for tests.
//!
//! Holds a head height and a map of block → events. Failures are queued and
//! consumed by the next matching call, so a test can script "head query fails
//! once, then succeeds" without timing tricks.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use dpp_core::DecodedEvent;
use parking_lot::Mutex;

use crate::errors::{LedgerError, LedgerResult};
use crate::traits::LedgerClient;

#[derive(Default)]
struct Script {
    head: u64,
    blocks: BTreeMap<u64, Vec<DecodedEvent>>,
    height_failures: VecDeque<LedgerError>,
    events_failures: VecDeque<LedgerError>,
    height_calls: usize,
    requested: Vec<(u64, u64)>,
}

/// Scripted [`LedgerClient`].
#[derive(Default)]
pub struct ScriptedLedger {
    script: Mutex<Script>,
}

impl ScriptedLedger {
    /// Ledger whose head starts at `head`.
    pub fn new(head: u64) -> Self {
        let ledger = Self::default();
        ledger.script.lock().head = head;
        ledger
    }

    /// Move the head.
    pub fn set_head(&self, head: u64) {
        self.script.lock().head = head;
    }

    /// Current head.
    pub fn head(&self) -> u64 {
        self.script.lock().head
    }

    /// Append an event to `block`. The event's block number is overwritten.
    pub fn add_event(&self, block: u64, event: DecodedEvent) {
        self.script
            .lock()
            .blocks
            .entry(block)
            .or_default()
            .push(event.at_block(block));
    }

    /// Append events to `block` and move the head to it.
    pub fn mine(&self, block: u64, events: impl IntoIterator<Item = DecodedEvent>) {
        for event in events {
            self.add_event(block, event);
        }
        self.set_head(block);
    }

    /// Make the next `current_height` call fail with `err`.
    pub fn fail_next_height(&self, err: LedgerError) {
        self.script.lock().height_failures.push_back(err);
    }

    /// Make the next `events` call fail with `err`.
    pub fn fail_next_events(&self, err: LedgerError) {
        self.script.lock().events_failures.push_back(err);
    }

    /// Number of `current_height` calls so far.
    pub fn height_calls(&self) -> usize {
        self.script.lock().height_calls
    }

    /// Ranges passed to `events`, in call order.
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.script.lock().requested.clone()
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn current_height(&self) -> LedgerResult<u64> {
        let mut script = self.script.lock();
        script.height_calls += 1;
        match script.height_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(script.head),
        }
    }

    async fn events(&self, from: u64, to: u64) -> LedgerResult<Vec<DecodedEvent>> {
        let mut script = self.script.lock();
        script.requested.push((from, to));
        if let Some(err) = script.events_failures.pop_front() {
            return Err(err);
        }
        Ok(script
            .blocks
            .range(from..=to)
            .flat_map(|(_, events)| events.iter().cloned())
            .collect())
    }
}
