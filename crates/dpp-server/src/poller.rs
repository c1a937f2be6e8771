//! Ledger poll loop.
//!
//! The poller owns the cursor: the last block whose events have all been
//! handed to the [`Broadcaster`]. Each iteration reads the head; if it moved
//! past the cursor, the events in `cursor+1..=head` are fetched and handled
//! in ledger order, and only then does the cursor move to `head`. A failed
//! head query or fetch leaves the cursor where it was.
//!
//! Healthy iterations are spaced by the poll interval. After a failure the
//! delay follows [`BackoffConfig`] until the next success.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dpp_core::BackoffConfig;
use dpp_ledger::{LedgerClient, LedgerError, LedgerResult};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::metrics::{
    CURSOR_BLOCK, POLL_FAILURES_TOTAL, POLL_ITERATIONS_TOTAL, POLLER_CONSECUTIVE_FAILURES,
};
use crate::websocket::broadcast::Broadcaster;

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

/// Poller progress and failure streak, shared with HTTP handlers.
pub struct PollerHealth {
    initialized: AtomicBool,
    cursor: AtomicU64,
    head: AtomicU64,
    consecutive_failures: AtomicU32,
    total_failures: AtomicU64,
    /// Unix millis of the last successful iteration, `0` if none yet.
    last_success_ms: AtomicI64,
    last_error: Mutex<Option<String>>,
    alert_threshold: u32,
}

/// Serializable view of [`PollerHealth`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollerStatus {
    /// Whether the starting head has been read.
    pub initialized: bool,
    /// Last fully processed block.
    pub cursor: u64,
    /// Head seen by the last successful head query.
    pub head: u64,
    /// Current failure streak.
    pub consecutive_failures: u32,
    /// Failures since startup.
    pub total_failures: u64,
    /// Streak has reached the alert threshold.
    pub degraded: bool,
    /// Time of the last successful iteration.
    pub last_success: Option<DateTime<Utc>>,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
}

impl PollerHealth {
    /// Create health state that reports degraded after `alert_threshold` failures.
    pub fn new(alert_threshold: u32) -> Self {
        Self {
            initialized: AtomicBool::new(false),
            cursor: AtomicU64::new(0),
            head: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            total_failures: AtomicU64::new(0),
            last_success_ms: AtomicI64::new(0),
            last_error: Mutex::new(None),
            alert_threshold: alert_threshold.max(1),
        }
    }

    fn record_success(&self, cursor: u64, head: u64) {
        self.initialized.store(true, Ordering::Relaxed);
        self.cursor.store(cursor, Ordering::Relaxed);
        self.head.store(head, Ordering::Relaxed);
        self.last_success_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        let previous = self.consecutive_failures.swap(0, Ordering::Relaxed);
        if previous >= self.alert_threshold {
            info!(failures = previous, cursor, "ledger reachable again");
        }
        gauge!(CURSOR_BLOCK).set(cursor as f64);
        gauge!(POLLER_CONSECUTIVE_FAILURES).set(0.0);
    }

    fn record_failure(&self, err: &LedgerError) -> u32 {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = self.total_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(err.to_string());
        counter!(POLL_FAILURES_TOTAL, "category" => err.category()).increment(1);
        gauge!(POLLER_CONSECUTIVE_FAILURES).set(f64::from(failures));
        failures
    }

    /// Last fully processed block.
    pub fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Relaxed)
    }

    /// Current failure streak.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Whether the failure streak has reached the alert threshold.
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures() >= self.alert_threshold
    }

    /// Point-in-time copy for reporting.
    pub fn status(&self) -> PollerStatus {
        let last_success_ms = self.last_success_ms.load(Ordering::Relaxed);
        PollerStatus {
            initialized: self.initialized.load(Ordering::Relaxed),
            cursor: self.cursor(),
            head: self.head.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures(),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
            last_success: (last_success_ms > 0)
                .then(|| DateTime::from_timestamp_millis(last_success_ms))
                .flatten(),
            last_error: self.last_error.lock().clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Poller
// ─────────────────────────────────────────────────────────────────────────────

/// Result of one successful iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// First head read; the cursor now starts here.
    Initialized {
        /// Starting cursor.
        cursor: u64,
    },
    /// Head has not moved past the cursor; nothing fetched.
    UpToDate {
        /// Unchanged cursor.
        cursor: u64,
        /// Head reported by the ledger.
        head: u64,
    },
    /// A range was fetched and every event handed to the broadcaster.
    Processed {
        /// First block of the range.
        from: u64,
        /// Last block of the range, now the cursor.
        to: u64,
        /// Events in the range.
        events: usize,
    },
}

/// Drives a [`LedgerClient`] and feeds new events to a [`Broadcaster`].
pub struct EventPoller {
    ledger: Arc<dyn LedgerClient>,
    broadcaster: Arc<Broadcaster>,
    health: Arc<PollerHealth>,
    config: PollerConfig,
    cancel: CancellationToken,
    cursor: Option<u64>,
}

impl EventPoller {
    /// Create a poller. The cursor is set by the first head read.
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        broadcaster: Arc<Broadcaster>,
        config: PollerConfig,
        cancel: CancellationToken,
    ) -> Self {
        let health = Arc::new(PollerHealth::new(config.failure_alert_threshold));
        Self {
            ledger,
            broadcaster,
            health,
            config,
            cancel,
            cursor: None,
        }
    }

    /// Use an existing health handle (shared with the HTTP layer).
    #[must_use]
    pub fn with_health(mut self, health: Arc<PollerHealth>) -> Self {
        self.health = health;
        self
    }

    /// Start from a known cursor instead of the current head.
    #[must_use]
    pub fn with_cursor(mut self, cursor: u64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Shared health handle.
    pub fn health(&self) -> &Arc<PollerHealth> {
        &self.health
    }

    /// Last fully processed block, if initialized.
    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }

    fn backoff(&self) -> &BackoffConfig {
        &self.config.backoff
    }

    /// Read the starting head, retrying with backoff until it succeeds or
    /// the poller is cancelled.
    pub async fn initialize(&mut self) -> LedgerResult<u64> {
        if let Some(cursor) = self.cursor {
            return Ok(cursor);
        }
        loop {
            match self.poll_once().await {
                Ok(_) => {
                    if let Some(cursor) = self.cursor {
                        return Ok(cursor);
                    }
                }
                Err(LedgerError::Cancelled) => return Err(LedgerError::Cancelled),
                Err(_) => {
                    let delay = self.backoff().delay_for(self.health.consecutive_failures());
                    if !self.sleep(delay).await {
                        return Err(LedgerError::Cancelled);
                    }
                }
            }
        }
    }

    /// Run one iteration of the poll state machine.
    pub async fn poll_once(&mut self) -> LedgerResult<PollOutcome> {
        counter!(POLL_ITERATIONS_TOTAL).increment(1);
        let result = self.poll_inner().await;
        if let Err(e) = &result {
            if !matches!(e, LedgerError::Cancelled) {
                self.report_failure(e);
            }
        }
        result
    }

    async fn poll_inner(&mut self) -> LedgerResult<PollOutcome> {
        let ledger = Arc::clone(&self.ledger);
        let head = self.bounded(ledger.current_height()).await?;

        let Some(cursor) = self.cursor else {
            self.cursor = Some(head);
            self.health.record_success(head, head);
            info!(cursor = head, "poller initialized at ledger head");
            return Ok(PollOutcome::Initialized { cursor: head });
        };

        if head <= cursor {
            debug!(cursor, head, "no new blocks");
            self.health.record_success(cursor, head);
            return Ok(PollOutcome::UpToDate { cursor, head });
        }

        let from = cursor + 1;
        let events = self.bounded(ledger.events(from, head)).await?;
        debug!(from_block = from, to_block = head, events = events.len(), "fetched range");

        for event in &events {
            let _ = self.broadcaster.handle(event);
        }

        self.cursor = Some(head);
        self.health.record_success(head, head);
        Ok(PollOutcome::Processed {
            from,
            to: head,
            events: events.len(),
        })
    }

    fn report_failure(&self, err: &LedgerError) {
        let failures = self.health.record_failure(err);
        let threshold = self.config.failure_alert_threshold.max(1);
        if failures == threshold {
            error!(
                failures,
                cursor = self.cursor,
                category = err.category(),
                error = %err,
                "ledger unreachable, relay is serving stale state"
            );
        } else {
            warn!(
                failures,
                cursor = self.cursor,
                category = err.category(),
                retryable = err.is_retryable(),
                error = %err,
                "poll failed"
            );
        }
    }

    /// Bound a ledger call by the request timeout and the cancel token.
    async fn bounded<T>(&self, call: impl Future<Output = LedgerResult<T>>) -> LedgerResult<T> {
        let timeout = self.config.request_timeout;
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(LedgerError::Cancelled),
            res = tokio::time::timeout(timeout, call) => res.unwrap_or(Err(LedgerError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            })),
        }
    }

    /// Sleep for `delay`. Returns `false` if cancelled first.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Poll until cancelled.
    ///
    /// The first head read happens immediately; every later iteration waits
    /// out the interval (or the backoff delay after a failure) first.
    pub async fn run(mut self) {
        if self.cursor.is_none() && self.initialize().await.is_err() {
            info!("poller cancelled before initialization");
            return;
        }

        loop {
            let delay = match self.health.consecutive_failures() {
                0 => self.config.interval,
                n => self.backoff().delay_for(n),
            };
            if !self.sleep(delay).await {
                break;
            }
            match self.poll_once().await {
                Err(LedgerError::Cancelled) => break,
                Ok(PollOutcome::Processed { from, to, events }) => {
                    debug!(from_block = from, to_block = to, events, "poll iteration complete");
                }
                _ => {}
            }
        }
        info!(cursor = self.cursor, "poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use dpp_core::DecodedEvent;
    use dpp_ledger::ScriptedLedger;
    use tokio::sync::mpsc;

    use super::*;
    use crate::state::StateCache;
    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::ConnectionRegistry;

    fn fast_config() -> PollerConfig {
        PollerConfig {
            interval: Duration::from_millis(100),
            backoff: BackoffConfig {
                base_delay_ms: 1000,
                max_delay_ms: 8000,
                jitter_factor: 0.0,
            },
            request_timeout: Duration::from_secs(1),
            failure_alert_threshold: 3,
        }
    }

    struct Harness {
        ledger: Arc<ScriptedLedger>,
        broadcaster: Arc<Broadcaster>,
        cancel: CancellationToken,
    }

    impl Harness {
        fn new(head: u64) -> Self {
            let broadcaster = Arc::new(Broadcaster::new(
                Arc::new(StateCache::new()),
                Arc::new(ConnectionRegistry::new()),
            ));
            Self {
                ledger: Arc::new(ScriptedLedger::new(head)),
                broadcaster,
                cancel: CancellationToken::new(),
            }
        }

        fn poller(&self) -> EventPoller {
            EventPoller::new(
                Arc::clone(&self.ledger) as Arc<dyn LedgerClient>,
                Arc::clone(&self.broadcaster),
                fast_config(),
                self.cancel.clone(),
            )
        }

        fn client(&self) -> mpsc::Receiver<Arc<String>> {
            let (tx, rx) = mpsc::channel(64);
            self.broadcaster
                .registry()
                .register(Arc::new(ClientConnection::new(tx)));
            rx
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<String>>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push((*msg).clone());
        }
        out
    }

    #[tokio::test]
    async fn first_poll_initializes_at_head_and_skips_history() {
        let h = Harness::new(0);
        h.ledger.mine(10, [DecodedEvent::new("OLD", "installed")]);
        let mut poller = h.poller();

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::Initialized { cursor: 10 });
        assert_eq!(poller.cursor(), Some(10));
        assert!(h.ledger.requested_ranges().is_empty());
        assert!(h.broadcaster.cache().is_empty());
    }

    #[tokio::test]
    async fn head_not_moved_does_not_fetch() {
        let h = Harness::new(5);
        let mut rx = h.client();
        let mut poller = h.poller().with_cursor(5);

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::UpToDate { cursor: 5, head: 5 });
        // repeat: still idempotent
        let again = poller.poll_once().await.unwrap();
        assert_eq!(again, outcome);

        assert!(h.ledger.requested_ranges().is_empty());
        assert!(h.broadcaster.cache().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn head_behind_cursor_is_up_to_date() {
        let h = Harness::new(3);
        let mut poller = h.poller().with_cursor(7);
        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(outcome, PollOutcome::UpToDate { cursor: 7, head: 3 });
        assert_eq!(poller.cursor(), Some(7));
    }

    #[tokio::test]
    async fn processes_inclusive_range_in_order_then_advances() {
        let h = Harness::new(100);
        let mut rx = h.client();
        let mut poller = h.poller().with_cursor(100);

        h.ledger.mine(
            101,
            [DecodedEvent::new("P1", "installed"), DecodedEvent::new("P2", "fault")],
        );
        h.ledger.mine(103, [DecodedEvent::new("P1", "fault")]);

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Processed {
                from: 101,
                to: 103,
                events: 3
            }
        );
        assert_eq!(h.ledger.requested_ranges(), vec![(101, 103)]);
        assert_eq!(poller.cursor(), Some(103));
        assert_eq!(poller.health().cursor(), 103);

        let snap = h.broadcaster.cache().snapshot();
        assert_eq!(snap["P1"], "fault");
        assert_eq!(snap["P2"], "fault");

        let msgs = drain(&mut rx);
        assert_eq!(
            msgs,
            vec![
                r#"{"panelId":"P1","eventType":"installed"}"#,
                r#"{"panelId":"P2","eventType":"fault"}"#,
                r#"{"panelId":"P1","eventType":"fault"}"#,
            ]
        );
    }

    #[tokio::test]
    async fn head_failure_keeps_cursor_then_recovers() {
        let h = Harness::new(20);
        let mut poller = h.poller().with_cursor(20);
        h.ledger.mine(21, [DecodedEvent::new("P1", "installed")]);
        h.ledger.fail_next_height(LedgerError::RateLimited {
            message: "429".into(),
        });

        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, LedgerError::RateLimited { .. }));
        assert_eq!(poller.cursor(), Some(20));
        assert_eq!(poller.health().consecutive_failures(), 1);
        assert!(h.broadcaster.cache().is_empty());

        let outcome = poller.poll_once().await.unwrap();
        assert_eq!(
            outcome,
            PollOutcome::Processed {
                from: 21,
                to: 21,
                events: 1
            }
        );
        assert_eq!(poller.cursor(), Some(21));
        assert_eq!(poller.health().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_cursor_and_refetches_same_range() {
        let h = Harness::new(50);
        let mut poller = h.poller().with_cursor(50);
        h.ledger.mine(52, [DecodedEvent::new("P9", "installed")]);
        h.ledger.fail_next_events(LedgerError::Timeout { timeout_ms: 10 });

        assert!(poller.poll_once().await.is_err());
        assert_eq!(poller.cursor(), Some(50));
        let _ = poller.poll_once().await.unwrap();
        assert_eq!(h.ledger.requested_ranges(), vec![(51, 52), (51, 52)]);
        assert_eq!(h.broadcaster.cache().snapshot()["P9"], "installed");
    }

    #[tokio::test]
    async fn degraded_after_threshold_and_cleared_on_success() {
        let h = Harness::new(1);
        let mut poller = h.poller().with_cursor(1);
        for _ in 0..3 {
            h.ledger.fail_next_height(LedgerError::Status {
                status: 503,
                message: String::new(),
            });
        }

        for expected in 1..=3 {
            assert!(poller.poll_once().await.is_err());
            assert_eq!(poller.health().consecutive_failures(), expected);
        }
        let status = poller.health().status();
        assert!(status.degraded);
        assert_eq!(status.total_failures, 3);
        assert!(status.last_error.unwrap().contains("503"));
        assert!(status.last_success.is_none());

        let _ = poller.poll_once().await.unwrap();
        let status = poller.health().status();
        assert!(!status.degraded);
        assert!(status.last_success.is_some());
        assert_eq!(status.total_failures, 3);
    }

    struct HangingLedger;

    #[async_trait]
    impl LedgerClient for HangingLedger {
        async fn current_height(&self) -> LedgerResult<u64> {
            std::future::pending().await
        }
        async fn events(&self, _from: u64, _to: u64) -> LedgerResult<Vec<DecodedEvent>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let h = Harness::new(0);
        let mut poller = EventPoller::new(
            Arc::new(HangingLedger),
            Arc::clone(&h.broadcaster),
            fast_config(),
            h.cancel.clone(),
        )
        .with_cursor(0);

        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, LedgerError::Timeout { timeout_ms: 1000 }));
        assert_eq!(poller.health().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_in_flight_call() {
        let h = Harness::new(0);
        let mut poller = EventPoller::new(
            Arc::new(HangingLedger),
            Arc::clone(&h.broadcaster),
            PollerConfig {
                request_timeout: Duration::from_secs(3600),
                ..fast_config()
            },
            h.cancel.clone(),
        );

        let cancel = h.cancel.clone();
        let _ = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });

        let err = poller.poll_once().await.unwrap_err();
        assert!(matches!(err, LedgerError::Cancelled));
        // cancellation is not a ledger failure
        assert_eq!(poller.health().consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_retries_with_backoff() {
        let h = Harness::new(42);
        h.ledger.fail_next_height(LedgerError::Timeout { timeout_ms: 1 });
        h.ledger.fail_next_height(LedgerError::Timeout { timeout_ms: 1 });
        let mut poller = h.poller();

        let started = tokio::time::Instant::now();
        let cursor = poller.initialize().await.unwrap();
        assert_eq!(cursor, 42);
        assert_eq!(h.ledger.height_calls(), 3);
        // 1s after the first failure, 2s after the second
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_stops_on_cancel() {
        let h = Harness::new(0);
        for _ in 0..10 {
            h.ledger.fail_next_height(LedgerError::Timeout { timeout_ms: 1 });
        }
        let mut poller = h.poller();
        h.cancel.cancel();
        assert!(matches!(
            poller.initialize().await,
            Err(LedgerError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_interval_and_stops_on_cancel() {
        let h = Harness::new(5);
        let mut rx = h.client();
        let health = Arc::new(PollerHealth::new(3));
        let poller = h.poller().with_health(Arc::clone(&health));
        let task = tokio::spawn(poller.run());

        // let the initial head read happen
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(health.cursor(), 5);

        h.ledger.mine(6, [DecodedEvent::new("P1", "installed")]);
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(health.cursor(), 6);
        assert_eq!(drain(&mut rx).len(), 1);

        h.cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_backs_off_after_failure() {
        let h = Harness::new(5);
        let poller = h.poller().with_cursor(5);
        h.ledger.fail_next_height(LedgerError::Timeout { timeout_ms: 1 });
        let task = tokio::spawn(poller.run());

        // first iteration after the 100ms interval fails
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.ledger.height_calls(), 1);

        // backoff is 1s, not the 100ms interval
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(h.ledger.height_calls(), 1);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.ledger.height_calls(), 2);

        h.cancel.cancel();
        task.await.unwrap();
    }

    #[test]
    fn status_serializes_camel_case() {
        let health = PollerHealth::new(2);
        let json = serde_json::to_value(health.status()).unwrap();
        assert_eq!(json["consecutiveFailures"], 0);
        assert_eq!(json["degraded"], false);
        assert!(json["lastSuccess"].is_null());
    }
}
