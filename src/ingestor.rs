// =============================================================================
// Candle Ingestor: the single writer of window and RSI state
// =============================================================================
//
// Per inbound frame:
//   1. Parse. Malformed frames are logged once and dropped.
//   2. Unconfirmed candles (interval still open) are ignored.
//   3. A confirmed candle whose `start` is at or before the last applied one
//      (live or bootstrapped) is a replay and is ignored. Replays happen after
//      a reconnect, and when startup lands just after a candle boundary so
//      the feed confirms the newest historical candle.
//   4. Append the close to the window, step the RSI engine.
//   5. If a reading is available: decide, hand the alert to the dispatcher
//      (spawned, not awaited), publish a fresh snapshot.
//
// The ingestor is driven by exactly one task, so no locks guard its state.
// Readers (the command shell) only ever see the published snapshot.
// =============================================================================

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::alerts::{AlertDispatcher, AlertPolicy};
use crate::error::IngestError;
use crate::indicators::rsi::RsiEngine;
use crate::market_data::kline_stream::parse_feed_message;
use crate::market_data::{Candle, FeedFrame, PriceWindow};
use crate::types::Alert;

/// Read-only view of the indicator state, published after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub period: usize,
    /// Closes currently held in the window.
    pub closes: usize,
    pub last_close: Option<f64>,
    pub rsi: Option<f64>,
    /// Confirmed candles applied since startup (bootstrap excluded).
    pub candles_applied: u64,
}

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Control frame or unconfirmed candle; no state change.
    Ignored,
    /// Replay of an already applied confirmed candle.
    Duplicate,
    /// Malformed frame, already logged.
    Dropped,
    /// Close appended. `rsi` is `None` while the engine is warming up.
    Applied {
        rsi: Option<f64>,
        alert: Option<Alert>,
    },
}

pub struct CandleIngestor {
    window: PriceWindow,
    engine: RsiEngine,
    policy: AlertPolicy,
    dispatcher: AlertDispatcher,
    last_start: Option<i64>,
    candles_applied: u64,
    snapshot_tx: watch::Sender<IndicatorSnapshot>,
}

impl CandleIngestor {
    pub fn new(period: usize, policy: AlertPolicy, dispatcher: AlertDispatcher) -> Self {
        let (snapshot_tx, _) = watch::channel(IndicatorSnapshot {
            symbol: policy.symbol().to_string(),
            period,
            closes: 0,
            last_close: None,
            rsi: None,
            candles_applied: 0,
        });

        Self {
            window: PriceWindow::new(period),
            engine: RsiEngine::new(period),
            policy,
            dispatcher,
            last_start: None,
            candles_applied: 0,
            snapshot_tx,
        }
    }

    /// Handle for readers of the published state.
    pub fn subscribe(&self) -> watch::Receiver<IndicatorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Seed window and engine from historical closes (oldest first).
    /// `newest_start` is the interval start of the last close, when known;
    /// live candles at or before it are treated as replays.
    ///
    /// Must run before the first live frame. The window keeps the most recent
    /// `period` closes; the engine uses all of them, so `period + 1` closes
    /// make it ready immediately. No alert is raised for the bootstrap value.
    pub fn bootstrap(&mut self, closes: &[f64], newest_start: Option<i64>) {
        let period = self.engine.period();
        let tail = closes.len().saturating_sub(self.window.capacity());

        self.window.seed(&closes[tail..]);
        self.engine = RsiEngine::from_closes(period, closes);
        self.last_start = newest_start;

        info!(
            closes = closes.len(),
            newest_start = ?newest_start,
            window = self.window.len(),
            rsi = ?self.engine.latest(),
            "indicator state seeded from history"
        );
        self.publish();
    }

    /// Handle one raw frame. Never fails: malformed frames are logged and
    /// dropped so one bad message cannot stop the stream.
    pub fn handle_message(&mut self, text: &str) -> IngestOutcome {
        match self.try_handle_message(text) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "dropping feed message");
                IngestOutcome::Dropped
            }
        }
    }

    pub fn try_handle_message(&mut self, text: &str) -> Result<IngestOutcome, IngestError> {
        match parse_feed_message(text)? {
            FeedFrame::Control => Ok(IngestOutcome::Ignored),
            FeedFrame::Candle(candle) => Ok(self.apply_candle(candle)),
        }
    }

    pub fn apply_candle(&mut self, candle: Candle) -> IngestOutcome {
        if !candle.confirmed {
            return IngestOutcome::Ignored;
        }

        if let Some(start) = candle.start {
            if self.last_start.is_some_and(|last| start <= last) {
                debug!(start, close = candle.close, "duplicate confirmed candle ignored");
                return IngestOutcome::Duplicate;
            }
            self.last_start = Some(start);
        }

        self.window.append(candle.close);
        self.candles_applied += 1;

        let rsi = self.engine.update(candle.close);
        let alert = rsi.map(|value| {
            let alert = self.policy.decide(value);
            info!(
                close = candle.close,
                rsi = value,
                direction = %alert.direction,
                "candle confirmed"
            );
            self.dispatcher.dispatch(alert.clone());
            alert
        });

        if rsi.is_none() {
            debug!(
                close = candle.close,
                window = self.window.len(),
                "candle confirmed, RSI warming up"
            );
        }

        self.publish();
        IngestOutcome::Applied { rsi, alert }
    }

    #[cfg(test)]
    pub fn window(&self) -> &PriceWindow {
        &self.window
    }

    #[cfg(test)]
    pub fn latest_rsi(&self) -> Option<f64> {
        self.engine.latest()
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(IndicatorSnapshot {
            symbol: self.policy.symbol().to_string(),
            period: self.engine.period(),
            closes: self.window.len(),
            last_close: self.window.last(),
            rsi: self.engine.latest(),
            candles_applied: self.candles_applied,
        });
    }
}

/// Drain `rx` in arrival order until every sender is gone.
pub async fn run_ingestor(mut ingestor: CandleIngestor, mut rx: mpsc::Receiver<String>) {
    info!("ingestor running");
    while let Some(text) = rx.recv().await {
        ingestor.handle_message(&text);
    }
    info!("feed channel closed, ingestor stopped");
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tracing_test::traced_test;

    use crate::alerts::CapturingSink;
    use crate::indicators::rsi::calculate_rsi;
    use crate::types::Direction;

    const SEED: [f64; 14] = [
        131.52, 131.56, 131.57, 131.58, 131.56, 131.42, 131.31, 131.27, 131.28, 131.28, 131.28,
        131.17, 131.19, 131.45,
    ];

    fn ingestor(period: usize) -> (CandleIngestor, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::new());
        let ingestor = CandleIngestor::new(
            period,
            AlertPolicy::new("SOLUSDT", 70.0, 30.0),
            AlertDispatcher::new(sink.clone()),
        );
        (ingestor, sink)
    }

    fn kline(close: f64, confirm: bool) -> String {
        serde_json::json!({
            "topic": "kline.60.SOLUSDT",
            "data": [{ "close": close.to_string(), "confirm": confirm }]
        })
        .to_string()
    }

    fn kline_at(start: i64, close: f64) -> String {
        serde_json::json!({
            "topic": "kline.60.SOLUSDT",
            "data": [{ "start": start, "close": close.to_string(), "confirm": true }]
        })
        .to_string()
    }

    /// Let spawned dispatch tasks run to completion.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn unconfirmed_candles_have_no_effect() {
        let (mut ing, sink) = ingestor(14);
        ing.bootstrap(&SEED, None);
        let before = ing.window().snapshot();

        assert_eq!(ing.handle_message(&kline(1.0, false)), IngestOutcome::Ignored);

        assert_eq!(ing.window().snapshot(), before);
        assert_eq!(ing.latest_rsi(), None);
        settle().await;
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_drop_to_120() {
        let (mut ing, sink) = ingestor(14);
        ing.bootstrap(&SEED, None);
        assert_eq!(ing.window().len(), 14);
        assert_eq!(ing.latest_rsi(), None);

        let outcome = ing.handle_message(&kline(120.00, true));

        // Window evicted 131.52 and ends with the new close.
        let window = ing.window().snapshot();
        assert_eq!(window.len(), 14);
        assert_eq!(window[0], 131.56);
        assert_eq!(*window.last().unwrap(), 120.00);
        assert_eq!(&window[..13], &SEED[1..]);

        // Same value as a full recompute over the window extended with the
        // evicted history.
        let mut full = vec![SEED[0]];
        full.extend(&window);
        let expected = *calculate_rsi(&full, 14).last().unwrap();

        let (rsi, alert) = match outcome {
            IngestOutcome::Applied {
                rsi: Some(rsi),
                alert: Some(alert),
            } => (rsi, alert),
            other => panic!("expected an RSI reading, got {other:?}"),
        };
        assert!((rsi - expected).abs() < 1e-9);
        assert!(rsi < 30.0);
        assert_eq!(alert.direction, Direction::Buy);

        settle().await;
        let sent = sink.alerts();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].message().contains("BUY"));
        assert!(sent[0].message().contains(&format!("{rsi:.2}")));
    }

    #[tokio::test]
    #[traced_test]
    async fn malformed_message_is_isolated() {
        let (mut ing, _sink) = ingestor(14);

        let outcome = ing.handle_message(r#"{"data":[{"close":"131.52"}]}"#);
        assert_eq!(outcome, IngestOutcome::Dropped);
        assert!(ing.window().is_empty());

        ing.handle_message(&kline(131.56, true));
        assert_eq!(ing.window().snapshot(), vec![131.56]);

        logs_assert(|lines: &[&str]| {
            let errors = lines.iter().filter(|l| l.contains("ERROR")).count();
            if errors == 1 {
                Ok(())
            } else {
                Err(format!("expected exactly one error log, saw {errors}"))
            }
        });
        assert!(logs_contain("data[0].confirm"));
    }

    #[tokio::test]
    async fn streaming_matches_full_recompute() {
        let (mut ing, _sink) = ingestor(5);
        let closes = [10.0, 10.5, 10.2, 10.8, 11.0, 10.7, 10.9, 11.4, 11.1, 10.6, 10.9];

        let mut last = None;
        for &c in &closes {
            if let IngestOutcome::Applied { rsi, .. } = ing.handle_message(&kline(c, true)) {
                last = rsi;
            }
        }

        let expected = *calculate_rsi(&closes, 5).last().unwrap();
        assert!((last.unwrap() - expected).abs() < 1e-9);
        assert_eq!(ing.window().snapshot(), closes[closes.len() - 5..].to_vec());
    }

    #[tokio::test]
    async fn replayed_candle_is_ignored() {
        let (mut ing, _sink) = ingestor(14);
        let hour = 3_600_000;

        assert!(matches!(
            ing.handle_message(&kline_at(hour, 131.0)),
            IngestOutcome::Applied { .. }
        ));
        assert_eq!(ing.handle_message(&kline_at(hour, 131.0)), IngestOutcome::Duplicate);
        assert!(matches!(
            ing.handle_message(&kline_at(2 * hour, 131.2)),
            IngestOutcome::Applied { .. }
        ));

        // A late frame for an older interval is a replay too.
        assert_eq!(ing.handle_message(&kline_at(hour, 131.0)), IngestOutcome::Duplicate);

        assert_eq!(ing.window().snapshot(), vec![131.0, 131.2]);
    }

    #[tokio::test]
    async fn feed_confirming_newest_history_candle_is_a_replay() {
        let (mut ing, sink) = ingestor(14);
        let hour = 3_600_000;
        // 15 hourly closes 100..=114; the newest candle started at 14h.
        let history: Vec<f64> = (100..=114).map(f64::from).collect();
        ing.bootstrap(&history, Some(14 * hour));
        let window = ing.window().snapshot();
        let rsi = ing.latest_rsi();

        assert_eq!(ing.handle_message(&kline_at(14 * hour, 114.0)), IngestOutcome::Duplicate);
        assert_eq!(ing.handle_message(&kline_at(13 * hour, 113.0)), IngestOutcome::Duplicate);

        assert_eq!(ing.window().snapshot(), window);
        assert_eq!(ing.latest_rsi(), rsi);
        settle().await;
        assert!(sink.alerts().is_empty());

        // The next interval is live data.
        assert!(matches!(
            ing.handle_message(&kline_at(15 * hour, 113.5)),
            IngestOutcome::Applied { rsi: Some(_), .. }
        ));
        assert_eq!(ing.window().last(), Some(113.5));
        assert_eq!(ing.window().len(), 14);
    }

    #[tokio::test]
    async fn neutral_reading_sends_nothing() {
        let (mut ing, sink) = ingestor(4);
        for c in [10.0, 11.0, 10.0, 11.0, 10.0, 10.5] {
            ing.handle_message(&kline(c, true));
        }
        let rsi = ing.latest_rsi().unwrap();
        assert!((30.0..=70.0).contains(&rsi), "rsi {rsi}");
        settle().await;
        assert!(sink.alerts().is_empty());
    }

    #[tokio::test]
    async fn control_frames_are_ignored() {
        let (mut ing, _sink) = ingestor(14);
        let ack = r#"{"success":true,"ret_msg":"subscribe","op":"subscribe"}"#;
        assert_eq!(ing.handle_message(ack), IngestOutcome::Ignored);
        assert!(ing.window().is_empty());
    }

    #[tokio::test]
    async fn full_bootstrap_is_ready_immediately() {
        let (mut ing, _sink) = ingestor(14);
        let mut history = SEED.to_vec();
        history.push(131.60);
        ing.bootstrap(&history, None);

        assert_eq!(ing.window().len(), 14);
        assert_eq!(ing.window().snapshot()[0], 131.56);
        assert_eq!(ing.latest_rsi(), calculate_rsi(&history, 14).last().copied());
    }

    #[tokio::test]
    async fn snapshot_tracks_state() {
        let (mut ing, _sink) = ingestor(14);
        let rx = ing.subscribe();
        assert_eq!(rx.borrow().closes, 0);

        ing.bootstrap(&SEED, None);
        ing.handle_message(&kline(120.0, true));

        let snap = rx.borrow().clone();
        assert_eq!(snap.symbol, "SOLUSDT");
        assert_eq!(snap.period, 14);
        assert_eq!(snap.closes, 14);
        assert_eq!(snap.last_close, Some(120.0));
        assert_eq!(snap.rsi, ing.latest_rsi());
        assert_eq!(snap.candles_applied, 1);
    }

    #[tokio::test]
    async fn run_ingestor_processes_in_order() {
        let (ing, sink) = ingestor(14);
        let (tx, rx) = mpsc::channel(32);
        let snapshots = ing.subscribe();

        let task = tokio::spawn(run_ingestor(ing, rx));
        for &c in &SEED {
            tx.send(kline(c, true)).await.unwrap();
        }
        tx.send("garbage".to_string()).await.unwrap();
        tx.send(kline(120.0, true)).await.unwrap();
        drop(tx);
        task.await.unwrap();

        let snap = snapshots.borrow().clone();
        assert_eq!(snap.candles_applied, 15);
        assert_eq!(snap.last_close, Some(120.0));
        assert!(snap.rsi.unwrap() < 30.0);

        settle().await;
        assert_eq!(sink.alerts().len(), 1);
    }
}
