use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::error::IngestError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// The slice of a kline update the sentinel cares about.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Interval start (ms since epoch), when the feed supplies it.
    pub start: Option<i64>,
    pub close: f64,
    /// `true` once the interval has closed and the candle is final.
    pub confirmed: bool,
}

/// A decoded feed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    Candle(Candle),
    /// Subscription acks, pongs and other frames without candle data.
    Control,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse one text frame from the kline topic.
///
/// Expected shape:
/// ```json
/// { "topic": "kline.60.SOLUSDT",
///   "data": [ { "start": 1700000000000, "close": "131.45", "confirm": true } ] }
/// ```
/// Only `data[0].close` and `data[0].confirm` are required.
pub fn parse_feed_message(text: &str) -> Result<FeedFrame, IngestError> {
    let root: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| IngestError::malformed(format!("invalid JSON: {e}")))?;

    let Some(data) = root.get("data") else {
        if root.get("op").is_some() || root.get("success").is_some() {
            return Ok(FeedFrame::Control);
        }
        return Err(IngestError::malformed("missing field data"));
    };

    let first = data
        .as_array()
        .and_then(|items| items.first())
        .ok_or_else(|| IngestError::malformed("data must be a non-empty array"))?;

    let close = parse_number_f64(first.get("close"), "data[0].close")?;
    let confirmed = first
        .get("confirm")
        .and_then(serde_json::Value::as_bool)
        .ok_or_else(|| IngestError::malformed("missing field data[0].confirm"))?;
    let start = first.get("start").and_then(serde_json::Value::as_i64);

    Ok(FeedFrame::Candle(Candle {
        start,
        close,
        confirmed,
    }))
}

/// Exchanges send prices either as JSON strings or as numbers.
fn parse_number_f64(val: Option<&serde_json::Value>, name: &str) -> Result<f64, IngestError> {
    let parsed = match val {
        Some(serde_json::Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| IngestError::malformed(format!("field {name} is not a number: {s}")))?,
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| IngestError::malformed(format!("field {name} is not a valid f64")))?,
        Some(_) => {
            return Err(IngestError::malformed(format!(
                "field {name} has unexpected JSON type"
            )))
        }
        None => return Err(IngestError::malformed(format!("missing field {name}"))),
    };

    if !parsed.is_finite() {
        return Err(IngestError::malformed(format!("field {name} is not finite")));
    }
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// Kline WebSocket stream
// ---------------------------------------------------------------------------

/// Bybit drops idle public connections after ~30 s without a ping.
const HEARTBEAT_SECS: u64 = 20;

const PING_FRAME: &str = r#"{"op":"ping"}"#;

/// Public v5 WebSocket endpoint for a product category.
pub fn stream_url(category: &str, testnet: bool) -> String {
    let host = if testnet {
        "stream-testnet.bybit.com"
    } else {
        "stream.bybit.com"
    };
    format!("wss://{host}/v5/public/{category}")
}

/// Subscription topic, e.g. `kline.60.SOLUSDT`.
pub fn kline_topic(interval_minutes: u32, symbol: &str) -> String {
    format!("kline.{interval_minutes}.{}", symbol.to_uppercase())
}

fn subscribe_frame(topic: &str) -> String {
    serde_json::json!({ "op": "subscribe", "args": [topic] }).to_string()
}

/// Connect, subscribe to the kline topic and forward every text frame to `tx`
/// in arrival order.
///
/// Runs until the stream disconnects or an error occurs, then returns so that
/// the caller (main.rs) can reconnect. Returns `Ok` early when the receiving
/// side of `tx` is gone.
pub async fn run_kline_stream(config: &AppConfig, tx: &mpsc::Sender<String>) -> Result<()> {
    let url = stream_url(&config.category, config.testnet);
    let topic = kline_topic(config.interval_minutes, &config.symbol);
    info!(url = %url, topic = %topic, "connecting to kline WebSocket");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to kline WebSocket")?;

    let (mut write, mut read) = ws_stream.split();
    write
        .send(Message::Text(subscribe_frame(&topic)))
        .await
        .context("failed to send kline subscription")?;
    info!(topic = %topic, "kline WebSocket connected");

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_SECS));
    // The first tick completes immediately.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                write
                    .send(Message::Text(PING_FRAME.to_string()))
                    .await
                    .context("failed to send heartbeat")?;
                debug!("heartbeat sent");
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    if tx.send(text).await.is_err() {
                        warn!("ingestor channel closed, leaving kline stream");
                        return Ok(());
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    warn!(frame = ?frame, "kline WebSocket closed by server");
                    return Ok(());
                }
                // Ping / Pong / Binary frames: tungstenite answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "kline WebSocket read error");
                    return Err(e.into());
                }
                None => {
                    warn!(topic = %topic, "kline WebSocket stream ended");
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed_reason(text: &str) -> String {
        match parse_feed_message(text) {
            Err(IngestError::MalformedMessage { reason }) => reason,
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn parse_confirmed_kline() {
        let json = r#"{
            "topic": "kline.60.SOLUSDT",
            "type": "snapshot",
            "ts": 1700003599999,
            "data": [{
                "start": 1700000000000,
                "end": 1700003599999,
                "interval": "60",
                "open": "131.20",
                "close": "131.45",
                "high": "131.60",
                "low": "131.10",
                "volume": "1234.5",
                "turnover": "162000.1",
                "confirm": true,
                "timestamp": 1700003599999
            }]
        }"#;
        let frame = parse_feed_message(json).unwrap();
        assert_eq!(
            frame,
            FeedFrame::Candle(Candle {
                start: Some(1_700_000_000_000),
                close: 131.45,
                confirmed: true,
            })
        );
    }

    #[test]
    fn numeric_close_and_missing_start() {
        let frame = parse_feed_message(r#"{"data":[{"close":120,"confirm":false}]}"#).unwrap();
        assert_eq!(
            frame,
            FeedFrame::Candle(Candle {
                start: None,
                close: 120.0,
                confirmed: false,
            })
        );
    }

    #[test]
    fn control_frames_are_not_errors() {
        let ack = r#"{"success":true,"ret_msg":"subscribe","conn_id":"abc","op":"subscribe"}"#;
        assert_eq!(parse_feed_message(ack).unwrap(), FeedFrame::Control);
        let pong = r#"{"success":true,"ret_msg":"pong","op":"ping"}"#;
        assert_eq!(parse_feed_message(pong).unwrap(), FeedFrame::Control);
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert!(malformed_reason(r#"{"data":[{"close":"1.0"}]}"#).contains("confirm"));
        assert!(malformed_reason(r#"{"data":[{"confirm":true}]}"#).contains("close"));
        assert!(malformed_reason(r#"{"data":[]}"#).contains("non-empty"));
        assert!(malformed_reason(r#"{"topic":"kline.60.SOLUSDT"}"#).contains("data"));
        assert!(malformed_reason("not json").contains("invalid JSON"));
    }

    #[test]
    fn bad_close_values_are_malformed() {
        assert!(malformed_reason(r#"{"data":[{"close":"abc","confirm":true}]}"#).contains("not a number"));
        assert!(malformed_reason(r#"{"data":[{"close":"NaN","confirm":true}]}"#).contains("finite"));
        assert!(malformed_reason(r#"{"data":[{"close":true,"confirm":true}]}"#).contains("type"));
    }

    #[test]
    fn confirm_must_be_boolean() {
        assert!(malformed_reason(r#"{"data":[{"close":"1","confirm":"true"}]}"#).contains("confirm"));
    }

    #[test]
    fn urls_and_topics() {
        assert_eq!(
            stream_url("inverse", true),
            "wss://stream-testnet.bybit.com/v5/public/inverse"
        );
        assert_eq!(
            stream_url("linear", false),
            "wss://stream.bybit.com/v5/public/linear"
        );
        assert_eq!(kline_topic(60, "solusdt"), "kline.60.SOLUSDT");
        let frame: serde_json::Value = serde_json::from_str(&subscribe_frame("kline.5.BTCUSD")).unwrap();
        assert_eq!(frame["op"], "subscribe");
        assert_eq!(frame["args"][0], "kline.5.BTCUSD");
    }
}
