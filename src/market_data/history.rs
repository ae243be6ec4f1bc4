// =============================================================================
// Bybit REST: historical closes for the startup bootstrap
// =============================================================================
//
// GET /v5/market/kline is public, so no request signing is needed. Bybit
// lists candles newest first and includes the still-open interval; the
// bootstrap wants confirmed closes only, oldest first.
// =============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::config::AppConfig;

/// Bybit caps `limit` at 1000 per request.
const MAX_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct BybitClient {
    base_url: String,
    client: reqwest::Client,
}

impl BybitClient {
    pub fn new(testnet: bool) -> Result<Self> {
        let base_url = if testnet {
            "https://api-testnet.bybit.com"
        } else {
            "https://api.bybit.com"
        };
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into();
        debug!(base_url = %base_url, "BybitClient initialised");

        Ok(Self { base_url, client })
    }

    /// Fetch up to `period + 1` confirmed candles as `(start_ms, close)`,
    /// oldest first: enough for the RSI engine to produce a reading on startup.
    /// The start times let the ingestor recognise the live feed replaying the
    /// newest of them.
    #[instrument(skip(self, config), name = "bybit::fetch_history", fields(symbol = %config.symbol))]
    pub async fn fetch_history(&self, config: &AppConfig) -> Result<Vec<(i64, f64)>> {
        let wanted = config.rsi.period + 1;
        // One extra candle for the interval that is still open.
        let limit = (wanted + 1).min(MAX_LIMIT);
        let interval_ms = config.interval_ms();
        let end = Utc::now().timestamp_millis();
        let start = end - interval_ms * limit as i64;

        let url = format!("{}/v5/market/kline", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("category", config.category.clone()),
                ("symbol", config.symbol.clone()),
                ("interval", config.interval_minutes.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .await
            .context("GET /v5/market/kline request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse kline history response")?;

        if !status.is_success() {
            anyhow::bail!("Bybit GET /v5/market/kline returned {}: {}", status, body);
        }

        let entries = parse_kline_list(&body)?;
        let candles = confirmed_candles(&entries, end, interval_ms, wanted);
        info!(fetched = entries.len(), kept = candles.len(), "historical closes fetched");
        Ok(candles)
    }
}

/// Extract `(start_ms, close)` pairs from a kline list response, in the order
/// Bybit returns them (newest first).
pub fn parse_kline_list(body: &serde_json::Value) -> Result<Vec<(i64, f64)>> {
    let ret_code = body["retCode"]
        .as_i64()
        .context("kline response missing retCode")?;
    if ret_code != 0 {
        let msg = body["retMsg"].as_str().unwrap_or("unknown error");
        anyhow::bail!("error fetching historical data: {msg} (retCode {ret_code})");
    }

    let list = body["result"]["list"]
        .as_array()
        .context("kline response missing result.list")?;

    list.iter()
        .enumerate()
        .map(|(i, entry)| {
            let start = entry[0]
                .as_str()
                .and_then(|s| s.parse::<i64>().ok())
                .with_context(|| format!("kline entry {i} has no valid start time"))?;
            let close = entry[4]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|c| c.is_finite())
                .with_context(|| format!("kline entry {i} has no valid close"))?;
            Ok((start, close))
        })
        .collect()
}

/// Drop candles whose interval has not ended by `now_ms`, order the rest
/// oldest first and keep the most recent `keep`.
pub fn confirmed_candles(
    entries: &[(i64, f64)],
    now_ms: i64,
    interval_ms: i64,
    keep: usize,
) -> Vec<(i64, f64)> {
    let mut closed: Vec<(i64, f64)> = entries
        .iter()
        .copied()
        .filter(|(start, _)| start + interval_ms <= now_ms)
        .collect();
    closed.sort_by_key(|(start, _)| *start);

    let skip = closed.len().saturating_sub(keep);
    closed.split_off(skip)
}
