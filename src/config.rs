// =============================================================================
// Configuration: JSON file with environment overrides
// =============================================================================
//
// Every field carries `#[serde(default)]` so that a partial (or empty) config
// file still loads. Environment variables (optionally from `.env`) win over
// the file, matching how the bot is usually deployed.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::rsi::DEFAULT_RSI_PERIOD;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_symbol() -> String {
    "SOLUSDT".to_string()
}

fn default_interval_minutes() -> u32 {
    60
}

fn default_category() -> String {
    "inverse".to_string()
}

fn default_period() -> usize {
    DEFAULT_RSI_PERIOD
}

fn default_overbought() -> f64 {
    70.0
}

fn default_oversold() -> f64 {
    30.0
}

fn default_bind_addr() -> String {
    "127.0.0.1:3001".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

// =============================================================================
// RsiSettings
// =============================================================================

/// Oscillator period and alert thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RsiSettings {
    /// Look-back period; also the capacity of the price window.
    #[serde(default = "default_period")]
    pub period: usize,

    /// RSI strictly above this emits SELL.
    #[serde(default = "default_overbought")]
    pub overbought: f64,

    /// RSI strictly below this emits BUY.
    #[serde(default = "default_oversold")]
    pub oversold: f64,
}

impl Default for RsiSettings {
    fn default() -> Self {
        Self {
            period: default_period(),
            overbought: default_overbought(),
            oversold: default_oversold(),
        }
    }
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Instrument watched by the sentinel, e.g. "SOLUSDT".
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Candle interval in minutes.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// Bybit product category ("spot", "linear", "inverse").
    #[serde(default = "default_category")]
    pub category: String,

    /// Use the Bybit testnet hosts for both REST and WebSocket.
    #[serde(default = "default_true")]
    pub testnet: bool,

    #[serde(default)]
    pub rsi: RsiSettings,

    /// Chat webhook receiving BUY/SELL alerts. Alerts are only logged when
    /// unset.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Listen address of the command shell.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Pause between feed reconnect attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval_minutes: default_interval_minutes(),
            category: default_category(),
            testnet: true,
            rsi: RsiSettings::default(),
            webhook_url: None,
            bind_addr: default_bind_addr(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            period = config.rsi.period,
            "config loaded"
        );

        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(symbol) = get("SYMBOL") {
            self.symbol = symbol.to_uppercase();
        }
        if let Some(v) = get("INTERVAL") {
            self.interval_minutes = v
                .parse()
                .with_context(|| format!("INTERVAL must be a whole number of minutes, got {v}"))?;
        }
        if let Some(category) = get("BYBIT_CATEGORY") {
            self.category = category.to_lowercase();
        }
        if let Some(v) = get("BYBIT_TESTNET") {
            self.testnet = v
                .parse()
                .with_context(|| format!("BYBIT_TESTNET must be true or false, got {v}"))?;
        }
        if let Some(v) = get("RSI_PERIOD") {
            self.rsi.period = v
                .parse()
                .with_context(|| format!("RSI_PERIOD must be a positive integer, got {v}"))?;
        }
        if let Some(v) = get("RSI_OVERBOUGHT") {
            self.rsi.overbought = v
                .parse()
                .with_context(|| format!("RSI_OVERBOUGHT must be a number, got {v}"))?;
        }
        if let Some(v) = get("RSI_OVERSOLD") {
            self.rsi.oversold = v
                .parse()
                .with_context(|| format!("RSI_OVERSOLD must be a number, got {v}"))?;
        }
        if let Some(url) = get("ALERT_WEBHOOK_URL") {
            self.webhook_url = Some(url);
        }
        if let Some(addr) = get("SENTINEL_BIND_ADDR") {
            self.bind_addr = addr;
        }

        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.symbol.is_empty() {
            bail!("symbol must not be empty");
        }
        if self.interval_minutes == 0 {
            bail!("interval_minutes must be positive");
        }
        if self.rsi.period == 0 {
            bail!("rsi.period must be positive");
        }
        let (overbought, oversold) = (self.rsi.overbought, self.rsi.oversold);
        if !overbought.is_finite() || !oversold.is_finite() {
            bail!("rsi thresholds must be finite numbers");
        }
        if oversold >= overbought {
            bail!("rsi.oversold ({oversold}) must be below rsi.overbought ({overbought})");
        }
        Ok(())
    }

    /// Candle interval in milliseconds.
    pub fn interval_ms(&self) -> i64 {
        i64::from(self.interval_minutes) * 60_000
    }
}
