// =============================================================================
// Alert Policy: overbought / oversold thresholds
// =============================================================================
//
//   RSI > overbought  => SELL
//   RSI < oversold    => BUY
//   otherwise         => NONE   (the thresholds themselves are NONE)
//
// The decision depends on the latest value alone: no hysteresis, no memory.
// =============================================================================

use crate::config::AppConfig;
use crate::types::{Alert, Direction};

#[derive(Debug, Clone)]
pub struct AlertPolicy {
    symbol: String,
    overbought: f64,
    oversold: f64,
}

impl AlertPolicy {
    pub fn new(symbol: impl Into<String>, overbought: f64, oversold: f64) -> Self {
        Self {
            symbol: symbol.into(),
            overbought,
            oversold,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.symbol.clone(),
            config.rsi.overbought,
            config.rsi.oversold,
        )
    }

    /// Classify `rsi` against the thresholds. Non-finite input is NONE.
    pub fn direction(&self, rsi: f64) -> Direction {
        if rsi > self.overbought {
            Direction::Sell
        } else if rsi < self.oversold {
            Direction::Buy
        } else {
            Direction::None
        }
    }

    pub fn decide(&self, rsi: f64) -> Alert {
        Alert::new(self.symbol.clone(), self.direction(rsi), rsi)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}
