// =============================================================================
// Shared types used across the RSI sentinel
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trading direction suggested by the latest RSI reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Sell,
    Buy,
    None,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sell => write!(f, "SELL"),
            Self::Buy => write!(f, "BUY"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Decision produced for one RSI reading.
///
/// `id` and `at` are fixed when the decision is made, so the alert text, the
/// delivery logs and the command shell response all refer to the same alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier (UUID v4).
    pub id: String,
    pub at: DateTime<Utc>,
    pub symbol: String,
    pub direction: Direction,
    pub rsi: f64,
}

impl Alert {
    pub fn new(symbol: impl Into<String>, direction: Direction, rsi: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            at: Utc::now(),
            symbol: symbol.into(),
            direction,
            rsi,
        }
    }

    /// Only BUY and SELL alerts are delivered to a sink.
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::None
    }

    /// Human-readable alert text with the RSI rounded to 2 decimals.
    pub fn message(&self) -> String {
        match self.direction {
            Direction::Sell => format!(
                "{} RSI is {:.2}, overbought. SELL signal.",
                self.symbol, self.rsi
            ),
            Direction::Buy => format!(
                "{} RSI is {:.2}, oversold. BUY signal.",
                self.symbol, self.rsi
            ),
            Direction::None => format!("{} RSI is {:.2}, neutral.", self.symbol, self.rsi),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(direction: Direction, rsi: f64) -> Alert {
        Alert::new("SOLUSDT", direction, rsi)
    }

    #[test]
    fn sell_message_has_phrase_and_two_decimals() {
        let msg = alert(Direction::Sell, 75.23456).message();
        assert!(msg.contains("SELL"));
        assert!(msg.contains("75.23"));
        assert!(!msg.contains("75.234"));
    }

    #[test]
    fn buy_message_has_phrase_and_two_decimals() {
        let msg = alert(Direction::Buy, 2.861).message();
        assert!(msg.contains("BUY"));
        assert!(msg.contains("2.86"));
    }

    #[test]
    fn none_is_not_actionable() {
        assert!(!alert(Direction::None, 50.0).is_actionable());
        assert!(alert(Direction::Buy, 10.0).is_actionable());
    }

    #[test]
    fn each_alert_gets_its_own_id() {
        let a = alert(Direction::Sell, 80.0);
        let b = alert(Direction::Sell, 80.0);
        assert_ne!(a.id, b.id);
        assert!(b.at >= a.at);
        assert_eq!(a.clone(), a);
    }

    #[test]
    fn direction_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::Sell).unwrap(), "\"SELL\"");
        assert_eq!(Direction::None.to_string(), "NONE");
    }
}
