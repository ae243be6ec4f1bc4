pub mod history;
pub mod kline_stream;
pub mod price_window;

// Re-export for convenient access (e.g. `use crate::market_data::PriceWindow`).
pub use kline_stream::{Candle, FeedFrame};
pub use price_window::PriceWindow;
