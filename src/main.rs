// =============================================================================
// RSI Sentinel: Main Entry Point
// =============================================================================
//
// Startup order matters: history is fetched and the window seeded before the
// ingestor task starts, so the first live candle always lands on a
// deterministic window.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod alerts;
mod api;
mod app_state;
mod config;
mod error;
mod indicators;
mod ingestor;
mod market_data;
mod types;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::alerts::{AlertDispatcher, AlertPolicy, AlertSink, LogSink, WebhookSink};
use crate::app_state::ShellState;
use crate::config::AppConfig;
use crate::ingestor::CandleIngestor;
use crate::market_data::history::BybitClient;

/// Config file read from the working directory when present.
const CONFIG_PATH: &str = "sentinel.json";

/// Frames buffered between the socket reader and the ingestor.
const FEED_CHANNEL_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = AppConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    config.apply_env()?;
    config.validate()?;

    info!(
        symbol = %config.symbol,
        interval_minutes = config.interval_minutes,
        period = config.rsi.period,
        overbought = config.rsi.overbought,
        oversold = config.rsi.oversold,
        testnet = config.testnet,
        "RSI sentinel starting"
    );

    // ── 2. Alert path ────────────────────────────────────────────────────
    let sink: Arc<dyn AlertSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone())?),
        None => {
            warn!("ALERT_WEBHOOK_URL not set, alerts will only be logged");
            Arc::new(LogSink)
        }
    };
    let dispatcher = AlertDispatcher::new(sink);
    let policy = AlertPolicy::from_config(&config);
    info!(sink = dispatcher.sink_name(), "alert sink ready");

    // ── 3. Ingestor + history bootstrap ──────────────────────────────────
    let mut ingestor = CandleIngestor::new(config.rsi.period, policy.clone(), dispatcher.clone());

    let client = BybitClient::new(config.testnet)?;
    match client.fetch_history(&config).await {
        Ok(history) => {
            let closes: Vec<f64> = history.iter().map(|(_, close)| *close).collect();
            ingestor.bootstrap(&closes, history.last().map(|(start, _)| *start));
        }
        Err(e) => error!(error = %e, "History bootstrap failed, starting with an empty window"),
    }

    let shell_state = Arc::new(ShellState::new(ingestor.subscribe(), policy, dispatcher));

    // ── 4. Command shell ─────────────────────────────────────────────────
    let bind_addr = config.bind_addr.clone();
    tokio::spawn(async move {
        let app = api::rest::router(shell_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind command shell");
                return;
            }
        };
        info!(addr = %bind_addr, "command shell listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "command shell stopped");
        }
    });

    // ── 5. Ingestion (single writer) ─────────────────────────────────────
    let (feed_tx, feed_rx) = mpsc::channel::<String>(FEED_CHANNEL_CAPACITY);
    tokio::spawn(ingestor::run_ingestor(ingestor, feed_rx));

    // ── 6. Kline stream with reconnect ───────────────────────────────────
    let stream_config = config.clone();
    tokio::spawn(async move {
        let delay = tokio::time::Duration::from_secs(stream_config.reconnect_delay_secs);
        while !feed_tx.is_closed() {
            if let Err(e) =
                market_data::kline_stream::run_kline_stream(&stream_config, &feed_tx).await
            {
                error!(
                    symbol = %stream_config.symbol,
                    error = %e,
                    "Kline stream error, reconnecting in {}s",
                    stream_config.reconnect_delay_secs
                );
            }
            tokio::time::sleep(delay).await;
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Shutdown ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received");
    info!("RSI sentinel shut down complete.");
    Ok(())
}
