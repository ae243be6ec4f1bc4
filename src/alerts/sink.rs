// =============================================================================
// Alert Sinks: where BUY / SELL alerts end up
// =============================================================================
//
// * WebhookSink  : chat webhook (Discord-compatible `{"content": ...}` body).
// * LogSink      : structured log line only; used when no webhook is set.
// * CapturingSink: in-memory list, test builds only.
//
// Sinks are always driven from a spawned task (see `dispatcher.rs`), never
// from the ingestion path itself.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::types::Alert;

/// HTTP timeout for a single webhook delivery.
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    async fn emit(&self, alert: &Alert) -> Result<()>;
}

// -----------------------------------------------------------------------------
// WebhookSink
// -----------------------------------------------------------------------------

pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .context("failed to build webhook HTTP client")?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    #[instrument(skip(self, alert), name = "webhook::emit", fields(direction = %alert.direction))]
    async fn emit(&self, alert: &Alert) -> Result<()> {
        let content = format!(
            "{} ({} UTC)",
            alert.message(),
            alert.at.format("%Y-%m-%d %H:%M")
        );
        let body = serde_json::json!({ "content": content });

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("webhook request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("webhook returned {status}: {text}");
        }

        debug!(status = %status, "webhook accepted alert");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// LogSink
// -----------------------------------------------------------------------------

pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn emit(&self, alert: &Alert) -> Result<()> {
        info!(
            symbol = %alert.symbol,
            direction = %alert.direction,
            rsi = alert.rsi,
            "{}",
            alert.message()
        );
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// CapturingSink
// -----------------------------------------------------------------------------

#[cfg(test)]
#[derive(Default)]
pub struct CapturingSink {
    alerts: Mutex<Vec<Alert>>,
}

#[cfg(test)]
impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far, in completion order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl AlertSink for CapturingSink {
    fn name(&self) -> &'static str {
        "capture"
    }

    async fn emit(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().push(alert.clone());
        Ok(())
    }
}
