// =============================================================================
// Alert Dispatcher: fire-and-forget delivery
// =============================================================================
//
// `dispatch` returns as soon as the delivery task is spawned. The ingestion
// path never awaits a sink, so a slow or failing webhook cannot delay the
// next candle. Two alerts from different candles may complete out of order.
//
// =============================================================================

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::alerts::sink::AlertSink;
use crate::types::Alert;

#[derive(Clone)]
pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>) -> Self {
        Self { sink }
    }

    /// Spawn delivery of `alert`. NONE alerts are dropped and yield `None`.
    ///
    /// The returned handle is only for callers that want to observe
    /// completion (tests); the ingestor discards it. Must be called from
    /// within a Tokio runtime.
    pub fn dispatch(&self, alert: Alert) -> Option<JoinHandle<()>> {
        if !alert.is_actionable() {
            return None;
        }

        let sink = Arc::clone(&self.sink);

        Some(tokio::spawn(async move {
            match sink.emit(&alert).await {
                Ok(()) => info!(
                    alert_id = %alert.id,
                    sink = sink.name(),
                    direction = %alert.direction,
                    rsi = alert.rsi,
                    "alert delivered"
                ),
                Err(e) => error!(
                    alert_id = %alert.id,
                    sink = sink.name(),
                    direction = %alert.direction,
                    error = %e,
                    "alert delivery failed"
                ),
            }
        }))
    }

    pub fn sink_name(&self) -> &'static str {
        self.sink.name()
    }
}
