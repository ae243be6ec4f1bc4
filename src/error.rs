// =============================================================================
// Ingestion errors
// =============================================================================

use thiserror::Error;

/// Failures raised while turning a raw feed frame into a candle.
///
/// None of these abort the stream: the ingestor logs the error and moves on
/// to the next message.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IngestError {
    #[error("malformed feed message: {reason}")]
    MalformedMessage { reason: String },
}

impl IngestError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }
}
