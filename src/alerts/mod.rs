// =============================================================================
// Alerts Module
// =============================================================================
//
// Threshold policy, delivery sinks, and the fire-and-forget dispatcher that
// keeps slow sinks off the ingestion path.

pub mod dispatcher;
pub mod policy;
pub mod sink;

pub use dispatcher::AlertDispatcher;
pub use policy::AlertPolicy;
pub use sink::{AlertSink, LogSink, WebhookSink};

#[cfg(test)]
pub use sink::CapturingSink;
