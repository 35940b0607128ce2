// =============================================================================
// Alerts Module
// =============================================================================
//
// Anti-spam alerting for evaluated decisions:
// - Outbound message envelope (XML / JSON rendering)
// - Router: cooldown-gated panic alerts and hourly digests
// - Sinks: outbox directory, signed webhook, fan-out

pub mod message;
pub mod router;
pub mod sink;

pub use message::OutboundMessage;
pub use router::AlertRouter;
pub use sink::{dispatch, AlertSink, FanoutSink, OutboxSink, WebhookSink};
