use async_trait::async_trait;

use crate::error::BusError;

/// A delivered message, handed to the dispatcher over the channel returned by
/// `connect`. Payloads are opaque byte strings (§4.1) — JSON in this system, decoded
/// by `mecctl-handlers`, never by the bus itself.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// What to publish, and where, if this client disconnects uncleanly.
#[derive(Debug, Clone)]
pub struct LastWill {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// The core's view of the message bus (§4.1). The core is always a *client*; it never
/// hosts the broker. QoS is always at-least-once (`qos=1` on the wire); `retain` is
/// `false` unless stated otherwise, matching §4.1's documented default.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish `payload` on `topic` with at-least-once delivery.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribe to `pattern` (may contain `+`/`#` wildcards) with at-least-once
    /// delivery. Idempotent: subscribing twice to the same pattern is a no-op.
    async fn subscribe(&self, pattern: &str) -> Result<(), BusError>;
}

/// Convenience for publishing a `serde::Serialize` payload as JSON.
pub async fn publish_json<T: serde::Serialize + Sync>(
    bus: &dyn MessageBus,
    topic: &str,
    value: &T,
) -> Result<(), BusError> {
    let payload =
        serde_json::to_vec(value).map_err(|e| BusError::Publish(format!("encode: {e}")))?;
    bus.publish(topic, payload).await
}
