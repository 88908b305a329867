//! In-process bus used by orchestrator/handler tests (DESIGN.md "test tooling"):
//! records publishes instead of putting them on a wire, and never invokes a handler
//! directly — tests that need delivery feed `InboundMessage` to the dispatcher
//! themselves, as a real bus callback would.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::bus::MessageBus;
use crate::error::BusError;

#[derive(Debug, Clone)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// A `MessageBus` that records every publish for test assertions and tracks
/// subscriptions without a network round-trip.
#[derive(Default)]
pub struct LocalBus {
    published: Mutex<Vec<Published>>,
    subscriptions: Mutex<Vec<String>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains and returns everything published since the last call.
    pub async fn take_published(&self) -> Vec<Published> {
        std::mem::take(&mut *self.published.lock().await)
    }

    pub async fn published_topics(&self) -> Vec<String> {
        self.published
            .lock()
            .await
            .iter()
            .map(|p| p.topic.clone())
            .collect()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.published.lock().await.push(Published {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<(), BusError> {
        let mut subs = self.subscriptions.lock().await;
        if !subs.iter().any(|s| s == pattern) {
            subs.push(pattern.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_are_recorded_in_order() {
        let bus = LocalBus::new();
        bus.publish("deploy/edge01", b"a".to_vec()).await.unwrap();
        bus.publish("deploy/edge02", b"b".to_vec()).await.unwrap();
        let topics = bus.published_topics().await;
        assert_eq!(topics, vec!["deploy/edge01", "deploy/edge02"]);
    }

    #[tokio::test]
    async fn subscribe_is_idempotent() {
        let bus = LocalBus::new();
        bus.subscribe("monitor/#").await.unwrap();
        bus.subscribe("monitor/#").await.unwrap();
        assert_eq!(bus.subscriptions().await, vec!["monitor/#".to_string()]);
    }
}
