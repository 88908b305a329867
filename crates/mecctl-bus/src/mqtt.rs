//! Production `MessageBus` backed by `rumqttc`.
//!
//! The adapter hides reconnection from the rest of the system (§4.1): the event-loop
//! task re-subscribes every pattern this client has ever asked for, atomically (all
//! `subscribe` calls issued before the loop yields to the next network read), *before*
//! forwarding any further `InboundMessage` to the dispatcher. Broker-side QoS 1 gives
//! at-least-once delivery; handlers downstream are written to be idempotent (§4.6,
//! §7) rather than relying on this adapter to deduplicate.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, LastWill as RumqttcLastWill, MqttOptions, Packet, QoS};
use tokio::sync::{mpsc, Mutex};

use crate::bus::{InboundMessage, LastWill, MessageBus};
use crate::error::BusError;

/// Broker port named in spec §6 ("Constants").
pub const BROKER_PORT: u16 = 9999;

pub struct MqttBus {
    client: AsyncClient,
    subscribed: Mutex<Vec<String>>,
}

impl MqttBus {
    /// Connects to `host:port` with the given client id and last-will, and spawns the
    /// event-loop task. Returns the bus handle plus the channel the dispatcher reads
    /// `InboundMessage`s from.
    pub async fn connect(
        host: &str,
        port: u16,
        client_id: &str,
        last_will: LastWill,
    ) -> Result<(Arc<Self>, mpsc::Receiver<InboundMessage>), BusError> {
        let mut opts = MqttOptions::new(client_id, host, port);
        opts.set_keep_alive(Duration::from_secs(30));
        opts.set_last_will(RumqttcLastWill::new(
            last_will.topic,
            last_will.payload,
            QoS::AtLeastOnce,
            false,
        ));

        let (client, mut event_loop) = AsyncClient::new(opts, 256);
        let (tx, rx) = mpsc::channel(1024);

        let bus = Arc::new(Self {
            client,
            subscribed: Mutex::new(Vec::new()),
        });
        let resub = Arc::clone(&bus);

        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        if let Err(err) = resub.resubscribe_all().await {
                            tracing::error!(%err, "failed to re-establish subscriptions after connect");
                        }
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let msg = InboundMessage {
                            topic: publish.topic,
                            payload: publish.payload.to_vec(),
                        };
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(%err, "mqtt event loop error, retrying");
                    }
                }
            }
        });

        Ok((bus, rx))
    }

    async fn resubscribe_all(&self) -> Result<(), BusError> {
        let patterns = self.subscribed.lock().await.clone();
        for pattern in patterns {
            self.client
                .subscribe(&pattern, QoS::AtLeastOnce)
                .await
                .map_err(|e| BusError::Subscribe(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))
    }

    async fn subscribe(&self, pattern: &str) -> Result<(), BusError> {
        {
            let mut subs = self.subscribed.lock().await;
            if subs.iter().any(|s| s == pattern) {
                return Ok(());
            }
            subs.push(pattern.to_string());
        }
        self.client
            .subscribe(pattern, QoS::AtLeastOnce)
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))
    }
}
