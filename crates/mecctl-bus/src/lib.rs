//! Message Bus Adapter (C1): topic-routed publish/subscribe, at-least-once delivery,
//! a last-will per client. The core is always a client; it never hosts the broker.

pub mod bus;
pub mod error;
pub mod local;
pub mod mqtt;
pub mod topic;

pub use bus::{publish_json, InboundMessage, LastWill, MessageBus};
pub use error::BusError;
pub use local::LocalBus;
pub use mqtt::MqttBus;
pub use topic::longest_prefix_match;
