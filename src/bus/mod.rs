//! The `bus` module owns the session to the message broker.
//!
//! It defines the two seams the kitchen depends on:
//!
//! - [`Connection`]: the exclusively owned session. Subscribes, yields inbound
//!   messages, hands out publishers and is closed exactly once.
//! - [`Publisher`]: a cheap, cloneable handle that cooking tasks use to
//!   publish concurrently without any locking of their own.
//!
//! Two implementations are provided: [`mqtt`] talks to a real broker through
//! `rumqttc`, and [`memory`] is an in-process bus with the same topic
//! semantics, used to drive the kitchen without a broker.

pub mod memory;
pub mod message;
pub mod mqtt;
pub mod topic;

use async_trait::async_trait;

use crate::utils::error::{ConnectionError, PublishError};

pub use memory::{MemoryBus, MemoryConnection, MemoryPublisher};
pub use message::{InboundMessage, PublishedMessage, QoS};
pub use mqtt::{MqttConnection, MqttPublisher};

/// Sends messages onto the bus. Implementations never retry.
#[async_trait]
pub trait Publisher: Clone + Send + Sync + 'static {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), PublishError>;
}

/// A live broker session.
#[async_trait]
pub trait Connection: Send + Sized {
    type Publisher: Publisher;

    /// Registers interest in `topic` at `qos`; returns once the broker
    /// acknowledged the subscription.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ConnectionError>;

    /// A publisher sharing this session.
    fn publisher(&self) -> Self::Publisher;

    /// Waits for the next inbound message. An error means the session is
    /// gone and will not come back.
    async fn recv(&mut self) -> Result<InboundMessage, ConnectionError>;

    /// Releases the session.
    async fn close(self);
}
