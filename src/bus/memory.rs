//! In-process bus
//!
//! `MemoryBus` keeps subscriptions and connections behind one lock and
//! routes every publish to the connections whose filters match, using the
//! same filter rules as an MQTT broker. Each connection receives a message
//! at most once even when several of its filters match.
//!
//! Publishes made through a [`MemoryPublisher`] are also recorded so callers
//! can inspect what left the kitchen. Messages pushed with
//! [`MemoryBus::inject`] play the part of other clients and are routed but
//! not recorded.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::message::{InboundMessage, PublishedMessage, QoS};
use super::topic;
use super::{Connection, Publisher};
use crate::utils::error::{ConnectionError, PublishError};

pub type ConnectionId = String;

#[derive(Debug, Default)]
struct BusState {
    /// filter -> subscribed connections and their granted QoS
    subscriptions: HashMap<String, HashMap<ConnectionId, QoS>>,
    connections: HashMap<ConnectionId, mpsc::UnboundedSender<InboundMessage>>,
    published: Vec<PublishedMessage>,
    failing_topics: HashSet<String>,
}

impl BusState {
    fn route(&self, topic: &str, payload: &[u8]) -> usize {
        let mut receivers: HashSet<&ConnectionId> = HashSet::new();
        for (filter, subscribers) in &self.subscriptions {
            if topic::matches(filter, topic) {
                receivers.extend(subscribers.keys());
            }
        }

        let mut delivered = 0;
        for id in receivers {
            match self.connections.get(id) {
                Some(sender) => {
                    if sender.send(InboundMessage::new(topic, payload)).is_ok() {
                        delivered += 1;
                    } else {
                        warn!(connection = %id, topic, "in-memory inbox is gone");
                    }
                }
                None => debug!(connection = %id, topic, "subscriber has no open connection"),
            }
        }
        delivered
    }
}

/// Shared in-process bus. Clones refer to the same bus.
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a new connection to the bus.
    pub fn connect(&self) -> MemoryConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = format!("memory-{}", Uuid::new_v4());
        self.state().connections.insert(id.clone(), tx);
        MemoryConnection {
            id,
            bus: self.clone(),
            inbox: rx,
        }
    }

    /// Publishes as an outside client. Returns how many connections received
    /// the message.
    pub fn inject(&self, topic: &str, payload: impl AsRef<[u8]>) -> usize {
        self.state().route(topic, payload.as_ref())
    }

    /// Every publish accepted from a [`MemoryPublisher`], in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state().published.clone()
    }

    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.state()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Active `(filter, qos)` pairs, one per subscribed connection.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        let state = self.state();
        let mut subs: Vec<(String, QoS)> = state
            .subscriptions
            .iter()
            .flat_map(|(filter, subscribers)| {
                subscribers.values().map(move |qos| (filter.clone(), *qos))
            })
            .collect();
        subs.sort_by(|a, b| a.0.cmp(&b.0));
        subs
    }

    pub fn open_connections(&self) -> usize {
        self.state().connections.len()
    }

    /// Every later publish to `topic` fails with a [`PublishError`].
    pub fn fail_publishes_to(&self, topic: &str) {
        self.state().failing_topics.insert(topic.to_string());
    }

    /// Drops every connection as if the broker went away. Pending `recv`
    /// calls return a [`ConnectionError`].
    pub fn disconnect_all(&self) {
        let mut state = self.state();
        state.connections.clear();
        state.subscriptions.clear();
    }

    fn subscribe(&self, id: &ConnectionId, filter: &str, qos: QoS) -> Result<(), ConnectionError> {
        if !topic::is_valid_filter(filter) {
            return Err(ConnectionError::Subscribe {
                topic: filter.to_string(),
                reason: "malformed topic filter".to_string(),
            });
        }
        let mut state = self.state();
        if !state.connections.contains_key(id) {
            return Err(ConnectionError::Closed);
        }
        state
            .subscriptions
            .entry(filter.to_string())
            .or_default()
            .insert(id.clone(), qos);
        Ok(())
    }

    fn publish(
        &self,
        id: &ConnectionId,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), PublishError> {
        let mut state = self.state();
        if !state.connections.contains_key(id) {
            return Err(PublishError::new(topic, "connection closed"));
        }
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(PublishError::new(topic, "invalid topic name"));
        }
        if state.failing_topics.contains(topic) {
            return Err(PublishError::new(topic, "rejected by bus"));
        }

        state.route(topic, &payload);
        state.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
        });
        Ok(())
    }

    fn release(&self, id: &ConnectionId) {
        let mut state = self.state();
        state.connections.remove(id);
        for subscribers in state.subscriptions.values_mut() {
            subscribers.remove(id);
        }
        state.subscriptions.retain(|_, subscribers| !subscribers.is_empty());
    }
}

/// One session on a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryConnection {
    id: ConnectionId,
    bus: MemoryBus,
    inbox: mpsc::UnboundedReceiver<InboundMessage>,
}

#[async_trait]
impl Connection for MemoryConnection {
    type Publisher = MemoryPublisher;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ConnectionError> {
        self.bus.subscribe(&self.id, topic, qos)
    }

    fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            id: self.id.clone(),
            bus: self.bus.clone(),
        }
    }

    async fn recv(&mut self) -> Result<InboundMessage, ConnectionError> {
        self.inbox
            .recv()
            .await
            .ok_or_else(|| ConnectionError::Lost("in-memory bus dropped the connection".to_string()))
    }

    async fn close(self) {
        self.bus.release(&self.id);
        debug!(connection = %self.id, "in-memory connection closed");
    }
}

/// Publishing handle bound to one [`MemoryConnection`].
#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    id: ConnectionId,
    bus: MemoryBus,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), PublishError> {
        self.bus.publish(&self.id, topic, payload, qos)
    }
}
