//! MQTT session
//!
//! `MqttConnection` wraps a `rumqttc` client and its event loop:
//! - `connect` drives the event loop until the broker answers CONNACK, so an
//!   unreachable or refusing broker fails at startup instead of on first use
//! - `subscribe` waits for the matching SUBACK
//! - `recv` keeps polling the event loop; besides yielding inbound publishes
//!   this is what flushes the publishes queued by `MqttPublisher` handles and
//!   completes QoS 2 handshakes, so the event loop must be polled for the
//!   whole session
//!
//! rumqttc reconnects on the next poll after an error. The kitchen treats any
//! error as the end of the session instead, and never polls again once one
//! was seen.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode, Transport,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::message::{InboundMessage, QoS};
use super::{Connection, Publisher};
use crate::config::{BrokerSettings, TransportMode};
use crate::utils::error::{ConnectionError, PublishError};

/// How long `close` waits for the DISCONNECT to reach the socket.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Builds the rumqttc options for `settings`.
///
/// Websocket transports take the full URL as broker address; rumqttc uses the
/// port argument only for plain sockets.
pub fn mqtt_options(settings: &BrokerSettings) -> MqttOptions {
    let client_id = settings
        .client_id
        .clone()
        .unwrap_or_else(|| format!("kitchen-{}", Uuid::new_v4()));

    let address = if settings.transport.is_websocket() {
        settings.endpoint()
    } else {
        settings.host.clone()
    };

    let mut options = MqttOptions::new(client_id, address, settings.port);
    options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs));
    options.set_clean_session(true);
    options.set_transport(match settings.transport {
        TransportMode::Tcp => Transport::Tcp,
        TransportMode::Tls => Transport::tls_with_default_config(),
        TransportMode::Ws => Transport::Ws,
        TransportMode::Wss => Transport::wss_with_default_config(),
    });
    options
}

pub struct MqttConnection {
    client: AsyncClient,
    eventloop: EventLoop,
    endpoint: String,
    /// Publishes that arrived while waiting for a SUBACK.
    pending: VecDeque<InboundMessage>,
    lost: bool,
}

impl MqttConnection {
    /// Opens the session and waits for the broker to accept it.
    pub async fn connect(settings: &BrokerSettings) -> Result<Self, ConnectionError> {
        let endpoint = settings.endpoint();
        let options = mqtt_options(settings);
        let (client, mut eventloop) = AsyncClient::new(options, settings.channel_capacity);

        info!(%endpoint, "connecting to broker");
        let after = Duration::from_secs(settings.connect_timeout_secs);
        let connack = tokio::time::timeout(after, await_connack(&mut eventloop, &endpoint)).await;
        match connack {
            Ok(result) => result?,
            Err(_) => return Err(ConnectionError::Timeout { endpoint, after }),
        }
        info!(%endpoint, "connected to broker");

        Ok(Self {
            client,
            eventloop,
            endpoint,
            pending: VecDeque::new(),
            lost: false,
        })
    }

    /// Publishes and drives the event loop until the broker has acknowledged
    /// the message (PUBACK for QoS 1, PUBCOMP for QoS 2). Meant for one-shot
    /// clients that disconnect right after publishing; nothing else may be
    /// in flight on this session.
    pub async fn publish_confirmed(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
    ) -> Result<(), PublishError> {
        self.publisher().publish(topic, payload, qos).await?;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Outgoing(Outgoing::Publish(_))) if qos == QoS::AtMostOnce => return Ok(()),
                Ok(Event::Incoming(Packet::PubAck(_))) if qos == QoS::AtLeastOnce => return Ok(()),
                Ok(Event::Incoming(Packet::PubComp(_))) if qos == QoS::ExactlyOnce => return Ok(()),
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pending
                        .push_back(InboundMessage::new(publish.topic, publish.payload.to_vec()));
                }
                Ok(_) => {}
                Err(e) => {
                    self.lost = true;
                    return Err(PublishError::new(topic, e));
                }
            }
        }
    }

    fn lose(&mut self, reason: String) -> ConnectionError {
        self.lost = true;
        ConnectionError::Lost(reason)
    }
}

async fn await_connack(eventloop: &mut EventLoop, endpoint: &str) -> Result<(), ConnectionError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return if ack.code == ConnectReturnCode::Success {
                    Ok(())
                } else {
                    Err(ConnectionError::Refused {
                        endpoint: endpoint.to_string(),
                        code: format!("{:?}", ack.code),
                    })
                };
            }
            Ok(event) => debug!(?event, "event before connack"),
            Err(rumqttc::ConnectionError::ConnectionRefused(code)) => {
                return Err(ConnectionError::Refused {
                    endpoint: endpoint.to_string(),
                    code: format!("{code:?}"),
                });
            }
            Err(e) => {
                return Err(ConnectionError::Unreachable {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }
}

#[async_trait]
impl Connection for MqttConnection {
    type Publisher = MqttPublisher;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), ConnectionError> {
        if self.lost {
            return Err(ConnectionError::Closed);
        }
        self.client
            .subscribe(topic, qos.into())
            .await
            .map_err(|e| ConnectionError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    return match ack.return_codes.first() {
                        Some(SubscribeReasonCode::Success(granted)) => {
                            let granted = QoS::from(*granted);
                            if granted != qos {
                                warn!(topic, requested = %qos, %granted, "broker downgraded subscription");
                            }
                            info!(topic, qos = %granted, "subscribed");
                            Ok(())
                        }
                        _ => Err(ConnectionError::Subscribe {
                            topic: topic.to_string(),
                            reason: "rejected by broker".to_string(),
                        }),
                    };
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.pending
                        .push_back(InboundMessage::new(publish.topic, publish.payload.to_vec()));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(self.lose("broker sent DISCONNECT".to_string()));
                }
                Ok(_) => {}
                Err(e) => return Err(self.lose(e.to_string())),
            }
        }
    }

    fn publisher(&self) -> MqttPublisher {
        MqttPublisher {
            client: self.client.clone(),
        }
    }

    async fn recv(&mut self) -> Result<InboundMessage, ConnectionError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        if self.lost {
            return Err(ConnectionError::Closed);
        }

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(InboundMessage::new(publish.topic, publish.payload.to_vec()));
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    return Err(self.lose("broker sent DISCONNECT".to_string()));
                }
                Ok(_) => {}
                Err(e) => return Err(self.lose(e.to_string())),
            }
        }
    }

    async fn close(mut self) {
        if self.lost {
            info!(endpoint = %self.endpoint, "connection already lost, nothing to release");
            return;
        }
        if let Err(e) = self.client.try_disconnect() {
            warn!(endpoint = %self.endpoint, error = %e, "could not queue DISCONNECT");
            return;
        }

        let eventloop = &mut self.eventloop;
        let flushed = tokio::time::timeout(CLOSE_GRACE, async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        })
        .await;

        if flushed.is_err() {
            warn!(endpoint = %self.endpoint, "DISCONNECT not flushed before timeout");
        }
        info!(endpoint = %self.endpoint, "disconnected from broker");
    }
}

impl fmt::Debug for MqttConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttConnection")
            .field("endpoint", &self.endpoint)
            .field("pending", &self.pending.len())
            .field("lost", &self.lost)
            .finish()
    }
}

/// Publishing handle over the session's request channel. The channel is the
/// single writer to the socket, so clones can publish concurrently.
///
/// `publish` returns once the request is queued; delivery and the QoS 2
/// handshake are completed by the event loop that `recv` drives.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), PublishError> {
        self.client
            .publish(topic, qos.into(), false, payload)
            .await
            .map_err(|e| PublishError::new(topic, e))
    }
}
