//! One broker session carrying control-plane commands.
//!
//! A `DynSecTransport` owns exactly one broker connection. It subscribes to the
//! response channel when opened and then runs commands strictly one at a time:
//! wait for the subscribe ack, publish, take the next message on the response
//! channel as the answer. Because only one command is ever in flight, no
//! correlation id is needed beyond "the next response after publish".
//!
//! Connections come from a [`BrokerConnector`]; session events (acks, messages,
//! disconnects) arrive on an mpsc channel fed by the connector's receive loop.

use std::fmt;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::{ControlTopics, DynSecConfig};
use crate::error::DynSecError;
use crate::timeout::TimeoutPolicy;

/// MQTT delivery guarantee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery, may duplicate.
    AtLeastOnce,
    /// Four-way handshake, no duplicates.
    ExactlyOnce,
}

/// Events delivered by a connector's receive loop.
#[derive(Clone, Debug, PartialEq)]
pub enum LinkEvent {
    /// Broker accepted the connection.
    Connected,
    /// Broker acknowledged a subscription.
    SubscribeAck,
    /// Message delivered on a subscribed topic.
    Message {
        /// Topic the message arrived on.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
    /// Connection ended; the receive loop has stopped.
    Disconnected(String),
}

/// Connection parameters for one session.
#[derive(Clone, PartialEq)]
pub struct SessionParams {
    /// Unique MQTT client id for this session.
    pub client_id: String,
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Keep-alive in seconds.
    pub keep_alive_secs: u64,
    /// Admin username.
    pub username: String,
    /// Admin password.
    pub password: String,
}

impl SessionParams {
    /// Build parameters from config with a fresh client id.
    pub fn from_config(config: &DynSecConfig) -> Self {
        Self {
            client_id: format!("{}-{}", config.broker.client_id_prefix, uuid::Uuid::new_v4().simple()),
            host: config.broker.host.clone(),
            port: config.broker.port,
            keep_alive_secs: config.broker.keep_alive_secs,
            username: config.admin.username.clone(),
            password: config.admin.password.clone(),
        }
    }
}

impl fmt::Debug for SessionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionParams")
            .field("client_id", &self.client_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Outgoing half of a broker connection.
#[async_trait]
pub trait BrokerLink: Send {
    /// Request a subscription; the ack arrives later as `LinkEvent::SubscribeAck`.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), DynSecError>;
    /// Publish a payload.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), DynSecError>;
    /// Disconnect and stop the receive loop. Must tolerate repeated calls.
    async fn disconnect(&mut self) -> Result<(), DynSecError>;
}

/// A connected link plus the event stream of its receive loop.
pub struct LinkSession<L> {
    /// Outgoing half.
    pub link: L,
    /// Incoming events.
    pub events: mpsc::Receiver<LinkEvent>,
}

/// Opens broker connections.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Link type produced by this connector.
    type Link: BrokerLink + 'static;

    /// Open a new connection.
    async fn connect(&self, params: &SessionParams) -> Result<LinkSession<Self::Link>, DynSecError>;
}

/// Session lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Closed (or never connected).
    Disconnected,
    /// Connection requested, response subscription not yet issued.
    Connecting,
    /// Subscribed (or subscription pending), idle between commands.
    SubscribedWaiting,
    /// Command being published.
    Publishing,
    /// Waiting for the command's response.
    AwaitingResponse,
}

/// A control-plane session over one broker connection.
pub struct DynSecTransport<L: BrokerLink> {
    link: L,
    events: mpsc::Receiver<LinkEvent>,
    state: SessionState,
    subscribe_acked: bool,
    client_id: String,
    topics: ControlTopics,
    subscribe_wait: TimeoutPolicy,
    response_wait: TimeoutPolicy,
}

impl<L: BrokerLink> DynSecTransport<L> {
    /// Connect with the admin identity and subscribe to the response channel.
    pub async fn open<C>(connector: &C, config: &DynSecConfig) -> Result<Self, DynSecError>
    where
        C: BrokerConnector<Link = L> + ?Sized,
    {
        let params = SessionParams::from_config(config);
        debug!(client_id = %params.client_id, host = %params.host, port = params.port, "dynsec session connecting");
        let LinkSession { link, events } = connector.connect(&params).await?;

        let mut transport = Self {
            link,
            events,
            state: SessionState::Connecting,
            subscribe_acked: false,
            client_id: params.client_id,
            topics: config.topics.clone(),
            subscribe_wait: config.timeouts.subscribe_policy(),
            response_wait: config.timeouts.response_policy(),
        };

        let response_topic = transport.topics.response.clone();
        if let Err(err) = transport.link.subscribe(&response_topic, QoS::ExactlyOnce).await {
            transport.close().await;
            return Err(err);
        }
        transport.state = SessionState::SubscribedWaiting;
        Ok(transport)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// MQTT client id of this session.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Publish one command payload and wait for its response payload.
    pub async fn execute(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, DynSecError> {
        if self.state == SessionState::Disconnected {
            return Err(DynSecError::Closed);
        }

        if !self.subscribe_acked {
            let wait = self.subscribe_wait;
            let events = &mut self.events;
            wait.execute(move || await_subscribe_ack(events)).await?;
            self.subscribe_acked = true;
            trace!(client_id = %self.client_id, "response subscription acknowledged");
        }

        self.discard_stale()?;

        self.state = SessionState::Publishing;
        let request_topic = self.topics.request.clone();
        if let Err(err) = self.link.publish(&request_topic, payload, QoS::ExactlyOnce).await {
            self.state = SessionState::SubscribedWaiting;
            return Err(err);
        }

        self.state = SessionState::AwaitingResponse;
        let wait = self.response_wait;
        let events = &mut self.events;
        let response_topic = self.topics.response.as_str();
        let outcome = wait.execute(move || await_response(events, response_topic)).await;
        self.state = SessionState::SubscribedWaiting;
        outcome
    }

    /// Disconnect. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.state == SessionState::Disconnected {
            return;
        }
        self.state = SessionState::Disconnected;
        if let Err(err) = self.link.disconnect().await {
            warn!(client_id = %self.client_id, error = %err, "dynsec session disconnect failed");
        }
        self.events.close();
        debug!(client_id = %self.client_id, "dynsec session closed");
    }

    // Anything queued before publish cannot be this command's response.
    fn discard_stale(&mut self) -> Result<(), DynSecError> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                LinkEvent::Message { topic, .. } => {
                    debug!(client_id = %self.client_id, %topic, "discarding stale message");
                }
                LinkEvent::Disconnected(reason) => return Err(DynSecError::Link(reason)),
                LinkEvent::Connected | LinkEvent::SubscribeAck => {}
            }
        }
        Ok(())
    }
}

impl<L: BrokerLink> Drop for DynSecTransport<L> {
    fn drop(&mut self) {
        if self.state != SessionState::Disconnected {
            warn!(client_id = %self.client_id, "dynsec session dropped without close");
        }
    }
}

async fn await_subscribe_ack(events: &mut mpsc::Receiver<LinkEvent>) -> Result<(), DynSecError> {
    loop {
        match events.recv().await {
            Some(LinkEvent::SubscribeAck) => return Ok(()),
            Some(LinkEvent::Connected) | Some(LinkEvent::Message { .. }) => continue,
            Some(LinkEvent::Disconnected(reason)) => return Err(DynSecError::Link(reason)),
            None => return Err(DynSecError::Link("event stream ended".into())),
        }
    }
}

async fn await_response(
    events: &mut mpsc::Receiver<LinkEvent>,
    response_topic: &str,
) -> Result<Vec<u8>, DynSecError> {
    loop {
        match events.recv().await {
            Some(LinkEvent::Message { topic, payload }) if topic == response_topic => return Ok(payload),
            Some(LinkEvent::Message { topic, .. }) => {
                trace!(%topic, "ignoring message outside the response channel");
            }
            Some(LinkEvent::Connected) | Some(LinkEvent::SubscribeAck) => {}
            Some(LinkEvent::Disconnected(reason)) => return Err(DynSecError::Link(reason)),
            None => return Err(DynSecError::Link("event stream ended".into())),
        }
    }
}
