use std::collections::HashSet;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use super::memory_broker::{InMemoryDynSec, Reply};
use super::transport::{BrokerConnector, BrokerLink, LinkEvent, LinkSession, QoS, SessionParams};
use crate::error::DynSecError;

/// In-process connector wired to an [`InMemoryDynSec`] emulator.
#[derive(Clone, Debug)]
pub struct ChannelConnector {
    broker: InMemoryDynSec,
}

impl ChannelConnector {
    /// Connector for `broker`.
    pub fn new(broker: InMemoryDynSec) -> Self {
        Self { broker }
    }

    /// The emulator behind this connector.
    pub fn broker(&self) -> &InMemoryDynSec {
        &self.broker
    }

    /// Connections currently open.
    pub fn open_connections(&self) -> usize {
        self.broker.open_connections()
    }
}

#[async_trait]
impl BrokerConnector for ChannelConnector {
    type Link = ChannelLink;

    async fn connect(&self, params: &SessionParams) -> Result<LinkSession<ChannelLink>, DynSecError> {
        if !self.broker.authenticate(&params.username, &params.password) {
            return Err(DynSecError::Link(format!("connection refused for {}: not authorized", params.username)));
        }
        let (tx, rx) = mpsc::channel(64);
        // Receiver is fresh; capacity cannot be exhausted yet.
        let _ = tx.try_send(LinkEvent::Connected);
        self.broker.connection_opened();
        trace!(client_id = %params.client_id, "channel link connected");
        Ok(LinkSession {
            link: ChannelLink {
                broker: self.broker.clone(),
                events: tx,
                subscriptions: HashSet::new(),
                connected: true,
            },
            events: rx,
        })
    }
}

/// Outgoing half of an in-process connection.
#[derive(Debug)]
pub struct ChannelLink {
    broker: InMemoryDynSec,
    events: mpsc::Sender<LinkEvent>,
    subscriptions: HashSet<String>,
    connected: bool,
}

impl ChannelLink {
    fn ensure_connected(&self) -> Result<(), DynSecError> {
        if self.connected {
            Ok(())
        } else {
            Err(DynSecError::Link("not connected".into()))
        }
    }

    fn release(&mut self) {
        if self.connected {
            self.connected = false;
            self.broker.connection_closed();
        }
    }
}

#[async_trait]
impl BrokerLink for ChannelLink {
    async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), DynSecError> {
        self.ensure_connected()?;
        self.subscriptions.insert(topic.to_string());
        if self.broker.acks_subscriptions() {
            let _ = self.events.send(LinkEvent::SubscribeAck).await;
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>, _qos: QoS) -> Result<(), DynSecError> {
        self.ensure_connected()?;
        if topic != self.broker.topics().request {
            return Ok(());
        }
        let response_topic = self.broker.topics().response.clone();
        let reply = self.broker.handle(&payload);
        if !self.subscriptions.contains(&response_topic) {
            return Ok(());
        }
        match reply {
            Reply::Send(payload) => {
                let _ = self.events.send(LinkEvent::Message { topic: response_topic, payload }).await;
            }
            Reply::Delayed(payload, delay) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(LinkEvent::Message { topic: response_topic, payload }).await;
                });
            }
            Reply::Drop => {}
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), DynSecError> {
        self.release();
        Ok(())
    }
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        self.release();
    }
}
