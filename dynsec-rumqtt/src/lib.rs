//! MQTT connector for `dynsec-tenancy` built on `rumqttc`.
//!
//! Each [`RumqttConnector::connect`] opens one MQTT 3.1.1 session, waits for the
//! broker's CONNACK and then hands the event loop to a background task that
//! forwards SUBACKs and PUBLISHes as [`LinkEvent`]s.
//!
//! ```rust,no_run
//! use dynsec_rumqtt::RumqttConnector;
//! use dynsec_tenancy::control::CommandExecutor;
//! use dynsec_tenancy::DynSecConfig;
//! # fn demo() -> Result<(), dynsec_tenancy::DynSecError> {
//! let config = DynSecConfig::from_env()?;
//! let executor = CommandExecutor::new(RumqttConnector::default(), config);
//! # let _ = executor;
//! # Ok(()) }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use dynsec_tenancy::control::{BrokerConnector, BrokerLink, LinkEvent, LinkSession, QoS, SessionParams};
use dynsec_tenancy::DynSecError;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, SubscribeReasonCode};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const DEFAULT_CAPACITY: usize = 16;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Time given to the event loop to flush DISCONNECT before it is aborted.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

/// Opens one `rumqttc` session per control-plane transport.
#[derive(Clone, Debug)]
pub struct RumqttConnector {
    capacity: usize,
    connect_timeout: Duration,
}

impl Default for RumqttConnector {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, connect_timeout: DEFAULT_CONNECT_TIMEOUT }
    }
}

impl RumqttConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on TCP connect plus CONNACK.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Request and event channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }
}

fn options(params: &SessionParams) -> MqttOptions {
    let mut options = MqttOptions::new(params.client_id.clone(), params.host.clone(), params.port);
    options.set_keep_alive(Duration::from_secs(params.keep_alive_secs.max(1)));
    options.set_credentials(params.username.clone(), params.password.clone());
    options.set_clean_session(true);
    options
}

fn map_qos(qos: QoS) -> rumqttc::QoS {
    match qos {
        QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
        QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
        QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
    }
}

fn link_error(err: impl std::fmt::Display) -> DynSecError {
    DynSecError::Link(err.to_string())
}

async fn await_connack(eventloop: &mut EventLoop) -> Result<(), DynSecError> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                return match ack.code {
                    ConnectReturnCode::Success => Ok(()),
                    code => Err(DynSecError::Link(format!("connection refused: {code:?}"))),
                };
            }
            Ok(_) => continue,
            Err(err) => return Err(link_error(err)),
        }
    }
}

async fn pump(mut eventloop: EventLoop, events: mpsc::Sender<LinkEvent>) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                if ack.return_codes.iter().any(|c| matches!(c, SubscribeReasonCode::Failure)) {
                    LinkEvent::Disconnected("subscription refused".into())
                } else {
                    LinkEvent::SubscribeAck
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                LinkEvent::Message { topic: publish.topic, payload: publish.payload.to_vec() }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = events.send(LinkEvent::Disconnected("client disconnect".into())).await;
                return;
            }
            Ok(other) => {
                trace!(?other, "mqtt event");
                continue;
            }
            Err(err) => {
                let _ = events.send(LinkEvent::Disconnected(err.to_string())).await;
                return;
            }
        };
        let stop = matches!(event, LinkEvent::Disconnected(_));
        if events.send(event).await.is_err() || stop {
            return;
        }
    }
}

#[async_trait]
impl BrokerConnector for RumqttConnector {
    type Link = RumqttLink;

    async fn connect(&self, params: &SessionParams) -> Result<LinkSession<RumqttLink>, DynSecError> {
        let (client, mut eventloop) = AsyncClient::new(options(params), self.capacity);
        match tokio::time::timeout(self.connect_timeout, await_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(DynSecError::Link(format!(
                    "no CONNACK from {}:{} within {:?}",
                    params.host, params.port, self.connect_timeout
                )))
            }
        }
        debug!(client_id = %params.client_id, "mqtt session connected");

        let (tx, rx) = mpsc::channel(self.capacity);
        tx.send(LinkEvent::Connected).await.map_err(link_error)?;
        let task = tokio::spawn(pump(eventloop, tx));
        Ok(LinkSession { link: RumqttLink { client, task: Some(task) }, events: rx })
    }
}

/// Outgoing half of a `rumqttc` session.
pub struct RumqttLink {
    client: AsyncClient,
    task: Option<JoinHandle<()>>,
}

#[async_trait]
impl BrokerLink for RumqttLink {
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), DynSecError> {
        self.client.subscribe(topic, map_qos(qos)).await.map_err(link_error)
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>, qos: QoS) -> Result<(), DynSecError> {
        self.client.publish(topic, map_qos(qos), false, payload).await.map_err(link_error)
    }

    async fn disconnect(&mut self) -> Result<(), DynSecError> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        let result = self.client.disconnect().await.map_err(link_error);
        let abort = task.abort_handle();
        if tokio::time::timeout(DISCONNECT_GRACE, task).await.is_err() {
            warn!("mqtt event loop did not stop after DISCONNECT; aborting");
            abort.abort();
        }
        result
    }
}

impl Drop for RumqttLink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SessionParams {
        SessionParams {
            client_id: "dynsec-test".into(),
            host: "127.0.0.1".into(),
            port: 1,
            keep_alive_secs: 0,
            username: "admin".into(),
            password: "pw".into(),
        }
    }

    #[test]
    fn options_carry_session_params() {
        let opts = options(&params());
        assert_eq!(opts.client_id(), "dynsec-test");
        assert_eq!(opts.keep_alive(), Duration::from_secs(1));
        assert_eq!(opts.broker_address(), ("127.0.0.1".to_string(), 1));
    }

    #[test]
    fn qos_maps_one_to_one() {
        assert_eq!(map_qos(QoS::AtMostOnce), rumqttc::QoS::AtMostOnce);
        assert_eq!(map_qos(QoS::AtLeastOnce), rumqttc::QoS::AtLeastOnce);
        assert_eq!(map_qos(QoS::ExactlyOnce), rumqttc::QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn unreachable_broker_is_a_link_error() {
        let connector = RumqttConnector::new().with_connect_timeout(Duration::from_secs(2));
        let err = connector.connect(&params()).await.err().unwrap();
        assert!(matches!(err, DynSecError::Link(_)));
    }
}
