mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::test_helpers::{broker, config, executor};
use dynsec_tenancy::control::{
    AclEntry, AclType, BrokerConnector, BrokerLink, ChannelConnector, ChannelLink, CommandExecutor, DynSecCommand,
    Fault, LinkEvent, LinkSession, QoS, RoleRef, SessionParams,
};
use dynsec_tenancy::{DynSecError, FailureKind, WaitStage};
use tokio::sync::mpsc;

/// Answers every command with `{"command": <name>}` and counts open links.
#[derive(Clone, Default)]
struct EchoConnector {
    open: Arc<AtomicUsize>,
}

struct EchoLink {
    events: mpsc::Sender<LinkEvent>,
    open: Arc<AtomicUsize>,
    closed: bool,
}

#[async_trait]
impl BrokerConnector for EchoConnector {
    type Link = EchoLink;

    async fn connect(&self, _params: &SessionParams) -> Result<LinkSession<EchoLink>, DynSecError> {
        let (tx, rx) = mpsc::channel(8);
        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(LinkSession { link: EchoLink { events: tx, open: self.open.clone(), closed: false }, events: rx })
    }
}

#[async_trait]
impl BrokerLink for EchoLink {
    async fn subscribe(&mut self, _topic: &str, qos: QoS) -> Result<(), DynSecError> {
        assert_eq!(qos, QoS::ExactlyOnce);
        self.events.send(LinkEvent::SubscribeAck).await.map_err(|e| DynSecError::Link(e.to_string()))
    }

    async fn publish(&mut self, _topic: &str, payload: Vec<u8>, _qos: QoS) -> Result<(), DynSecError> {
        let request: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        let name = request["commands"][0]["command"].clone();
        let reply = serde_json::json!({"responses": [{"command": name}]});
        let message = LinkEvent::Message {
            topic: dynsec_tenancy::config::DEFAULT_RESPONSE_TOPIC.to_string(),
            payload: serde_json::to_vec(&reply).unwrap(),
        };
        self.events.send(message).await.map_err(|e| DynSecError::Link(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), DynSecError> {
        if !self.closed {
            self.closed = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test]
async fn echo_broker_round_trips_command_names() {
    let connector = EchoConnector::default();
    let open = connector.open.clone();
    let exec = CommandExecutor::new(connector, config());

    let commands = [
        DynSecCommand::create_role("r", vec![AclEntry::allow(AclType::SubscribePattern, "in/x/#")]),
        DynSecCommand::delete_role("r"),
        DynSecCommand::create_client("u", "p", Some("Display".into()), vec![RoleRef::new("r")]),
        DynSecCommand::delete_client("u"),
        DynSecCommand::rename_client("u", "New name"),
        DynSecCommand::get_client("u"),
        DynSecCommand::GetAnonymousGroup,
        DynSecCommand::default_acl_access(false, true, false, true),
    ];
    for command in &commands {
        let result = exec.run(command).await;
        assert!(result.success, "{command:?}");
        assert_eq!(result.matched_command.as_deref(), Some(command.name()));
    }
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn response_timeout_fails_and_releases_connection() {
    let broker = broker();
    broker.inject("deleteClient", None, Fault::DropResponse);
    let exec = executor(&broker);

    let result = exec.run(&DynSecCommand::delete_client("u")).await;
    assert!(!result.success);
    assert_eq!(result.failure(), Some(FailureKind::TransportTimeout));
    assert!(matches!(result.error, Some(DynSecError::Timeout { stage: WaitStage::Response, .. })));
    assert_eq!(broker.sessions_opened(), 1);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn subscribe_timeout_fails_and_releases_connection() {
    let broker = broker();
    broker.withhold_subscribe_ack(true);
    let exec = executor(&broker);

    let result = exec.run(&DynSecCommand::delete_role("r")).await;
    assert_eq!(result.failure(), Some(FailureKind::TransportTimeout));
    assert!(matches!(result.error, Some(DynSecError::Timeout { stage: WaitStage::Subscribe, .. })));
    assert!(broker.received().is_empty());
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test(start_paused = true)]
async fn caller_deadline_beats_response_timeout() {
    let broker = broker();
    broker.inject("createRole", None, Fault::Delay(Duration::from_secs(30)));
    let exec = executor(&broker);
    let started = tokio::time::Instant::now();

    let result = exec
        .run_until(&DynSecCommand::create_role("r", vec![]), started + Duration::from_secs(1))
        .await;
    assert_eq!(result.failure(), Some(FailureKind::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(broker.open_connections(), 0);
    // no rollback: the broker already applied it
    assert_eq!(broker.roles(), vec!["r".to_string()]);
}

/// Takes `delay` to connect, then behaves like the in-process connector.
struct SlowConnector {
    inner: ChannelConnector,
    delay: Duration,
}

#[async_trait]
impl BrokerConnector for SlowConnector {
    type Link = ChannelLink;

    async fn connect(&self, params: &SessionParams) -> Result<LinkSession<ChannelLink>, DynSecError> {
        tokio::time::sleep(self.delay).await;
        self.inner.connect(params).await
    }
}

#[tokio::test(start_paused = true)]
async fn caller_deadline_covers_slow_connect() {
    let broker = broker();
    let connector = SlowConnector { inner: ChannelConnector::new(broker.clone()), delay: Duration::from_secs(30) };
    let exec = CommandExecutor::new(connector, config());
    let started = tokio::time::Instant::now();

    let result = exec.run_until(&DynSecCommand::delete_role("r"), started + Duration::from_secs(1)).await;
    assert_eq!(result.failure(), Some(FailureKind::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(broker.received().is_empty());
    assert_eq!(broker.sessions_opened(), 0);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn concurrent_runs_use_separate_sessions() {
    let broker = broker();
    let exec = executor(&broker);

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let exec = exec.clone();
            tokio::spawn(async move { exec.run(&DynSecCommand::create_role(format!("role-{i}"), vec![])).await })
        })
        .collect();
    for outcome in futures::future::join_all(tasks).await {
        assert!(outcome.unwrap().success);
    }
    assert_eq!(broker.roles().len(), 8);
    assert_eq!(broker.sessions_opened(), 8);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn getters_expose_response_data() {
    let broker = broker();
    let exec = executor(&broker);
    exec.run(&DynSecCommand::create_role("r", vec![])).await;
    exec.run(&DynSecCommand::create_client("u1", "p1", Some("Sensor".into()), vec![RoleRef::new("r")])).await;

    let result = exec.run(&DynSecCommand::get_client("u1")).await;
    let client = &result.data().unwrap()["client"];
    assert_eq!(client["username"], "u1");
    assert_eq!(client["textname"], "Sensor");
    assert_eq!(client["roles"][0]["rolename"], "r");
    assert!(client.get("password").is_none());
}
