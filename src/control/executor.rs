//! One command, one session.
//!
//! `CommandExecutor` opens a fresh [`DynSecTransport`] per command, runs the
//! exchange, always closes the transport, decodes the response and applies the
//! idempotency policy. Every outcome comes back as a [`CommandResult`]; nothing
//! here panics or returns early with an error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::codec::CommandCodec;
use super::command::DynSecCommand;
use super::phrases::{
    ACL_ALREADY_EXISTS, CLIENT_ALREADY_IN_GROUP, CLIENT_ALREADY_IN_ROLE, GROUP_ALREADY_EXISTS,
    GROUP_ALREADY_IN_ROLE, ROLE_ALREADY_EXISTS,
};
use super::transport::{BrokerConnector, DynSecTransport};
use super::types::CommandResult;
use crate::config::DynSecConfig;
use crate::error::DynSecError;
use crate::telemetry::{emit_best_effort, CommandEvent, ControlEvent, NullSink, SessionEvent, TelemetrySink};

/// Broker errors that mean "already in the requested state", per command.
///
/// Matching is exact on the whole error text. `createClient` is deliberately
/// absent: a username collision must reach the caller so it can regenerate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdempotencyPolicy {
    satisfied: HashMap<String, Vec<String>>,
}

impl Default for IdempotencyPolicy {
    fn default() -> Self {
        Self::empty()
            .allow("createRole", ROLE_ALREADY_EXISTS)
            .allow("createGroup", GROUP_ALREADY_EXISTS)
            .allow("addRoleACL", ACL_ALREADY_EXISTS)
            .allow("addClientRole", CLIENT_ALREADY_IN_ROLE)
            .allow("addGroupRole", GROUP_ALREADY_IN_ROLE)
            .allow("addGroupClient", CLIENT_ALREADY_IN_GROUP)
    }
}

impl IdempotencyPolicy {
    /// Policy that normalizes nothing.
    pub fn empty() -> Self {
        Self { satisfied: HashMap::new() }
    }

    /// Treat `phrase` as success for `command`.
    pub fn allow(mut self, command: impl Into<String>, phrase: impl Into<String>) -> Self {
        self.satisfied.entry(command.into()).or_default().push(phrase.into());
        self
    }

    /// The allow-listed phrase matching `error_text` for `command`, if any.
    pub fn matching_phrase(&self, command: &str, error_text: &str) -> Option<&str> {
        self.satisfied
            .get(command)?
            .iter()
            .find(|phrase| phrase.as_str() == error_text)
            .map(String::as_str)
    }

    /// Normalize a broker-reported failure whose text is allow-listed.
    pub fn apply(&self, result: CommandResult) -> CommandResult {
        if result.success || !result.error.as_ref().is_some_and(DynSecError::is_broker) {
            return result;
        }
        let matched = result
            .error_text
            .as_deref()
            .is_some_and(|text| self.matching_phrase(&result.command, text).is_some());
        if matched {
            result.normalize()
        } else {
            result
        }
    }
}

/// Runs dynamic-security commands, one broker session per command.
///
/// Cheap to clone; clones share the connector and configuration, so one
/// executor can serve concurrent callers. Each call gets its own session and
/// client id.
pub struct CommandExecutor<C, S = NullSink> {
    connector: Arc<C>,
    config: Arc<DynSecConfig>,
    policy: Arc<IdempotencyPolicy>,
    sink: S,
}

impl<C, S: Clone> Clone for CommandExecutor<C, S> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            policy: Arc::clone(&self.policy),
            sink: self.sink.clone(),
        }
    }
}

impl<C> CommandExecutor<C, NullSink>
where
    C: BrokerConnector,
{
    /// Executor with the default idempotency policy and no telemetry.
    pub fn new(connector: C, config: DynSecConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
            policy: Arc::new(IdempotencyPolicy::default()),
            sink: NullSink,
        }
    }
}

impl<C, S> CommandExecutor<C, S>
where
    C: BrokerConnector,
    S: TelemetrySink + Sync,
    S::Future: Send + 'static,
{
    /// Replace the telemetry sink.
    pub fn with_sink<S2>(self, sink: S2) -> CommandExecutor<C, S2>
    where
        S2: TelemetrySink + Sync,
        S2::Future: Send + 'static,
    {
        CommandExecutor { connector: self.connector, config: self.config, policy: self.policy, sink }
    }

    /// Replace the idempotency policy.
    pub fn with_policy(mut self, policy: IdempotencyPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Configuration sessions are opened with.
    pub fn config(&self) -> &DynSecConfig {
        &self.config
    }

    /// The connector sessions are opened through.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run one command in its own session.
    pub async fn run(&self, command: &DynSecCommand) -> CommandResult {
        self.run_inner(command, None).await
    }

    /// Run one command, abandoning the wait at `deadline`.
    ///
    /// The deadline covers connecting as well as the exchange: a command whose
    /// session is not open by then is never published. A command cancelled
    /// after publishing may still be applied by the broker; the result carries
    /// `FailureKind::Cancelled` either way.
    pub async fn run_until(&self, command: &DynSecCommand, deadline: Instant) -> CommandResult {
        self.run_inner(command, Some(deadline)).await
    }

    async fn run_inner(&self, command: &DynSecCommand, deadline: Option<Instant>) -> CommandResult {
        let name = command.name();
        let payload = match CommandCodec::encode(command) {
            Ok(payload) => payload,
            Err(err) => return CommandResult::failed(name, err),
        };

        let opened = Instant::now();
        let opening = DynSecTransport::open(&*self.connector, &self.config);
        let opening = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, opening).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DynSecError::Cancelled { command: name.to_string() }),
            },
            None => opening.await,
        };
        let mut transport = match opening {
            Ok(transport) => transport,
            Err(err) => {
                warn!(command = name, error = %err, "dynsec session failed to open");
                self.emit(ControlEvent::Session(SessionEvent::ConnectFailed)).await;
                return self.finish(name, opened, CommandResult::failed(name, err)).await;
            }
        };
        self.emit(ControlEvent::Session(SessionEvent::Opened { client_id: transport.client_id().to_string() }))
            .await;

        debug!(command = name, client_id = transport.client_id(), "sending dynsec command");
        self.emit(ControlEvent::Command(CommandEvent::Sent { command: name })).await;
        let sent = Instant::now();
        let exchange = transport.execute(payload);
        let raw = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, exchange).await {
                Ok(raw) => raw,
                Err(_) => Err(DynSecError::Cancelled { command: name.to_string() }),
            },
            None => exchange.await,
        };

        transport.close().await;
        self.emit(ControlEvent::Session(SessionEvent::Closed { duration: opened.elapsed() })).await;

        let result = match raw {
            Ok(bytes) => CommandCodec::decode(name, &bytes),
            Err(err) => CommandResult::failed(name, err),
        };
        let result = self.policy.apply(result);
        self.finish(name, sent, result).await
    }

    async fn finish(&self, name: &'static str, started: Instant, result: CommandResult) -> CommandResult {
        let duration = started.elapsed();
        let event = if result.normalized {
            let phrase = result.error_text.clone().unwrap_or_default();
            warn!(command = name, %phrase, "dynsec command already satisfied");
            CommandEvent::Normalized { command: name, phrase }
        } else if let Some(kind) = result.failure() {
            match &result.error {
                Some(err) => warn!(command = name, %kind, error = %err, "dynsec command failed"),
                None => warn!(command = name, %kind, "dynsec command failed"),
            }
            CommandEvent::Failed { command: name, kind, duration }
        } else {
            debug!(command = name, ?duration, "dynsec command succeeded");
            CommandEvent::Succeeded { command: name, duration }
        };
        self.emit(ControlEvent::Command(event)).await;
        result
    }

    async fn emit(&self, event: ControlEvent) {
        emit_best_effort(self.sink.clone(), event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::command::{AclEntry, AclType};
    use crate::control::memory_broker::{Fault, InMemoryDynSec};
    use crate::control::phrases::{CLIENT_ALREADY_EXISTS, ROLE_NOT_FOUND};
    use crate::control::transport_channel::ChannelConnector;
    use crate::error::FailureKind;
    use crate::telemetry::MemorySink;
    use std::time::Duration;

    fn executor() -> (InMemoryDynSec, CommandExecutor<ChannelConnector>) {
        let broker = InMemoryDynSec::new("admin", "pw");
        let mut cfg = DynSecConfig::default();
        cfg.admin.username = "admin".into();
        cfg.admin.password = "pw".into();
        (broker.clone(), CommandExecutor::new(ChannelConnector::new(broker), cfg))
    }

    fn role(name: &str) -> DynSecCommand {
        DynSecCommand::create_role(name, vec![AclEntry::allow(AclType::SubscribePattern, "in/x/#")])
    }

    #[test]
    fn policy_matches_exact_phrases_only() {
        let policy = IdempotencyPolicy::default();
        assert_eq!(policy.matching_phrase("createRole", ROLE_ALREADY_EXISTS), Some(ROLE_ALREADY_EXISTS));
        assert_eq!(policy.matching_phrase("createRole", "Role already exists!"), None);
        assert_eq!(policy.matching_phrase("createRole", "role already exists"), None);
        assert_eq!(policy.matching_phrase("createClient", CLIENT_ALREADY_EXISTS), None);
        assert_eq!(policy.matching_phrase("deleteRole", ROLE_NOT_FOUND), None);
    }

    #[test]
    fn policy_ignores_non_broker_failures() {
        let policy = IdempotencyPolicy::default();
        let res = CommandResult::failed("createRole", DynSecError::MalformedResponse("x".into()));
        assert!(!policy.apply(res).success);
    }

    #[tokio::test]
    async fn create_role_twice_is_normalized() {
        let (broker, exec) = executor();
        let first = exec.run(&role("r1")).await;
        assert!(first.success && !first.normalized);

        let second = exec.run(&role("r1")).await;
        assert!(second.success);
        assert!(second.normalized);
        assert_eq!(second.error_text.as_deref(), Some(ROLE_ALREADY_EXISTS));
        assert!(second.error.is_none());
        assert_eq!(broker.role_acls("r1").unwrap().len(), 1);
        assert_eq!(broker.open_connections(), 0);
        assert_eq!(broker.sessions_opened(), 2);
    }

    #[tokio::test]
    async fn client_collision_stays_a_failure() {
        let (broker, exec) = executor();
        broker.insert_client("taken", "x");
        let res = exec.run(&DynSecCommand::create_client("taken", "y", None, vec![])).await;
        assert!(!res.success);
        assert_eq!(res.error_text.as_deref(), Some(CLIENT_ALREADY_EXISTS));
        assert_eq!(res.failure(), Some(FailureKind::BrokerReported));
    }

    #[tokio::test]
    async fn custom_policy_extends_defaults() {
        let (_broker, exec) = executor();
        let exec = exec.with_policy(IdempotencyPolicy::default().allow("deleteRole", ROLE_NOT_FOUND));
        let res = exec.run(&DynSecCommand::delete_role("ghost")).await;
        assert!(res.success && res.normalized);
    }

    #[tokio::test]
    async fn mismatch_and_malformed_fail_with_distinct_kinds() {
        let (broker, exec) = executor();
        broker.inject_once("deleteClient", None, Fault::RespondAs("createRole".into()));
        broker.inject_once("getClient", None, Fault::Malformed);

        let res = exec.run(&DynSecCommand::delete_client("u")).await;
        assert_eq!(res.failure(), Some(FailureKind::CommandMismatch));
        assert_eq!(res.matched_command.as_deref(), Some("createRole"));

        let res = exec.run(&DynSecCommand::get_client("u")).await;
        assert_eq!(res.failure(), Some(FailureKind::MalformedResponse));
        assert_eq!(broker.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_and_closes() {
        let (broker, exec) = executor();
        broker.inject("listRoles", None, Fault::DropResponse);
        let deadline = Instant::now() + Duration::from_secs(2);

        let res = exec.run_until(&DynSecCommand::ListRoles { verbose: false, count: -1, offset: 0 }, deadline).await;
        assert_eq!(res.failure(), Some(FailureKind::Cancelled));
        assert_eq!(broker.open_connections(), 0);
    }

    #[tokio::test]
    async fn telemetry_records_session_and_outcome() {
        let (_broker, exec) = executor();
        let sink = MemorySink::new();
        let exec = exec.with_sink(sink.clone());

        exec.run(&role("r1")).await;
        exec.run(&role("r1")).await;

        let events = sink.for_command("createRole");
        assert_eq!(events.len(), 4);
        assert!(matches!(events[1], ControlEvent::Command(CommandEvent::Succeeded { .. })));
        assert!(matches!(events[3], ControlEvent::Command(CommandEvent::Normalized { .. })));
        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, ControlEvent::Session(SessionEvent::Closed { .. }))));
    }

    #[tokio::test]
    async fn connect_failure_is_a_link_failure() {
        let broker = InMemoryDynSec::new("admin", "pw");
        let mut cfg = DynSecConfig::default();
        cfg.admin.username = "admin".into();
        cfg.admin.password = "wrong".into();
        let exec = CommandExecutor::new(ChannelConnector::new(broker.clone()), cfg);
        let res = exec.run(&DynSecCommand::delete_role("r")).await;
        assert_eq!(res.failure(), Some(FailureKind::Link));
        assert_eq!(broker.sessions_opened(), 0);
    }
}
