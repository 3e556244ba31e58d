use std::fmt;
use std::time::Duration;

use crate::error::FailureKind;

/// Control-plane events emitted by the executor.
///
/// Events never carry passwords or payloads; only command names, durations and
/// failure kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    /// Broker session lifecycle
    Session(SessionEvent),
    /// Per-command outcomes
    Command(CommandEvent),
}

/// Broker session lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection established and response subscription requested.
    Opened {
        /// MQTT client id of the session
        client_id: String,
    },
    /// Connection could not be established.
    ConnectFailed,
    /// Session disconnected.
    Closed {
        /// Time from connect to disconnect
        duration: Duration,
    },
}

/// Per-command events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEvent {
    /// Command published on the control channel.
    Sent {
        /// Wire name of the command
        command: &'static str,
    },
    /// Broker answered without an error.
    Succeeded {
        /// Wire name of the command
        command: &'static str,
        /// Publish-to-result time
        duration: Duration,
    },
    /// Broker error treated as already satisfied.
    Normalized {
        /// Wire name of the command
        command: &'static str,
        /// The error text that matched
        phrase: String,
    },
    /// Command failed.
    Failed {
        /// Wire name of the command
        command: &'static str,
        /// Why it failed
        kind: FailureKind,
        /// Publish-to-result time
        duration: Duration,
    },
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::Session(e) => write!(f, "Session::{}", e),
            ControlEvent::Command(e) => write!(f, "Command::{}", e),
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::Opened { client_id } => write!(f, "Opened(client_id={})", client_id),
            SessionEvent::ConnectFailed => write!(f, "ConnectFailed"),
            SessionEvent::Closed { duration } => write!(f, "Closed(duration={:?})", duration),
        }
    }
}

impl fmt::Display for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandEvent::Sent { command } => write!(f, "Sent({})", command),
            CommandEvent::Succeeded { command, duration } => {
                write!(f, "Succeeded({}, duration={:?})", command, duration)
            }
            CommandEvent::Normalized { command, phrase } => {
                write!(f, "Normalized({}, phrase={:?})", command, phrase)
            }
            CommandEvent::Failed { command, kind, duration } => {
                write!(f, "Failed({}, kind={}, duration={:?})", command, kind, duration)
            }
        }
    }
}

impl ControlEvent {
    /// Command name for command events.
    pub fn command(&self) -> Option<&'static str> {
        match self {
            ControlEvent::Command(
                CommandEvent::Sent { command }
                | CommandEvent::Succeeded { command, .. }
                | CommandEvent::Normalized { command, .. }
                | CommandEvent::Failed { command, .. },
            ) => Some(command),
            ControlEvent::Session(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable() {
        let e = ControlEvent::Command(CommandEvent::Failed {
            command: "deleteClient",
            kind: FailureKind::TransportTimeout,
            duration: Duration::from_millis(5),
        });
        assert_eq!(e.to_string(), "Command::Failed(deleteClient, kind=transport_timeout, duration=5ms)");

        let e = ControlEvent::Command(CommandEvent::Normalized {
            command: "createRole",
            phrase: "Role already exists".into(),
        });
        assert_eq!(e.to_string(), r#"Command::Normalized(createRole, phrase="Role already exists")"#);
        assert_eq!(e.command(), Some("createRole"));
    }

    #[test]
    fn session_events_have_no_command() {
        let e = ControlEvent::Session(SessionEvent::Closed { duration: Duration::from_millis(1) });
        assert_eq!(e.command(), None);
        assert_eq!(e.to_string(), "Session::Closed(duration=1ms)");
    }
}
