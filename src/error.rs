//! Error types for the control-plane client and tenant provisioning
use std::fmt;
use std::time::Duration;

/// Which blocking wait inside a transport session expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStage {
    /// Waiting for the broker to acknowledge the response-channel subscription.
    Subscribe,
    /// Waiting for the response to a published command.
    Response,
}

impl fmt::Display for WaitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStage::Subscribe => write!(f, "subscribe ack"),
            WaitStage::Response => write!(f, "response"),
        }
    }
}

/// Copyable discriminant of a failed command, carried inside `CommandResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FailureKind {
    /// No response within the deadline.
    TransportTimeout,
    /// Response payload could not be decoded.
    MalformedResponse,
    /// Response belongs to a different command than the one sent.
    CommandMismatch,
    /// Broker answered with an error that is not an already-satisfied phrase.
    BrokerReported,
    /// Caller deadline expired before the exchange finished.
    Cancelled,
    /// The broker connection could not be established or broke mid-session.
    Link,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::TransportTimeout => "transport_timeout",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::CommandMismatch => "command_mismatch",
            FailureKind::BrokerReported => "broker_reported",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Link => "link",
        };
        f.write_str(s)
    }
}

/// Unified error type for control-plane calls and provisioning.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DynSecError {
    /// A bounded wait elapsed.
    #[error("timed out waiting for {stage} after {elapsed:?} (limit: {limit:?})")]
    Timeout {
        /// The wait that expired.
        stage: WaitStage,
        /// Time actually spent waiting.
        elapsed: Duration,
        /// Configured limit.
        limit: Duration,
    },
    /// Response payload was not a well-formed control-plane response.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    /// Response named a different command than the one sent.
    #[error("command mismatch: sent {expected}, response for {actual}")]
    CommandMismatch {
        /// Command that was published.
        expected: String,
        /// Command named in the response.
        actual: String,
    },
    /// Broker reported an error for the command.
    #[error("broker rejected {command}: {message}")]
    Broker {
        /// Command that failed.
        command: String,
        /// Error text as reported by the broker.
        message: String,
    },
    /// Unique name generation gave up.
    #[error("could not generate a unique {what} after {attempts} attempts")]
    GenerationExhausted {
        /// What was being generated (namespace, username).
        what: &'static str,
        /// Attempts made.
        attempts: usize,
    },
    /// Caller deadline expired; the broker may still apply the command.
    #[error("cancelled by caller deadline while running {command}")]
    Cancelled {
        /// Command in flight when the deadline fired.
        command: String,
    },
    /// Command could not be serialized.
    #[error("encode: {0}")]
    Encode(String),
    /// Connection-level failure.
    #[error("broker link: {0}")]
    Link(String),
    /// Transport was used after close.
    #[error("transport closed")]
    Closed,
    /// Configuration could not be loaded or failed validation.
    #[error("config: {0}")]
    Config(String),
    /// No identity is stored for the tenant.
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    /// Another tenant already holds the topic namespace.
    #[error("namespace {0} already assigned")]
    NamespaceTaken(String),
    /// Tenant persistence collaborator failed.
    #[error("store: {0}")]
    Store(String),
}

impl DynSecError {
    /// Check if this error is due to a bounded wait expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if the broker reported the error (as opposed to transport confusion).
    pub fn is_broker(&self) -> bool {
        matches!(self, Self::Broker { .. })
    }

    /// Broker error text, if this is a broker-reported error.
    pub fn broker_message(&self) -> Option<&str> {
        match self {
            Self::Broker { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Failure kind for errors that come out of a single command exchange.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::TransportTimeout,
            Self::MalformedResponse(_) => FailureKind::MalformedResponse,
            Self::CommandMismatch { .. } => FailureKind::CommandMismatch,
            Self::Broker { .. } => FailureKind::BrokerReported,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            _ => FailureKind::Link,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = DynSecError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_display_includes_stage_and_limit() {
        let err = DynSecError::Timeout {
            stage: WaitStage::Response,
            elapsed: Duration::from_millis(10_002),
            limit: Duration::from_secs(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("response"));
        assert!(msg.contains("10s"));
        assert!(err.is_timeout());
        assert_eq!(err.failure_kind(), FailureKind::TransportTimeout);
    }

    #[test]
    fn broker_message_only_for_broker_errors() {
        let err = DynSecError::Broker { command: "deleteRole".into(), message: "Role not found".into() };
        assert_eq!(err.broker_message(), Some("Role not found"));
        assert!(DynSecError::Closed.broker_message().is_none());
    }

    #[test]
    fn non_exchange_errors_map_to_link() {
        assert_eq!(DynSecError::Config("x".into()).failure_kind(), FailureKind::Link);
        assert_eq!(
            DynSecError::GenerationExhausted { what: "username", attempts: 3 }.failure_kind(),
            FailureKind::Link
        );
    }
}
