//! Control-plane client for the broker's dynamic-security plugin.
//!
//! Commands are typed ([`DynSecCommand`]), encoded one per request by
//! [`CommandCodec`], carried over a short-lived [`DynSecTransport`] session and
//! run by [`CommandExecutor`], which also folds "already exists" style broker
//! errors into success where that is safe.
//!
//! Transports are pluggable through [`BrokerConnector`]. The in-process
//! [`ChannelConnector`] pairs with the [`InMemoryDynSec`] emulator for tests and
//! demos; a real MQTT connector lives in the `dynsec-rumqtt` crate.

/// Command catalogue.
pub mod command;
/// Request/response envelopes.
pub mod codec;
/// Per-command executor and idempotency policy.
pub mod executor;
/// In-memory plugin emulator.
pub mod memory_broker;
/// Plugin error texts.
pub mod phrases;
/// Session state machine and connector seams.
pub mod transport;
/// Channel-based transport implementation.
pub mod transport_channel;
/// Command result type.
pub mod types;

pub use codec::{CommandCodec, RequestEnvelope, ResponseEnvelope};
pub use command::{AclEntry, AclType, ClientRef, DefaultAcl, DynSecCommand, GroupRef, RoleRef, DEFAULT_PRIORITY};
pub use executor::{CommandExecutor, IdempotencyPolicy};
pub use memory_broker::{Fault, InMemoryDynSec};
pub use transport::{
    BrokerConnector, BrokerLink, DynSecTransport, LinkEvent, LinkSession, QoS, SessionParams, SessionState,
};
pub use transport_channel::{ChannelConnector, ChannelLink};
pub use types::CommandResult;
