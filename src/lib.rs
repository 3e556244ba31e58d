#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # dynsec-tenancy
//!
//! Control-plane client for the MQTT broker's dynamic-security plugin, plus a
//! per-tenant provisioner that isolates tenants on a shared broker by topic
//! namespace.
//!
//! ## Features
//!
//! - **Typed commands** for the whole plugin API, encoded one per request
//! - **Short-lived sessions**: one broker connection per command, always closed
//! - **Bounded waits** for the subscribe ack and the response, plus caller deadlines
//! - **Idempotent role creation** via an exact-phrase allow-list
//! - **Tenant lifecycle**: namespaces, three roles, collision-safe credentials
//! - **Pluggable transports**: in-process emulator here, `rumqttc` in `dynsec-rumqtt`
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dynsec_tenancy::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), DynSecError> {
//!     let broker = InMemoryDynSec::new("admin", "secret");
//!     let mut config = DynSecConfig::default();
//!     config.admin.username = "admin".into();
//!     config.admin.password = "secret".into();
//!
//!     let executor = CommandExecutor::new(ChannelConnector::new(broker.clone()), config);
//!     let provisioner = TenantProvisioner::new(executor, Arc::new(InMemoryTenantStore::new()));
//!
//!     let tenant = provisioner.provision_tenant("acme").await?;
//!     assert_eq!(tenant.device.role_name, tenant.identity.device_role);
//!     assert_eq!(broker.roles().len(), 3);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod prelude;
pub mod telemetry;
pub mod tenant;
pub mod timeout;

pub use config::DynSecConfig;
pub use control::{
    BrokerConnector, BrokerLink, ChannelConnector, CommandCodec, CommandExecutor, CommandResult, DynSecCommand,
    DynSecTransport, InMemoryDynSec,
};
pub use error::{DynSecError, FailureKind, WaitStage};
pub use tenant::{Credential, RoleKind, TenantIdentity, TenantProvisioner, TenantStore};
pub use timeout::TimeoutPolicy;
