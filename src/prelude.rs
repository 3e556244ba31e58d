//! Convenient re-exports for common dynsec-tenancy types.
pub use crate::{
    config::DynSecConfig,
    control::{
        AclEntry, AclType, BrokerConnector, ChannelConnector, CommandExecutor, CommandResult, DynSecCommand,
        IdempotencyPolicy, InMemoryDynSec, RoleRef,
    },
    error::{DynSecError, FailureKind},
    telemetry::{LogSink, MemorySink, NullSink, TelemetrySink},
    tenant::{
        Credential, InMemoryTenantStore, RandomNames, RoleKind, TenantIdentity, TenantProvisioner, TenantStore,
    },
};
