//! Per-tenant topic isolation on a shared broker.
//!
//! Each tenant gets a random topic namespace, three roles confined to that
//! namespace and broker credentials bound to one of those roles. The
//! [`TenantProvisioner`] drives the lifecycle through the control-plane
//! executor and records what it issued in a [`TenantStore`].

pub mod names;
pub mod provisioner;
pub mod store;
pub mod topics;

pub use names::{NameGenerator, RandomNames, SequenceNames};
pub use provisioner::{
    BulkDeletion, DeprovisionReport, ProvisionedTenant, TenantProvisioner, AUTOMATION_DISPLAY_NAME,
    EXAMPLE_DEVICE_DISPLAY_NAME,
};
pub use store::{Credential, InMemoryTenantStore, TenantStore};
pub use topics::{RoleKind, TenantIdentity, TopicNamespace, TopicPatterns};
