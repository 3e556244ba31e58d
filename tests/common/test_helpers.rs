use std::sync::Arc;

use dynsec_tenancy::control::{ChannelConnector, CommandExecutor, InMemoryDynSec};
use dynsec_tenancy::tenant::{InMemoryTenantStore, NameGenerator, TenantProvisioner, TenantStore};
use dynsec_tenancy::DynSecConfig;

pub const ADMIN_USER: &str = "dynsec-admin";
pub const ADMIN_PASSWORD: &str = "dynsec-admin-pw";

pub fn config() -> DynSecConfig {
    let mut cfg = DynSecConfig::default();
    cfg.admin.username = ADMIN_USER.into();
    cfg.admin.password = ADMIN_PASSWORD.into();
    cfg
}

pub fn broker() -> InMemoryDynSec {
    InMemoryDynSec::new(ADMIN_USER, ADMIN_PASSWORD)
}

pub fn executor(broker: &InMemoryDynSec) -> CommandExecutor<ChannelConnector> {
    CommandExecutor::new(ChannelConnector::new(broker.clone()), config())
}

pub fn provisioner(
    broker: &InMemoryDynSec,
    names: Option<Arc<dyn NameGenerator>>,
) -> (TenantProvisioner<ChannelConnector>, Arc<InMemoryTenantStore>) {
    let store = Arc::new(InMemoryTenantStore::new());
    let mut p = TenantProvisioner::new(executor(broker), store.clone() as Arc<dyn TenantStore>);
    if let Some(names) = names {
        p = p.with_names(names);
    }
    (p, store)
}
