//! Provisioning a tenant against the in-process dynamic-security emulator.
//!
//! Run with `RUST_LOG=debug` to see every control event.

use std::sync::Arc;

use dynsec_tenancy::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== dynsec-tenancy: provision a tenant ===\n");

    let broker = InMemoryDynSec::new("admin", "admin-secret");
    let mut config = DynSecConfig::default();
    config.admin.username = "admin".into();
    config.admin.password = "admin-secret".into();

    let executor = CommandExecutor::new(ChannelConnector::new(broker.clone()), config).with_sink(LogSink);
    let store = Arc::new(InMemoryTenantStore::new());
    let provisioner = TenantProvisioner::new(executor, store);

    let tenant = provisioner.provision_tenant("acme").await?;
    let ns = &tenant.identity.namespace;
    println!("1. Tenant 'acme' got namespace {ns}");
    for kind in RoleKind::ALL {
        println!("   role {}", tenant.identity.role_name(kind));
        for acl in tenant.identity.acls(kind) {
            println!("     {:<22} {}", acl.acltype.as_str(), acl.topic);
        }
    }

    println!("\n2. Credentials");
    println!("   automation: {} ({})", tenant.automation.username, tenant.automation.role_name);
    println!("   device:     {} ({})", tenant.device.username, tenant.device.role_name);

    println!("\n3. Running provision again converges");
    let again = provisioner.provision_tenant("acme").await?;
    println!("   same device credential: {}", again.device == tenant.device);
    println!("   broker clients: {:?}", broker.clients());

    println!("\n4. Adding a device");
    let sensor = provisioner.issue_credential("acme", RoleKind::Device, "Kitchen sensor").await?;
    provisioner.modify_credential(&sensor.username, "Hallway sensor").await?;
    println!("   {} -> {:?}", sensor.username, broker.client_textname(&sensor.username));

    println!("\n5. Deprovisioning");
    let report = provisioner.deprovision_tenant("acme").await?;
    println!("   deleted credentials: {}", report.credentials.deleted.len());
    println!("   complete: {}", report.is_complete());
    println!("   roles left on broker: {:?}", broker.roles());

    Ok(())
}
