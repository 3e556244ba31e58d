use std::sync::Arc;

use dynsec_rumqtt::RumqttConnector;
use dynsec_tenancy::control::{CommandExecutor, DynSecCommand};
use dynsec_tenancy::tenant::{InMemoryTenantStore, RoleKind, TenantProvisioner};
use dynsec_tenancy::DynSecConfig;

// Requires Mosquitto with the dynamic-security plugin, e.g.
// DYNSEC_BROKER_HOST=127.0.0.1 DYNSEC_ADMIN_USER=admin DYNSEC_ADMIN_PASSWORD=... cargo test -- --ignored
fn config() -> DynSecConfig {
    std::env::var("DYNSEC_BROKER_HOST").expect("set DYNSEC_BROKER_HOST");
    DynSecConfig::from_env().expect("dynsec config from env")
}

#[tokio::test]
#[ignore]
async fn round_trips_against_live_broker() {
    let exec = CommandExecutor::new(RumqttConnector::new(), config());
    let result = exec.run(&DynSecCommand::GetAnonymousGroup).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.matched_command.as_deref(), Some("getAnonymousGroup"));
}

#[tokio::test]
#[ignore]
async fn provisions_and_removes_a_tenant() {
    let exec = CommandExecutor::new(RumqttConnector::new(), config());
    let provisioner = TenantProvisioner::new(exec.clone(), Arc::new(InMemoryTenantStore::new()));

    let tenant = provisioner.provision_tenant("rumqtt-it").await.expect("provision");
    let role = exec.run(&DynSecCommand::GetRole { rolename: tenant.identity.role_name(RoleKind::Device).to_string() }).await;
    assert!(role.success, "{:?}", role.error);

    let report = provisioner.deprovision_tenant("rumqtt-it").await.expect("deprovision");
    assert!(report.is_complete());
    let gone = exec.run(&DynSecCommand::get_client(tenant.device.username.as_str())).await;
    assert!(!gone.success);
}
