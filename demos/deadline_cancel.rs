//! Caller deadlines versus broker-side application.
//!
//! The emulator applies the command at once but holds the response back. The
//! caller gives up at its deadline; the role still exists afterwards.

use std::time::Duration;

use dynsec_tenancy::control::Fault;
use dynsec_tenancy::prelude::*;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== dynsec-tenancy: deadline cancellation ===\n");

    let broker = InMemoryDynSec::new("admin", "admin-secret");
    broker.inject("createRole", None, Fault::Delay(Duration::from_secs(3)));

    let mut config = DynSecConfig::default();
    config.admin.username = "admin".into();
    config.admin.password = "admin-secret".into();
    let sink = MemorySink::new();
    let executor = CommandExecutor::new(ChannelConnector::new(broker.clone()), config).with_sink(sink.clone());

    let started = Instant::now();
    let result = executor
        .run_until(&DynSecCommand::create_role("slow-role", Vec::new()), started + Duration::from_millis(500))
        .await;

    println!("1. Outcome after {:?}: {:?}", started.elapsed(), result.failure());
    println!("2. Broker roles anyway: {:?}", broker.roles());
    println!("3. Open broker connections: {}", broker.open_connections());
    println!("4. Events:");
    for event in sink.events() {
        println!("   {event}");
    }

    broker.clear_faults();
    let retry = executor.run(&DynSecCommand::create_role("slow-role", Vec::new())).await;
    println!("\n5. Retrying is safe: success={} normalized={}", retry.success, retry.normalized);

    Ok(())
}
