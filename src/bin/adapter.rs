//! Engine adapter
//!
//! Serves the delegation protocol for one database engine and turns calls
//! into CronJobs and Jobs in the adapter's system namespace.

use std::sync::Arc;

use kube::Client;
use tracing::{error, info};

use db_backup_operator::{
    cluster::KubeUnitStore,
    config::AdapterConfig,
    delegation::server,
    scheduler::{EngineProfile, Scheduler},
    telemetry::{init_tracing, shutdown_signal},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AdapterConfig::from_env()?;
    info!(
        engine = %config.engine,
        namespace = %config.system_namespace,
        "Starting engine adapter"
    );

    let client = Client::try_default().await?;
    let scheduler = Scheduler::new(
        Arc::new(KubeUnitStore::new(client)),
        EngineProfile::from_config(&config),
        config.system_namespace.clone(),
    );

    tokio::select! {
        result = server::serve(config.port, Arc::new(scheduler)) => {
            if let Err(e) = result {
                error!(error = %e, "Delegation server failed");
                return Err(e);
            }
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping adapter");
        }
    }

    Ok(())
}
