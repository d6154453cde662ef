//! Database Backup Operator
//!
//! Main entry point for the core. Sets up the Kubernetes client, registers
//! the intent controllers, and runs the reconciliation loops.

use std::sync::Arc;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use db_backup_operator::{
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
    telemetry::{init_tracing, shutdown_signal},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Database Backup Operator");

    let config = OperatorConfig::from_env()?;
    info!(
        namespace = %config.namespace,
        timeout_secs = config.adapter_timeout.as_secs(),
        "Loaded operator configuration"
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let shutdown = CancellationToken::new();
    let metrics_port = config.metrics_port;
    let context = Arc::new(Context::new(client.clone(), config, shutdown.clone())?);

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    // Run all controllers concurrently
    let backup_controller = controllers::run_backup_controller(client.clone(), context.clone());
    let restore_controller = controllers::run_restore_controller(client.clone(), context.clone());

    tokio::select! {
        _ = backup_controller => {
            error!("Backup controller exited unexpectedly");
        }
        _ = restore_controller => {
            error!("Restore controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    shutdown.cancel();
    info!("Database Backup Operator stopped");
    Ok(())
}
