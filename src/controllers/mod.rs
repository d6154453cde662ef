//! Kubernetes controllers for the backup CRDs
//!
//! This module contains the controller implementations that watch for CRD changes
//! and trigger reconciliation.

pub mod intent_controller;

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use kube::runtime::controller::Action;
use kube::Client;
use tokio_util::sync::CancellationToken;

use crate::cluster::{IntentStore, KubeIntentStore, KubeUnitStore, MemoryCluster, UnitStore};
use crate::config::OperatorConfig;
use crate::crd::{DatabaseBackup, DatabaseRestore, Intent};
use crate::delegation::{AdapterDialer, HttpDialer};
use crate::error::{Error, Result};
use crate::reconcilers::{backup as backup_reconciler, restore as restore_reconciler};
use crate::registry::{ConfigMapRegistry, RegistrySource};

/// Requeue delay for errors the next attempt may not hit
const RETRY_AFTER: Duration = Duration::from_secs(30);

/// Requeue delay for everything else
const BACKOFF_AFTER: Duration = Duration::from_secs(60);

/// Shared context for all controllers
pub struct Context {
    pub config: OperatorConfig,
    pub backups: Arc<dyn IntentStore<DatabaseBackup>>,
    pub restores: Arc<dyn IntentStore<DatabaseRestore>>,
    pub registry: Arc<dyn RegistrySource>,
    pub units: Arc<dyn UnitStore>,
    pub dialer: Arc<dyn AdapterDialer>,
    /// Cancelled on shutdown; in-flight adapter calls are abandoned
    pub shutdown: CancellationToken,
}

impl Context {
    /// Context backed by the API server
    pub fn new(client: Client, config: OperatorConfig, shutdown: CancellationToken) -> Result<Self> {
        let dialer = HttpDialer::new(config.adapter_timeout, config.adapter_tls)?;
        Ok(Self {
            backups: Arc::new(KubeIntentStore::new(client.clone())),
            restores: Arc::new(KubeIntentStore::new(client.clone())),
            registry: Arc::new(ConfigMapRegistry::new(client.clone(), &config.namespace)),
            units: Arc::new(KubeUnitStore::new(client)),
            dialer: Arc::new(dialer),
            config,
            shutdown,
        })
    }

    /// Context backed by an in-memory cluster
    pub fn in_memory(
        cluster: Arc<MemoryCluster>,
        dialer: Arc<dyn AdapterDialer>,
        config: OperatorConfig,
    ) -> Self {
        Self {
            config,
            backups: cluster.clone(),
            restores: cluster.clone(),
            registry: cluster.clone(),
            units: cluster,
            dialer,
            shutdown: CancellationToken::new(),
        }
    }
}

/// An intent kind the controllers know how to drive
pub trait Reconciled: Intent {
    /// Reconcile the intent `name`
    fn reconcile<'a>(name: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<Action>>;

    /// Whether a registry change should enqueue this intent again
    fn wants_registry_changes(&self) -> bool;
}

impl Reconciled for DatabaseBackup {
    fn reconcile<'a>(name: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<Action>> {
        Box::pin(backup_reconciler::reconcile(name, ctx))
    }

    fn wants_registry_changes(&self) -> bool {
        true
    }
}

impl Reconciled for DatabaseRestore {
    fn reconcile<'a>(name: &'a str, ctx: &'a Context) -> BoxFuture<'a, Result<Action>> {
        Box::pin(restore_reconciler::reconcile(name, ctx))
    }

    // Restores that already ran are done for good
    fn wants_registry_changes(&self) -> bool {
        self.status.is_none()
    }
}

/// Run the DatabaseBackup controller
pub async fn run_backup_controller(client: Client, context: Arc<Context>) {
    intent_controller::run::<DatabaseBackup>(client, context).await
}

/// Run the DatabaseRestore controller
pub async fn run_restore_controller(client: Client, context: Arc<Context>) {
    intent_controller::run::<DatabaseRestore>(client, context).await
}

/// Requeue policy shared by the controllers.
///
/// Configuration errors wait for the intent (or the registry) to change;
/// transport failures and conflicts come back quickly.
pub fn requeue_policy(error: &Error) -> Action {
    if error.is_configuration() {
        Action::await_change()
    } else if error.is_retryable() {
        Action::requeue(RETRY_AFTER)
    } else {
        Action::requeue(BACKOFF_AFTER)
    }
}
