//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use db_backup_operator::cluster::MemoryCluster;
use db_backup_operator::config::OperatorConfig;
use db_backup_operator::controllers::Context;
use db_backup_operator::crd::{
    DatabaseBackup, DatabaseBackupSpec, DatabaseRestore, DatabaseRestoreSpec, DatabaseSpec,
    ObjectStorageSpec,
};
use db_backup_operator::delegation::{
    BackupRequest, BackupResponse, EngineAdapter, LocalDialer, RestoreRequest, RestoreResponse,
    UpdateRequest, UpdateResponse,
};
use db_backup_operator::registry::AdapterRegistry;
use db_backup_operator::scheduler::{EngineKind, EngineProfile, Scheduler};
use db_backup_operator::Result;

pub const ADAPTER_ADDR: &str = "pg-adapter:50051";
pub const SYSTEM_NAMESPACE: &str = "backups";

pub fn database(engine: &str) -> DatabaseSpec {
    DatabaseSpec {
        uri: "pg.default.svc".to_string(),
        port: 5432,
        user: "postgres".to_string(),
        password: "secret".to_string(),
        name: "db1".to_string(),
        engine_type: engine.to_string(),
    }
}

pub fn storage() -> ObjectStorageSpec {
    ObjectStorageSpec {
        endpoint: "http://minio:9000".to_string(),
        access_key: "access".to_string(),
        secret_key: "secret".to_string(),
        bucket: "backups".to_string(),
    }
}

pub fn backup(name: &str, engine: &str, schedule: &str) -> DatabaseBackup {
    DatabaseBackup::new(
        name,
        DatabaseBackupSpec {
            database: database(engine),
            storage: storage(),
            schedule: schedule.to_string(),
            retention_count: 3,
            storage_class: None,
        },
    )
}

pub fn restore(name: &str, engine: &str, revision: &str) -> DatabaseRestore {
    DatabaseRestore::new(
        name,
        DatabaseRestoreSpec {
            database: database(engine),
            storage: storage(),
            revision: revision.to_string(),
        },
    )
}

/// Adapter that counts calls before passing them on
pub struct CountingAdapter<A> {
    inner: A,
    calls: AtomicUsize,
}

impl<A> CountingAdapter<A> {
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<A: EngineAdapter> EngineAdapter for CountingAdapter<A> {
    async fn backup(&self, request: &BackupRequest) -> Result<BackupResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.backup(request).await
    }

    async fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(request).await
    }

    async fn restore(&self, request: &RestoreRequest) -> Result<RestoreResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.restore(request).await
    }
}

/// Adapter that never answers in time
pub struct StalledAdapter;

#[async_trait]
impl EngineAdapter for StalledAdapter {
    async fn backup(&self, _request: &BackupRequest) -> Result<BackupResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("stalled adapter answered")
    }

    async fn update(&self, _request: &UpdateRequest) -> Result<UpdateResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("stalled adapter answered")
    }

    async fn restore(&self, _request: &RestoreRequest) -> Result<RestoreResponse> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        unreachable!("stalled adapter answered")
    }
}

pub fn postgres_scheduler(cluster: &Arc<MemoryCluster>) -> Scheduler {
    Scheduler::new(
        cluster.clone(),
        EngineProfile::new(EngineKind::Postgres),
        SYSTEM_NAMESPACE,
    )
}

/// A cluster with the postgres adapter registered and reachable in-process
pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub adapter: Arc<CountingAdapter<Scheduler>>,
    pub ctx: Context,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(OperatorConfig::default()).await
    }

    pub async fn with_config(config: OperatorConfig) -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        cluster
            .set_registry(AdapterRegistry::new([("postgres", ADAPTER_ADDR)]))
            .await;
        let adapter = Arc::new(CountingAdapter::new(postgres_scheduler(&cluster)));
        let dialer = LocalDialer::new().with_adapter(ADAPTER_ADDR, adapter.clone());
        let ctx = Context::in_memory(cluster.clone(), Arc::new(dialer), config);
        Self {
            cluster,
            adapter,
            ctx,
        }
    }
}
