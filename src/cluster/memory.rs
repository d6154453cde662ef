//! In-memory cluster
//!
//! Implements every store trait over plain maps guarded by a
//! `tokio::sync::RwLock`. It mimics the API server semantics the reconcilers
//! rely on: uids, resourceVersion optimistic concurrency, "already exists" on
//! duplicate names, and owner-reference garbage collection through an
//! explicit [`MemoryCluster::collect_garbage`] pass.
//!
//! Not durable; state is lost with the process.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::ResourceExt;
use tokio::sync::RwLock;

use crate::crd::{DatabaseBackup, DatabaseBackupSpec, DatabaseRestore, Intent, UnitHandle};
use crate::error::{Error, Result};
use crate::registry::{AdapterRegistry, RegistrySource};

use super::ownership;
use super::{ExecutionUnit, IntentStore, UnitKind, UnitStore};

#[derive(Default)]
struct State {
    version: u64,
    registry: Option<AdapterRegistry>,
    backups: BTreeMap<String, DatabaseBackup>,
    restores: BTreeMap<String, DatabaseRestore>,
    cron_jobs: BTreeMap<UnitHandle, CronJob>,
    jobs: BTreeMap<UnitHandle, Job>,
    failing_unit_replaces: usize,
    status_writes_before_failure: usize,
    failing_status_writes: usize,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn next_uid(&mut self) -> String {
        format!("uid-{}", self.next_version())
    }

    /// Whether the next status write is rejected
    fn reject_status_write(&mut self) -> bool {
        if self.failing_status_writes == 0 {
            return false;
        }
        if self.status_writes_before_failure > 0 {
            self.status_writes_before_failure -= 1;
            return false;
        }
        self.failing_status_writes -= 1;
        true
    }

    fn live_uids(&self) -> HashSet<String> {
        let intents = self
            .backups
            .values()
            .filter_map(|b| b.metadata.uid.clone())
            .chain(self.restores.values().filter_map(|r| r.metadata.uid.clone()));
        let units = self
            .cron_jobs
            .values()
            .filter_map(|c| c.metadata.uid.clone())
            .chain(self.jobs.values().filter_map(|j| j.metadata.uid.clone()));
        intents.chain(units).collect()
    }
}

/// In-memory stand-in for the API server
#[derive(Default)]
pub struct MemoryCluster {
    state: RwLock<State>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the adapter registry
    pub async fn set_registry(&self, registry: AdapterRegistry) {
        self.state.write().await.registry = Some(registry);
    }

    /// Create a backup intent, assigning uid and resourceVersion
    pub async fn insert_backup(&self, mut backup: DatabaseBackup) -> DatabaseBackup {
        let mut state = self.state.write().await;
        backup.metadata.uid = Some(state.next_uid());
        backup.metadata.resource_version = Some(state.next_version());
        backup.metadata.generation = Some(1);
        state.backups.insert(backup.name_any(), backup.clone());
        backup
    }

    /// Mutate a backup's spec the way a user edit would
    pub async fn edit_backup(
        &self,
        name: &str,
        edit: impl FnOnce(&mut DatabaseBackupSpec),
    ) -> Result<DatabaseBackup> {
        let mut state = self.state.write().await;
        let version = state.next_version();
        let backup = state
            .backups
            .get_mut(name)
            .ok_or_else(|| Error::validation(format!("DatabaseBackup {} not found", name)))?;
        edit(&mut backup.spec);
        backup.metadata.generation = Some(backup.metadata.generation.unwrap_or(0) + 1);
        backup.metadata.resource_version = Some(version);
        Ok(backup.clone())
    }

    pub async fn delete_backup(&self, name: &str) -> Option<DatabaseBackup> {
        self.state.write().await.backups.remove(name)
    }

    pub async fn backup(&self, name: &str) -> Option<DatabaseBackup> {
        self.state.read().await.backups.get(name).cloned()
    }

    /// Create a restore intent, assigning uid and resourceVersion
    pub async fn insert_restore(&self, mut restore: DatabaseRestore) -> DatabaseRestore {
        let mut state = self.state.write().await;
        restore.metadata.uid = Some(state.next_uid());
        restore.metadata.resource_version = Some(state.next_version());
        restore.metadata.generation = Some(1);
        state.restores.insert(restore.name_any(), restore.clone());
        restore
    }

    pub async fn delete_restore(&self, name: &str) -> Option<DatabaseRestore> {
        self.state.write().await.restores.remove(name)
    }

    pub async fn restore(&self, name: &str) -> Option<DatabaseRestore> {
        self.state.read().await.restores.get(name).cloned()
    }

    pub async fn cron_jobs(&self) -> Vec<CronJob> {
        self.state.read().await.cron_jobs.values().cloned().collect()
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.state.read().await.jobs.values().cloned().collect()
    }

    /// Make the next `count` unit replacements fail with a conflict
    pub async fn fail_unit_replaces(&self, count: usize) {
        self.state.write().await.failing_unit_replaces = count;
    }

    /// Let `after` status writes through, then reject the next `count`
    /// with a conflict
    pub async fn fail_status_writes(&self, after: usize, count: usize) {
        let mut state = self.state.write().await;
        state.status_writes_before_failure = after;
        state.failing_status_writes = count;
    }

    /// Remove every unit whose recorded owners no longer exist, repeating
    /// until chains of dependents are gone. Returns the number removed.
    pub async fn collect_garbage(&self) -> usize {
        let mut state = self.state.write().await;
        let mut removed = 0;
        loop {
            let live = state.live_uids();
            let before = state.cron_jobs.len() + state.jobs.len();
            state
                .cron_jobs
                .retain(|_, cron_job| !ownership::is_orphaned(&cron_job.metadata, &live));
            state
                .jobs
                .retain(|_, job| !ownership::is_orphaned(&job.metadata, &live));
            let swept = before - (state.cron_jobs.len() + state.jobs.len());
            if swept == 0 {
                return removed;
            }
            removed += swept;
        }
    }
}

#[async_trait]
impl RegistrySource for MemoryCluster {
    async fn load(&self) -> Result<AdapterRegistry> {
        self.state
            .read()
            .await
            .registry
            .clone()
            .ok_or_else(|| Error::config("adapter registry not found"))
    }
}

macro_rules! memory_intent_store {
    ($kind:ty, $table:ident) => {
        #[async_trait]
        impl IntentStore<$kind> for MemoryCluster {
            async fn get(&self, name: &str) -> Result<Option<$kind>> {
                Ok(self.state.read().await.$table.get(name).cloned())
            }

            async fn replace_status(&self, intent: &$kind) -> Result<$kind> {
                let mut state = self.state.write().await;
                let name = intent.name_any();
                if state.reject_status_write() {
                    return Err(Error::Conflict(format!(
                        "{} {} status write rejected",
                        <$kind as Intent>::LABEL,
                        name
                    )));
                }
                let version = state.next_version();
                let stored = state.$table.get_mut(&name).ok_or_else(|| {
                    Error::Conflict(format!("{} {} no longer exists", <$kind as Intent>::LABEL, name))
                })?;
                if stored.metadata.resource_version != intent.metadata.resource_version {
                    return Err(Error::Conflict(format!(
                        "{} {} was modified",
                        <$kind as Intent>::LABEL,
                        name
                    )));
                }
                stored.status = intent.status.clone();
                stored.metadata.resource_version = Some(version);
                Ok(stored.clone())
            }
        }
    };
}

memory_intent_store!(DatabaseBackup, backups);
memory_intent_store!(DatabaseRestore, restores);

#[async_trait]
impl UnitStore for MemoryCluster {
    async fn get(&self, kind: UnitKind, handle: &UnitHandle) -> Result<Option<ExecutionUnit>> {
        let state = self.state.read().await;
        let unit = match kind {
            UnitKind::Scheduled => state.cron_jobs.get(handle).cloned().map(ExecutionUnit::Scheduled),
            UnitKind::OneShot => state.jobs.get(handle).cloned().map(ExecutionUnit::OneShot),
        };
        Ok(unit)
    }

    async fn create(&self, unit: &ExecutionUnit) -> Result<ExecutionUnit> {
        let mut state = self.state.write().await;
        let handle = unit.handle();
        let taken = match unit.kind() {
            UnitKind::Scheduled => state.cron_jobs.contains_key(&handle),
            UnitKind::OneShot => state.jobs.contains_key(&handle),
        };
        if taken {
            return Err(Error::AlreadyExists(handle.to_string()));
        }

        let mut created = unit.clone();
        let uid = state.next_uid();
        let version = state.next_version();
        let meta = created.metadata_mut();
        meta.uid = Some(uid);
        meta.resource_version = Some(version);
        match &created {
            ExecutionUnit::Scheduled(cron_job) => {
                state.cron_jobs.insert(handle, cron_job.clone());
            }
            ExecutionUnit::OneShot(job) => {
                state.jobs.insert(handle, job.clone());
            }
        }
        Ok(created)
    }

    async fn replace(&self, unit: &ExecutionUnit) -> Result<ExecutionUnit> {
        let mut state = self.state.write().await;
        let handle = unit.handle();
        if state.failing_unit_replaces > 0 {
            state.failing_unit_replaces -= 1;
            return Err(Error::Conflict(handle.to_string()));
        }

        let stored = match unit.kind() {
            UnitKind::Scheduled => state.cron_jobs.get(&handle).map(|c| c.metadata.clone()),
            UnitKind::OneShot => state.jobs.get(&handle).map(|j| j.metadata.clone()),
        }
        .ok_or_else(|| Error::UnitNotFound(handle.to_string()))?;

        let incoming = unit.metadata();
        if incoming.resource_version.is_some() && incoming.resource_version != stored.resource_version {
            return Err(Error::Conflict(handle.to_string()));
        }

        let mut replaced = unit.clone();
        let version = state.next_version();
        let meta = replaced.metadata_mut();
        meta.uid = stored.uid;
        meta.resource_version = Some(version);
        match &replaced {
            ExecutionUnit::Scheduled(cron_job) => {
                state.cron_jobs.insert(handle, cron_job.clone());
            }
            ExecutionUnit::OneShot(job) => {
                state.jobs.insert(handle, job.clone());
            }
        }
        Ok(replaced)
    }
}
