//! Access to cluster state
//!
//! The reconcilers and adapters never talk to the API server directly. They
//! go through the store traits defined here, which have a kube-backed
//! implementation for production and an in-memory one for local runs and
//! tests.

mod api;
pub mod memory;
pub mod ownership;

pub use api::{KubeIntentStore, KubeUnitStore};
pub use memory::MemoryCluster;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::crd::{Intent, UnitHandle};
use crate::error::Result;

/// Kind of execution unit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Recurring unit (CronJob)
    Scheduled,
    /// Run-once unit (Job)
    OneShot,
}

/// A scheduled or one-shot execution unit
#[derive(Clone, Debug)]
pub enum ExecutionUnit {
    Scheduled(CronJob),
    OneShot(Job),
}

impl ExecutionUnit {
    pub fn kind(&self) -> UnitKind {
        match self {
            ExecutionUnit::Scheduled(_) => UnitKind::Scheduled,
            ExecutionUnit::OneShot(_) => UnitKind::OneShot,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            ExecutionUnit::Scheduled(cron_job) => &cron_job.metadata,
            ExecutionUnit::OneShot(job) => &job.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ExecutionUnit::Scheduled(cron_job) => &mut cron_job.metadata,
            ExecutionUnit::OneShot(job) => &mut job.metadata,
        }
    }

    pub fn handle(&self) -> UnitHandle {
        let meta = self.metadata();
        UnitHandle::new(
            meta.name.clone().unwrap_or_default(),
            meta.namespace.clone().unwrap_or_default(),
        )
    }

    pub fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref()
    }

    /// Cron schedule of a scheduled unit
    pub fn schedule(&self) -> Option<&str> {
        match self {
            ExecutionUnit::Scheduled(cron_job) => {
                cron_job.spec.as_ref().map(|spec| spec.schedule.as_str())
            }
            ExecutionUnit::OneShot(_) => None,
        }
    }
}

/// Read and status-write access to intents of one kind
#[async_trait]
pub trait IntentStore<K: Intent>: Send + Sync {
    /// Fetch the intent, `None` when it no longer exists
    async fn get(&self, name: &str) -> Result<Option<K>>;

    /// Persist the intent's status; fails with `Conflict` when the
    /// resourceVersion is stale
    async fn replace_status(&self, intent: &K) -> Result<K>;
}

/// Execution unit access
#[async_trait]
pub trait UnitStore: Send + Sync {
    /// Fetch a unit, `None` when absent
    async fn get(&self, kind: UnitKind, handle: &UnitHandle) -> Result<Option<ExecutionUnit>>;

    /// Create a unit; fails with `AlreadyExists` when the name is taken
    async fn create(&self, unit: &ExecutionUnit) -> Result<ExecutionUnit>;

    /// Replace a unit; fails with `Conflict` when the resourceVersion is stale
    async fn replace(&self, unit: &ExecutionUnit) -> Result<ExecutionUnit>;
}
