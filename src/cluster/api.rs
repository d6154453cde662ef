//! Kubernetes API backed stores

use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use kube::{api::PostParams, Api, Client, ResourceExt};

use crate::crd::{Intent, UnitHandle};
use crate::error::{Error, Result};

use super::{ExecutionUnit, IntentStore, UnitKind, UnitStore};

/// Map a 409 from the API server to the operator's sentinel
fn on_conflict(err: kube::Error, sentinel: impl FnOnce() -> Error) -> Error {
    match err {
        kube::Error::Api(api_err) if api_err.code == 409 => sentinel(),
        other => Error::Kube(other),
    }
}

/// Intent store over a cluster-scoped custom resource
pub struct KubeIntentStore<K> {
    api: Api<K>,
    _kind: PhantomData<K>,
}

impl<K: Intent> KubeIntentStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K: Intent> IntentStore<K> for KubeIntentStore<K> {
    async fn get(&self, name: &str) -> Result<Option<K>> {
        Ok(self.api.get_opt(name).await?)
    }

    async fn replace_status(&self, intent: &K) -> Result<K> {
        let name = intent.name_any();
        let body = serde_json::to_vec(intent)?;
        self.api
            .replace_status(&name, &PostParams::default(), body)
            .await
            .map_err(|e| on_conflict(e, || Error::Conflict(format!("{} {}", K::LABEL, name))))
    }
}

/// Unit store creating CronJobs and Jobs through the API server
#[derive(Clone)]
pub struct KubeUnitStore {
    client: Client,
}

impl KubeUnitStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UnitStore for KubeUnitStore {
    async fn get(&self, kind: UnitKind, handle: &UnitHandle) -> Result<Option<ExecutionUnit>> {
        let unit = match kind {
            UnitKind::Scheduled => {
                let api: Api<CronJob> = Api::namespaced(self.client.clone(), &handle.namespace);
                api.get_opt(&handle.name).await?.map(ExecutionUnit::Scheduled)
            }
            UnitKind::OneShot => {
                let api: Api<Job> = Api::namespaced(self.client.clone(), &handle.namespace);
                api.get_opt(&handle.name).await?.map(ExecutionUnit::OneShot)
            }
        };
        Ok(unit)
    }

    async fn create(&self, unit: &ExecutionUnit) -> Result<ExecutionUnit> {
        let handle = unit.handle();
        let already_exists = || Error::AlreadyExists(handle.to_string());
        let created = match unit {
            ExecutionUnit::Scheduled(cron_job) => {
                let api: Api<CronJob> = Api::namespaced(self.client.clone(), &handle.namespace);
                api.create(&PostParams::default(), cron_job)
                    .await
                    .map(ExecutionUnit::Scheduled)
            }
            ExecutionUnit::OneShot(job) => {
                let api: Api<Job> = Api::namespaced(self.client.clone(), &handle.namespace);
                api.create(&PostParams::default(), job)
                    .await
                    .map(ExecutionUnit::OneShot)
            }
        };
        created.map_err(|e| on_conflict(e, already_exists))
    }

    async fn replace(&self, unit: &ExecutionUnit) -> Result<ExecutionUnit> {
        let handle = unit.handle();
        let replaced = match unit {
            ExecutionUnit::Scheduled(cron_job) => {
                let api: Api<CronJob> = Api::namespaced(self.client.clone(), &handle.namespace);
                api.replace(&handle.name, &PostParams::default(), cron_job)
                    .await
                    .map(ExecutionUnit::Scheduled)
            }
            ExecutionUnit::OneShot(job) => {
                let api: Api<Job> = Api::namespaced(self.client.clone(), &handle.namespace);
                api.replace(&handle.name, &PostParams::default(), job)
                    .await
                    .map(ExecutionUnit::OneShot)
            }
        };
        replaced.map_err(|e| match e {
            kube::Error::Api(api_err) if api_err.code == 404 => {
                Error::UnitNotFound(handle.to_string())
            }
            other => on_conflict(other, || Error::Conflict(handle.to_string())),
        })
    }
}
