//! Adapter scheduler
//!
//! Turns delegation calls into execution units for one database engine:
//! a CronJob per backed-up database (plus its retention companion) and a
//! Job per restore. Creation is idempotent by name: if a unit with the
//! derived name already exists the call answers `Exists` with its handle.

mod engine;
mod env;
pub mod workload;

pub use engine::{EngineKind, EngineProfile, DEFAULT_RETENTION_IMAGE};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::cluster::{ownership, ExecutionUnit, UnitKind, UnitStore};
use crate::crd::UnitHandle;
use crate::delegation::{
    BackupRequest, BackupResponse, EngineAdapter, RestoreRequest, RestoreResponse, UnitResponse,
    UpdateRequest, UpdateResponse,
};
use crate::error::{Error, Result};

/// Engine adapter backed by a unit store
pub struct Scheduler {
    units: Arc<dyn UnitStore>,
    profile: EngineProfile,
    namespace: String,
}

impl Scheduler {
    pub fn new(units: Arc<dyn UnitStore>, profile: EngineProfile, namespace: impl Into<String>) -> Self {
        Self {
            units,
            profile,
            namespace: namespace.into(),
        }
    }

    fn serves(&self, engine_type: &str) -> bool {
        EngineKind::from_tag(engine_type) == Some(self.profile.engine)
    }

    /// Create `unit` unless a unit with its name already exists
    async fn create_once(&self, unit: ExecutionUnit) -> (UnitResponse, Option<ExecutionUnit>) {
        let handle = unit.handle();

        match self.units.get(unit.kind(), &handle).await {
            Ok(Some(existing)) => {
                debug!(unit = %handle, "Execution unit already exists");
                return (UnitResponse::exists(existing.handle()), Some(existing));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(unit = %handle, error = %e, "Failed to look up execution unit");
                return (UnitResponse::failed(format!("failed to look up {}: {}", handle, e)), None);
            }
        }

        match self.units.create(&unit).await {
            Ok(created) => {
                info!(unit = %handle, "Created execution unit");
                (UnitResponse::created(created.handle()), Some(created))
            }
            Err(Error::AlreadyExists(_)) => {
                // Lost a race with a concurrent creation of the same name
                let existing = self.units.get(unit.kind(), &handle).await.ok().flatten();
                (UnitResponse::exists(handle), existing)
            }
            Err(e) => {
                warn!(unit = %handle, error = %e, "Failed to create execution unit");
                (UnitResponse::failed(format!("failed to create {}: {}", handle, e)), None)
            }
        }
    }

    /// Make sure the backup unit has its retention companion. Failures are
    /// logged only; the backup itself is unaffected.
    async fn ensure_retention(&self, backup_unit: &ExecutionUnit, req: &BackupRequest) {
        let ExecutionUnit::Scheduled(cron_job) = backup_unit else {
            return;
        };
        let Some(owner) = ownership::owner_reference(cron_job) else {
            warn!(unit = %backup_unit.handle(), "Backup unit has no uid, skipping retention unit");
            return;
        };

        let handle = backup_unit.handle();
        let retention = workload::retention_cron_job(
            &self.profile,
            &handle.name,
            &handle.namespace,
            req,
            owner,
        );
        let retention = ExecutionUnit::Scheduled(retention);
        let retention_handle = retention.handle();

        match self.units.get(UnitKind::Scheduled, &retention_handle).await {
            Ok(Some(_)) => {}
            Ok(None) => match self.units.create(&retention).await {
                Ok(_) => info!(unit = %retention_handle, "Created retention unit"),
                Err(Error::AlreadyExists(_)) => {}
                Err(e) => warn!(unit = %retention_handle, error = %e, "Failed to create retention unit"),
            },
            Err(e) => warn!(unit = %retention_handle, error = %e, "Failed to look up retention unit"),
        }
    }

    /// Re-render an existing scheduled unit in place
    async fn rerender(&self, existing: ExecutionUnit, rendered: &ExecutionUnit) -> Result<ExecutionUnit> {
        let (ExecutionUnit::Scheduled(mut cron_job), ExecutionUnit::Scheduled(fresh)) =
            (existing, rendered)
        else {
            return Err(Error::validation("only scheduled units can be updated"));
        };
        workload::apply_rendered(&mut cron_job, fresh);
        self.units.replace(&ExecutionUnit::Scheduled(cron_job)).await
    }

    async fn update_retention(&self, backup_unit: &ExecutionUnit, req: &BackupRequest) {
        let handle = backup_unit.handle();
        let retention_handle = UnitHandle::new(
            workload::retention_unit_name(&handle.name),
            handle.namespace.clone(),
        );
        let existing = match self.units.get(UnitKind::Scheduled, &retention_handle).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return self.ensure_retention(backup_unit, req).await,
            Err(e) => {
                warn!(unit = %retention_handle, error = %e, "Failed to look up retention unit");
                return;
            }
        };

        let ExecutionUnit::Scheduled(backup_cron_job) = backup_unit else {
            return;
        };
        let Some(owner) = ownership::owner_reference(backup_cron_job) else {
            return;
        };
        let rendered = ExecutionUnit::Scheduled(workload::retention_cron_job(
            &self.profile,
            &handle.name,
            &handle.namespace,
            req,
            owner,
        ));
        if let Err(e) = self.rerender(existing, &rendered).await {
            warn!(unit = %retention_handle, error = %e, "Failed to update retention unit");
        }
    }
}

#[async_trait]
impl EngineAdapter for Scheduler {
    async fn backup(&self, req: &BackupRequest) -> Result<BackupResponse> {
        if !self.serves(&req.engine_type) {
            return Ok(UnitResponse::failed(format!(
                "adapter serves {}, not {}",
                self.profile.engine, req.engine_type
            )));
        }

        let unit = ExecutionUnit::Scheduled(workload::backup_cron_job(&self.profile, &self.namespace, req));
        let (response, unit) = self.create_once(unit).await;
        if let Some(unit) = unit {
            self.ensure_retention(&unit, req).await;
        }
        Ok(response)
    }

    async fn update(&self, req: &UpdateRequest) -> Result<UpdateResponse> {
        let handle = req.handle();
        let existing = self
            .units
            .get(UnitKind::Scheduled, &handle)
            .await?
            .ok_or_else(|| Error::UnitNotFound(handle.to_string()))?;

        let rendered = workload::backup_cron_job(&self.profile, &handle.namespace, &req.request);
        let updated = self.rerender(existing, &ExecutionUnit::Scheduled(rendered)).await?;
        info!(unit = %handle, schedule = %req.request.schedule, "Updated backup unit");

        self.update_retention(&updated, &req.request).await;
        Ok(UpdateResponse { ack: true })
    }

    async fn restore(&self, req: &RestoreRequest) -> Result<RestoreResponse> {
        if !self.serves(&req.engine_type) {
            return Ok(UnitResponse::failed(format!(
                "adapter serves {}, not {}",
                self.profile.engine, req.engine_type
            )));
        }

        let unit = ExecutionUnit::OneShot(workload::restore_job(&self.profile, &self.namespace, req));
        let (response, _) = self.create_once(unit).await;
        Ok(response)
    }
}
