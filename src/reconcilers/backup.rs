//! DatabaseBackup reconciler
//!
//! Handles the business logic for backup intents including:
//! - Spec validation
//! - Delegating the scheduled unit to the engine adapter
//! - Ownership of the unit
//! - Status updates
//!
//! A `Success` intent only ever goes through `Update`; every other phase
//! (including an `InProgress` left behind by a crash) runs the `Backup` path,
//! which is safe to repeat because the adapter answers `Exists` for a unit it
//! already created. A unit that records a different owner is never taken
//! over; the intent fails instead.

use std::sync::Arc;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::cluster::UnitKind;
use crate::controllers::Context;
use crate::crd::{DatabaseBackup, Intent, LifecyclePhase, UnitHandle};
use crate::delegation::{BackupRequest, EngineAdapter, UnitStatus, UpdateRequest};
use crate::error::{Error, Result};

use super::status::{self, fail};
use super::{
    check_owner, claim_unit, delegate, parse_schedule, resolve_adapter, validate_database,
    validate_storage,
};

/// Validate the DatabaseBackup spec
pub fn validate(backup: &DatabaseBackup) -> Result<()> {
    validate_database(&backup.spec.database)?;
    validate_storage(&backup.spec.storage)?;

    if backup.spec.retention_count == 0 {
        return Err(Error::validation("retentionCount must be at least 1"));
    }

    parse_schedule(&backup.spec.schedule)?;
    Ok(())
}

/// Reconcile the DatabaseBackup `name`
pub async fn reconcile(name: &str, ctx: &Context) -> Result<Action> {
    let store = ctx.backups.as_ref();

    let Some(backup) = store.get(name).await? else {
        debug!(name = %name, "DatabaseBackup is gone, nothing to do");
        return Ok(Action::await_change());
    };

    if let Err(e) = validate(&backup) {
        return Err(fail(store, name, e).await);
    }

    let adapter = match resolve_adapter(ctx, backup.engine_type()).await {
        Ok(adapter) => adapter,
        Err(e @ Error::Kube(_)) => return Err(e),
        Err(e) => return Err(fail(store, name, e).await),
    };

    let recorded_unit = backup
        .intent_status()
        .and_then(|status| status.execution_unit.clone());
    if let (Some(LifecyclePhase::Success), Some(handle)) = (backup.phase(), recorded_unit) {
        return refresh(backup, handle, adapter, ctx).await;
    }

    schedule(backup, adapter, ctx).await
}

/// Create (or find) the scheduled unit and take ownership of it
async fn schedule(
    backup: DatabaseBackup,
    adapter: Arc<dyn EngineAdapter>,
    ctx: &Context,
) -> Result<Action> {
    let store = ctx.backups.as_ref();
    let name = backup.name_any();

    let backup = match status::write(store, backup, |s| {
        status::set_phase(s, LifecyclePhase::InProgress, "Scheduling backup unit", Utc::now())
    })
    .await
    {
        Ok(backup) => backup,
        Err(e) => return Err(fail(store, &name, e).await),
    };

    let request = BackupRequest::for_intent(&backup, &ctx.config.core_addr);
    let response = match delegate(ctx, "Backup", adapter.backup(&request)).await {
        Ok(response) => response,
        Err(e) => return Err(fail(store, &name, e).await),
    };

    let handle = response.handle();
    match response.status {
        UnitStatus::Created => {
            info!(name = %name, unit = %handle, "Backup unit created");
            if let Err(e) = claim_unit(ctx, &backup, UnitKind::Scheduled, &handle).await {
                return Err(fail(store, &name, e).await);
            }
        }
        UnitStatus::Exists => {
            info!(name = %name, unit = %handle, "Backup unit already exists");
            // A crash between creation and ownership leaves an unowned unit
            match claim_unit(ctx, &backup, UnitKind::Scheduled, &handle).await {
                Ok(_) => {}
                Err(e @ Error::ForeignOwner(_)) => return Err(fail(store, &name, e).await),
                Err(e) => {
                    warn!(name = %name, unit = %handle, error = %e, "Could not adopt existing backup unit")
                }
            }
        }
        UnitStatus::Failed => {
            let reason = response
                .message
                .unwrap_or_else(|| "adapter failed to create the backup unit".to_string());
            return Err(fail(store, &name, Error::delegation(reason)).await);
        }
    }

    let message = format!("Backup unit {} scheduled", handle);
    let now = Utc::now();
    if let Err(e) = status::write(store, backup, |s| status::set_success(s, handle, &message, now)).await {
        return Err(fail(store, &name, e).await);
    }

    Ok(Action::await_change())
}

/// Push the current desired state into the existing unit
async fn refresh(
    backup: DatabaseBackup,
    handle: UnitHandle,
    adapter: Arc<dyn EngineAdapter>,
    ctx: &Context,
) -> Result<Action> {
    let name = backup.name_any();
    match check_owner(ctx, &backup, UnitKind::Scheduled, &handle).await {
        Ok(()) => {}
        Err(e @ Error::ForeignOwner(_)) => {
            return Err(status::revoke(ctx.backups.as_ref(), &name, e).await)
        }
        Err(e) => return Err(fail(ctx.backups.as_ref(), &name, e).await),
    }

    let request = UpdateRequest::new(BackupRequest::for_intent(&backup, &ctx.config.core_addr), &handle);

    match delegate(ctx, "Update", adapter.update(&request)).await {
        Ok(response) if response.ack => {
            debug!(name = %name, unit = %handle, "Backup unit refreshed");
            Ok(Action::await_change())
        }
        Ok(_) => Err(fail(
            ctx.backups.as_ref(),
            &name,
            Error::delegation(format!("adapter did not acknowledge update of {}", handle)),
        )
        .await),
        Err(e) => Err(fail(ctx.backups.as_ref(), &name, e).await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DatabaseBackupSpec, DatabaseSpec, ObjectStorageSpec};

    fn backup() -> DatabaseBackup {
        DatabaseBackup::new(
            "pg-db1",
            DatabaseBackupSpec {
                database: DatabaseSpec {
                    uri: "pg.default.svc".to_string(),
                    port: 5432,
                    user: "postgres".to_string(),
                    password: "secret".to_string(),
                    name: "db1".to_string(),
                    engine_type: "postgres".to_string(),
                },
                storage: ObjectStorageSpec {
                    endpoint: "http://minio:9000".to_string(),
                    access_key: "access".to_string(),
                    secret_key: "secret".to_string(),
                    bucket: "backups".to_string(),
                },
                schedule: "0 0 * * *".to_string(),
                retention_count: 3,
                storage_class: None,
            },
        )
    }

    #[test]
    fn valid_backup_passes() {
        assert!(validate(&backup()).is_ok());
    }

    #[test]
    fn zero_retention_is_invalid() {
        let mut b = backup();
        b.spec.retention_count = 0;
        assert!(matches!(validate(&b), Err(Error::Validation(_))));
    }

    #[test]
    fn bad_schedule_is_invalid() {
        let mut b = backup();
        b.spec.schedule = "every day".to_string();
        assert!(validate(&b).unwrap_err().to_string().contains("cron"));
    }

    #[test]
    fn missing_bucket_is_invalid() {
        let mut b = backup();
        b.spec.storage.bucket = String::new();
        assert!(validate(&b).is_err());
    }
}
