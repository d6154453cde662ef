//! DatabaseRestore reconciler
//!
//! Restores run at most once: as soon as an intent carries any phase,
//! reconciliation leaves it alone, whatever that phase is.

use chrono::Utc;
use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::cluster::UnitKind;
use crate::controllers::Context;
use crate::crd::{DatabaseRestore, Intent, LifecyclePhase};
use crate::delegation::{RestoreRequest, Revision, UnitStatus};
use crate::error::{Error, Result};

use super::status::{self, fail};
use super::{claim_unit, delegate, resolve_adapter, validate_database, validate_storage};

/// Validate the DatabaseRestore spec
pub fn validate(restore: &DatabaseRestore) -> Result<()> {
    validate_database(&restore.spec.database)?;
    validate_storage(&restore.spec.storage)?;
    restore.spec.revision.parse::<Revision>()?;
    Ok(())
}

/// Reconcile the DatabaseRestore `name`
pub async fn reconcile(name: &str, ctx: &Context) -> Result<Action> {
    let store = ctx.restores.as_ref();

    let Some(restore) = store.get(name).await? else {
        debug!(name = %name, "DatabaseRestore is gone, nothing to do");
        return Ok(Action::await_change());
    };
    if let Some(phase) = restore.phase() {
        debug!(name = %name, phase = %phase, "Restore already handled");
        return Ok(Action::await_change());
    }

    if let Err(e) = validate(&restore) {
        return Err(fail(store, name, e).await);
    }

    let adapter = match resolve_adapter(ctx, restore.engine_type()).await {
        Ok(adapter) => adapter,
        Err(e @ Error::Kube(_)) => return Err(e),
        Err(e) => return Err(fail(store, name, e).await),
    };

    let restore = match status::write(store, restore, |s| {
        status::set_phase(s, LifecyclePhase::InProgress, "Scheduling restore unit", Utc::now())
    })
    .await
    {
        Ok(restore) => restore,
        Err(e) => return Err(fail(store, name, e).await),
    };

    let request = RestoreRequest::for_intent(&restore);
    let response = match delegate(ctx, "Restore", adapter.restore(&request)).await {
        Ok(response) => response,
        Err(e) => return Err(fail(store, name, e).await),
    };

    let handle = response.handle();
    match response.status {
        UnitStatus::Created => {
            info!(name = %name, unit = %handle, "Restore unit created");
            if let Err(e) = claim_unit(ctx, &restore, UnitKind::OneShot, &handle).await {
                return Err(fail(store, name, e).await);
            }
        }
        UnitStatus::Exists => {
            info!(name = %name, unit = %handle, "Restore unit already exists");
            match claim_unit(ctx, &restore, UnitKind::OneShot, &handle).await {
                Ok(_) => {}
                Err(e @ Error::ForeignOwner(_)) => return Err(fail(store, name, e).await),
                Err(e) => {
                    warn!(name = %name, unit = %handle, error = %e, "Could not adopt existing restore unit")
                }
            }
        }
        UnitStatus::Failed => {
            let reason = response
                .message
                .unwrap_or_else(|| "adapter failed to create the restore unit".to_string());
            return Err(fail(store, name, Error::delegation(reason)).await);
        }
    }

    let message = format!("Restore unit {} started", handle);
    let now = Utc::now();
    if let Err(e) = status::write(store, restore, |s| status::set_success(s, handle, &message, now)).await {
        return Err(fail(store, name, e).await);
    }

    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{DatabaseRestoreSpec, DatabaseSpec, ObjectStorageSpec};

    fn restore(revision: &str) -> DatabaseRestore {
        DatabaseRestore::new(
            "pg-db1-restore",
            DatabaseRestoreSpec {
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
                revision: revision.to_string(),
            },
        )
    }

    #[test]
    fn revision_is_required() {
        assert!(validate(&restore("0")).is_ok());
        assert!(validate(&restore("db1/2025-01-01.sql")).is_ok());
        assert!(matches!(validate(&restore(" ")), Err(Error::Validation(_))));
    }

    #[test]
    fn port_zero_is_invalid() {
        let mut r = restore("0");
        r.spec.database.port = 0;
        assert!(validate(&r).is_err());
    }
}
