//! Reconcilers for the backup intents
//!
//! This module contains the business logic for reconciling each CRD type.
//! Reconcilers are responsible for:
//! - Validating CRD specs
//! - Delegating unit creation to the engine adapter
//! - Recording ownership and status

pub mod backup;
pub mod restore;
pub mod status;

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use cron::Schedule;
use kube::Resource;
use tracing::{debug, info};

use crate::cluster::{ownership, UnitKind};
use crate::controllers::Context;
use crate::crd::{DatabaseSpec, Intent, ObjectStorageSpec, UnitHandle};
use crate::delegation::{self, EngineAdapter};
use crate::error::{Error, Result};
use crate::metrics;

/// Validate the database connection descriptor
pub fn validate_database(database: &DatabaseSpec) -> Result<()> {
    if database.engine_type.trim().is_empty() {
        return Err(Error::validation("database.engineType must be set"));
    }
    if database.uri.trim().is_empty() {
        return Err(Error::validation("database.uri must be set"));
    }
    if database.name.trim().is_empty() {
        return Err(Error::validation("database.name must be set"));
    }
    if database.port == 0 {
        return Err(Error::validation("database.port must be between 1 and 65535"));
    }
    Ok(())
}

/// Validate the object storage descriptor
pub fn validate_storage(storage: &ObjectStorageSpec) -> Result<()> {
    if storage.endpoint.trim().is_empty() {
        return Err(Error::validation("storage.endpoint must be set"));
    }
    if storage.bucket.trim().is_empty() {
        return Err(Error::validation("storage.bucket must be set"));
    }
    Ok(())
}

/// Parse a CronJob schedule.
///
/// CronJobs use five fields with Sunday as 0 while the `cron` crate wants a
/// leading seconds field and numbers weekdays from 1 (Sunday). Macros such
/// as `@daily` are passed through.
pub fn parse_schedule(schedule: &str) -> Result<Schedule> {
    let trimmed = schedule.trim();
    let expression = if trimmed.starts_with('@') {
        trimmed.to_string()
    } else {
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(Error::validation(format!(
                "Invalid cron schedule '{}': expected 5 fields",
                schedule
            )));
        }
        format!(
            "0 {} {} {} {} {}",
            fields[0],
            fields[1],
            fields[2],
            fields[3],
            shift_weekdays(fields[4])
        )
    };

    Schedule::from_str(&expression)
        .map_err(|e| Error::validation(format!("Invalid cron schedule '{}': {}", schedule, e)))
}

/// Renumber weekday values from 0-based to 1-based, leaving names,
/// wildcards and step sizes alone
fn shift_weekdays(field: &str) -> String {
    field
        .split(',')
        .map(shift_weekday_part)
        .collect::<Vec<_>>()
        .join(",")
}

fn shift_weekday_part(part: &str) -> String {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, Some(step)),
        None => (part, None),
    };

    // A range ending on 7 (Sunday) would wrap once shifted, so list its days
    if let Some((start, "7")) = range.split_once('-') {
        if let Some(days) = list_weekdays(start, step) {
            return days;
        }
    }

    let range = range
        .split('-')
        .map(|value| match value.parse::<u8>() {
            Ok(day) if day <= 7 => ((day % 7) + 1).to_string(),
            _ => value.to_string(),
        })
        .collect::<Vec<_>>()
        .join("-");
    match step {
        Some(step) => format!("{}/{}", range, step),
        None => range,
    }
}

/// Shifted days of `start-7` with an optional step, `None` if not numeric
fn list_weekdays(start: &str, step: Option<&str>) -> Option<String> {
    let start = start.parse::<u8>().ok().filter(|day| *day <= 7)?;
    let step = match step {
        Some(step) => step.parse::<usize>().ok().filter(|step| *step > 0)?,
        None => 1,
    };
    let mut days: Vec<u8> = (start..=7).step_by(step).map(|day| (day % 7) + 1).collect();
    days.sort_unstable();
    days.dedup();
    Some(
        days.iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Load the registry fresh and dial the adapter serving `engine`
pub async fn resolve_adapter(ctx: &Context, engine: &str) -> Result<Arc<dyn EngineAdapter>> {
    let registry = ctx.registry.load().await?;
    let address = registry.resolve(engine)?;
    debug!(engine = %engine, address = %address, "Resolved adapter");
    ctx.dialer.dial(address)
}

/// Run one adapter call under the configured timeout and the operator's
/// shutdown token, recording its outcome
pub async fn delegate<T, F>(ctx: &Context, method: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let _timer = metrics::DELEGATION_DURATION
        .with_label_values(&[method])
        .start_timer();
    let cancel = ctx.shutdown.child_token();
    let result = delegation::call(method, ctx.config.adapter_timeout, &cancel, call).await;

    let outcome = match &result {
        Ok(_) => "ok",
        Err(Error::Timeout(_)) => "timeout",
        Err(Error::Cancelled(_)) => "cancelled",
        Err(_) => "error",
    };
    metrics::DELEGATIONS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();
    result
}

/// Make `intent` the owner of the unit at `handle`.
///
/// An unowned unit is adopted. A unit that already records a different
/// owner is refused with `ForeignOwner`, since two intents resolving to the
/// same unit would otherwise overwrite each other's schedule. Returns
/// whether the unit was changed.
pub async fn claim_unit<K: Intent>(
    ctx: &Context,
    intent: &K,
    kind: UnitKind,
    handle: &UnitHandle,
) -> Result<bool> {
    let owner = ownership::owner_reference(intent)
        .ok_or_else(|| Error::validation(format!("{} has no uid yet", K::LABEL)))?;
    let mut unit = ctx
        .units
        .get(kind, handle)
        .await?
        .ok_or_else(|| Error::UnitNotFound(handle.to_string()))?;

    if ownership::is_owned_by(unit.metadata(), &owner.uid) {
        return Ok(false);
    }
    if ownership::has_owner(unit.metadata()) {
        return Err(Error::ForeignOwner(handle.to_string()));
    }
    ownership::attach(unit.metadata_mut(), owner);
    ctx.units.replace(&unit).await?;
    info!(kind = K::LABEL, unit = %handle, "Attached owner reference");
    Ok(true)
}

/// Refuse a unit that records an owner other than `intent`. A unit that is
/// missing or unowned passes.
pub async fn check_owner<K: Intent>(
    ctx: &Context,
    intent: &K,
    kind: UnitKind,
    handle: &UnitHandle,
) -> Result<()> {
    let Some(unit) = ctx.units.get(kind, handle).await? else {
        return Ok(());
    };
    let uid = intent.meta().uid.as_deref().unwrap_or_default();
    if ownership::has_owner(unit.metadata()) && !ownership::is_owned_by(unit.metadata(), uid) {
        return Err(Error::ForeignOwner(handle.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike, Utc, Weekday};

    #[test]
    fn five_field_schedules_parse() {
        assert!(parse_schedule("0 0 * * *").is_ok());
        assert!(parse_schedule("*/15 2-4 * * 1-5").is_ok());
        assert!(parse_schedule("@daily").is_ok());
    }

    #[test]
    fn malformed_schedules_are_rejected() {
        assert!(parse_schedule("").is_err());
        assert!(parse_schedule("0 0 * *").is_err());
        assert!(parse_schedule("0 25 * * *").is_err());
    }

    #[test]
    fn sunday_zero_is_accepted() {
        assert_eq!(shift_weekdays("0"), "1");
        assert_eq!(shift_weekdays("1-5"), "2-6");
        assert_eq!(shift_weekdays("0,6"), "1,7");
        assert_eq!(shift_weekdays("*/2"), "*/2");
        assert_eq!(shift_weekdays("MON"), "MON");
        assert_eq!(shift_weekdays("1-7"), "1,2,3,4,5,6,7");
        assert_eq!(shift_weekdays("5-7"), "1,6,7");
        assert_eq!(shift_weekdays("0-7"), "1,2,3,4,5,6,7");
        assert_eq!(shift_weekdays("1-7/2"), "1,2,4,6");
        assert_eq!(shift_weekdays("1,5-7"), "2,1,6,7");

        assert!(parse_schedule("0 0 * * 1-7").is_ok());
        assert!(parse_schedule("0 0 * * 5-7").is_ok());
        assert!(parse_schedule("0 0 * * 0-6").is_ok());

        let next = parse_schedule("30 6 * * 0").unwrap().upcoming(Utc).next().unwrap();
        assert_eq!(next.weekday(), Weekday::Sun);
        assert_eq!((next.hour(), next.minute()), (6, 30));
    }

    #[test]
    fn range_through_sunday_keeps_its_days() {
        let days: Vec<Weekday> = parse_schedule("0 0 * * 5-7")
            .unwrap()
            .upcoming(Utc)
            .take(6)
            .map(|next| next.weekday())
            .collect();
        assert!(days.iter().all(|day| matches!(day, Weekday::Fri | Weekday::Sat | Weekday::Sun)));
        assert!(days.contains(&Weekday::Sun));
        assert!(days.contains(&Weekday::Fri));
    }
}
