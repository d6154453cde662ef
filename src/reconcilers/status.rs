//! Status transitions shared by both intent kinds

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::cluster::IntentStore;
use crate::crd::{Condition, Intent, IntentStatus, LifecyclePhase, UnitHandle};
use crate::error::{Error, Result};

const READY_CONDITION: &str = "Ready";

fn ready_status(phase: LifecyclePhase) -> &'static str {
    match phase {
        LifecyclePhase::Success => "True",
        LifecyclePhase::Failure => "False",
        LifecyclePhase::Pending | LifecyclePhase::InProgress => "Unknown",
    }
}

/// Move `status` to `phase` with `message`. The Ready condition only gets a
/// new transition time when the phase actually changes.
pub fn set_phase(status: &mut IntentStatus, phase: LifecyclePhase, message: &str, now: DateTime<Utc>) {
    let phase_changed = status.phase != Some(phase);
    status.phase = Some(phase);
    status.message = Some(message.to_string());

    let existing = status
        .conditions
        .iter()
        .position(|condition| condition.type_ == READY_CONDITION);
    let last_transition_time = match existing {
        Some(index) if !phase_changed => status.conditions[index].last_transition_time,
        _ => now,
    };
    let condition = Condition {
        type_: READY_CONDITION.to_string(),
        status: ready_status(phase).to_string(),
        last_transition_time,
        reason: Some(phase.to_string()),
        message: Some(message.to_string()),
    };
    match existing {
        Some(index) => status.conditions[index] = condition,
        None => status.conditions.push(condition),
    }
}

/// Terminal success: phase, unit handle and run time in one transition
pub fn set_success(status: &mut IntentStatus, handle: UnitHandle, message: &str, now: DateTime<Utc>) {
    set_phase(status, LifecyclePhase::Success, message, now);
    status.execution_unit = Some(handle);
    status.last_run_time = Some(now);
}

/// Apply `change` to the intent's status and persist it. Nothing is written
/// when the change leaves the status as it was.
pub async fn write<K: Intent>(
    store: &dyn IntentStore<K>,
    mut intent: K,
    change: impl FnOnce(&mut IntentStatus),
) -> Result<K> {
    let before = intent.intent_status().cloned();
    let status = intent.intent_status_mut().get_or_insert_with(IntentStatus::default);
    change(status);
    if intent.intent_status() == before.as_ref() {
        return Ok(intent);
    }
    store.replace_status(&intent).await
}

/// Best-effort `Failure` write against a fresh copy of the intent.
///
/// A `Success` intent keeps its phase. Returns the error of the write
/// itself, if any.
pub async fn mark_failed<K: Intent>(store: &dyn IntentStore<K>, name: &str, reason: &str) -> Result<()> {
    record_failure(store, name, reason, false).await
}

async fn record_failure<K: Intent>(
    store: &dyn IntentStore<K>,
    name: &str,
    reason: &str,
    revoke: bool,
) -> Result<()> {
    let Some(fresh) = store.get(name).await? else {
        return Ok(());
    };
    if !revoke && fresh.phase() == Some(LifecyclePhase::Success) {
        info!(kind = K::LABEL, name = %name, reason = %reason, "Keeping Success despite failure");
        return Ok(());
    }
    let now = Utc::now();
    write(store, fresh, |status| {
        set_phase(status, LifecyclePhase::Failure, reason, now);
        if revoke {
            status.execution_unit = None;
        }
    })
    .await?;
    Ok(())
}

/// Record `err` on the intent and hand it back for the caller to surface.
/// When the failure cannot be recorded either, the write error is returned
/// instead so the work queue re-delivers.
pub async fn fail<K: Intent>(store: &dyn IntentStore<K>, name: &str, err: Error) -> Error {
    escalate(store, name, err, false).await
}

/// Like [`fail`], but also for a `Success` intent, whose recorded unit is
/// dropped. Used when the unit turns out to belong to someone else.
pub async fn revoke<K: Intent>(store: &dyn IntentStore<K>, name: &str, err: Error) -> Error {
    escalate(store, name, err, true).await
}

async fn escalate<K: Intent>(store: &dyn IntentStore<K>, name: &str, err: Error, revoke: bool) -> Error {
    warn!(kind = K::LABEL, name = %name, error = %err, "Marking intent as failed");
    match record_failure(store, name, &err.to_string(), revoke).await {
        Ok(()) => err,
        Err(write_err) => {
            warn!(
                kind = K::LABEL,
                name = %name,
                error = %write_err,
                "Failed to record failure"
            );
            write_err
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn transition_time_moves_only_on_phase_change() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(30);
        let mut status = IntentStatus::default();

        set_phase(&mut status, LifecyclePhase::Failure, "first", t0);
        set_phase(&mut status, LifecyclePhase::Failure, "second", t1);
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].last_transition_time, t0);
        assert_eq!(status.message.as_deref(), Some("second"));

        set_phase(&mut status, LifecyclePhase::InProgress, "retrying", t1);
        assert_eq!(status.conditions[0].last_transition_time, t1);
        assert_eq!(status.conditions[0].status, "Unknown");
    }

    #[test]
    fn success_records_handle_and_run_time() {
        let now = Utc::now();
        let mut status = IntentStatus::default();
        set_success(&mut status, UnitHandle::new("backup-pg-db1", "ns"), "done", now);
        assert_eq!(status.phase, Some(LifecyclePhase::Success));
        assert_eq!(status.last_run_time, Some(now));
        assert_eq!(status.execution_unit, Some(UnitHandle::new("backup-pg-db1", "ns")));
        assert_eq!(status.conditions[0].status, "True");
    }
}
