//! DatabaseBackup Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DatabaseSpec, IntentStatus, ObjectStorageSpec};

/// DatabaseBackup resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "backup.oiler.dev",
    version = "v1alpha1",
    kind = "DatabaseBackup",
    plural = "databasebackups",
    singular = "databasebackup",
    shortname = "dbb",
    status = "IntentStatus",
    printcolumn = r#"{"name": "Engine", "type": "string", "jsonPath": ".spec.database.engineType"}"#,
    printcolumn = r#"{"name": "Schedule", "type": "string", "jsonPath": ".spec.schedule"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Unit", "type": "string", "jsonPath": ".status.executionUnit.name"}"#,
    printcolumn = r#"{"name": "Last Run", "type": "string", "jsonPath": ".status.lastRunTime"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseBackupSpec {
    /// Database to back up
    pub database: DatabaseSpec,

    /// Destination bucket for backup artifacts
    pub storage: ObjectStorageSpec,

    /// Cron schedule for the recurring backup
    pub schedule: String,

    /// Maximum number of artifacts kept for this database
    #[serde(default = "default_retention_count")]
    pub retention_count: u32,

    /// Storage class hint passed through to the adapter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

fn default_retention_count() -> u32 {
    3
}
