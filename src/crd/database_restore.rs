//! DatabaseRestore Custom Resource Definition

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{DatabaseSpec, IntentStatus, ObjectStorageSpec};

/// DatabaseRestore resource specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "backup.oiler.dev",
    version = "v1alpha1",
    kind = "DatabaseRestore",
    plural = "databaserestores",
    singular = "databaserestore",
    shortname = "dbr",
    status = "IntentStatus",
    printcolumn = r#"{"name": "Engine", "type": "string", "jsonPath": ".spec.database.engineType"}"#,
    printcolumn = r#"{"name": "Revision", "type": "string", "jsonPath": ".spec.revision"}"#,
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRestoreSpec {
    /// Database to restore into
    pub database: DatabaseSpec,

    /// Bucket holding the backup artifacts
    pub storage: ObjectStorageSpec,

    /// Artifact to restore: an index ("0" is the newest) or an artifact key
    pub revision: String,
}
