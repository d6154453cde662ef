//! Custom Resource Definitions for the Database Backup Operator

mod database_backup;
mod database_restore;

pub use database_backup::*;
pub use database_restore::*;

use std::fmt::{self, Debug, Display};

use chrono::{DateTime, Utc};
use k8s_openapi::ClusterResourceScope;
use kube::{CustomResourceExt, Resource};
use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Generate all CRD YAML manifests
pub fn generate_crds() -> serde_yaml::Result<Vec<String>> {
    Ok(vec![
        serde_yaml::to_string(&DatabaseBackup::crd())?,
        serde_yaml::to_string(&DatabaseRestore::crd())?,
    ])
}

/// Database connection descriptor
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database host
    pub uri: String,

    /// Database port
    pub port: u16,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Database name
    pub name: String,

    /// Engine tag resolved through the adapter registry (postgres, mysql, mongo, ...)
    pub engine_type: String,
}

/// S3-compatible object storage descriptor
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageSpec {
    /// S3 endpoint URL
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// Bucket name
    pub bucket: String,
}

/// Lifecycle phase shared by backup and restore intents
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum LifecyclePhase {
    Pending,
    InProgress,
    Success,
    Failure,
}

impl Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecyclePhase::Pending => "Pending",
            LifecyclePhase::InProgress => "InProgress",
            LifecyclePhase::Success => "Success",
            LifecyclePhase::Failure => "Failure",
        };
        f.write_str(label)
    }
}

/// Name and namespace of an execution unit
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnitHandle {
    pub name: String,
    pub namespace: String,
}

impl UnitHandle {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Observed state shared by backup and restore intents
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IntentStatus {
    /// Current phase (Pending, InProgress, Success, Failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<LifecyclePhase>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the intent was driven to completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_time: Option<DateTime<Utc>>,

    /// Execution unit owned by this intent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_unit: Option<UnitHandle>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Common view over the intent kinds, used by the stores and status helpers
pub trait Intent:
    Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Kind label used in metrics and logs
    const LABEL: &'static str;

    /// Engine tag the intent targets
    fn engine_type(&self) -> &str;

    fn intent_status(&self) -> Option<&IntentStatus>;

    fn intent_status_mut(&mut self) -> &mut Option<IntentStatus>;

    fn phase(&self) -> Option<LifecyclePhase> {
        self.intent_status().and_then(|s| s.phase)
    }
}

impl Intent for DatabaseBackup {
    const LABEL: &'static str = "DatabaseBackup";

    fn engine_type(&self) -> &str {
        &self.spec.database.engine_type
    }

    fn intent_status(&self) -> Option<&IntentStatus> {
        self.status.as_ref()
    }

    fn intent_status_mut(&mut self) -> &mut Option<IntentStatus> {
        &mut self.status
    }
}

impl Intent for DatabaseRestore {
    const LABEL: &'static str = "DatabaseRestore";

    fn engine_type(&self) -> &str {
        &self.spec.database.engine_type
    }

    fn intent_status(&self) -> Option<&IntentStatus> {
        self.status.as_ref()
    }

    fn intent_status_mut(&mut self) -> &mut Option<IntentStatus> {
        &mut self.status
    }
}
