//! Delegation protocol between the core and per-engine adapters
//!
//! Three calls: `Backup`, `Update` and `Restore`. The wire format is JSON
//! over HTTP/1.1; the typed request/response shapes live here together with
//! the [`EngineAdapter`] capability that both the remote client and the
//! in-process scheduler implement.

pub mod client;
pub mod local;
pub mod server;

pub use client::{HttpAdapter, HttpDialer};
pub use local::LocalDialer;

use std::fmt::{self, Display};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::crd::{DatabaseBackup, DatabaseRestore, UnitHandle};
use crate::error::{Error, Result};

/// Request to create the scheduled backup unit for a database
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRequest {
    pub db_uri: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_pass: String,
    pub db_name: String,
    pub engine_type: String,
    pub schedule: String,
    #[serde(default)]
    pub storage_class: String,
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_bucket: String,
    #[serde(default)]
    pub core_callback_addr: String,
    pub max_backup_count: u32,
}

impl BackupRequest {
    /// Assemble the request from the intent's desired state
    pub fn for_intent(backup: &DatabaseBackup, core_addr: &str) -> Self {
        let spec = &backup.spec;
        Self {
            db_uri: spec.database.uri.clone(),
            db_port: spec.database.port,
            db_user: spec.database.user.clone(),
            db_pass: spec.database.password.clone(),
            db_name: spec.database.name.clone(),
            engine_type: spec.database.engine_type.clone(),
            schedule: spec.schedule.clone(),
            storage_class: spec.storage_class.clone().unwrap_or_default(),
            s3_endpoint: spec.storage.endpoint.clone(),
            s3_access_key: spec.storage.access_key.clone(),
            s3_secret_key: spec.storage.secret_key.clone(),
            s3_bucket: spec.storage.bucket.clone(),
            core_callback_addr: core_addr.to_string(),
            max_backup_count: spec.retention_count,
        }
    }
}

/// Request to re-render an existing backup unit in place
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub request: BackupRequest,
    pub unit_name: String,
    pub unit_namespace: String,
}

impl UpdateRequest {
    pub fn new(request: BackupRequest, handle: &UnitHandle) -> Self {
        Self {
            request,
            unit_name: handle.name.clone(),
            unit_namespace: handle.namespace.clone(),
        }
    }

    pub fn handle(&self) -> UnitHandle {
        UnitHandle::new(&self.unit_name, &self.unit_namespace)
    }
}

/// Acknowledgement of an update
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateResponse {
    pub ack: bool,
}

/// Request to create the one-shot restore unit for a database
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    pub db_uri: String,
    pub db_port: u16,
    pub db_user: String,
    pub db_pass: String,
    pub db_name: String,
    pub engine_type: String,
    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_bucket: String,
    pub revision: String,
}

impl RestoreRequest {
    /// Assemble the request from the intent's desired state
    pub fn for_intent(restore: &DatabaseRestore) -> Self {
        let spec = &restore.spec;
        Self {
            db_uri: spec.database.uri.clone(),
            db_port: spec.database.port,
            db_user: spec.database.user.clone(),
            db_pass: spec.database.password.clone(),
            db_name: spec.database.name.clone(),
            engine_type: spec.database.engine_type.clone(),
            s3_endpoint: spec.storage.endpoint.clone(),
            s3_access_key: spec.storage.access_key.clone(),
            s3_secret_key: spec.storage.secret_key.clone(),
            s3_bucket: spec.storage.bucket.clone(),
            revision: spec.revision.trim().to_string(),
        }
    }
}

/// Outcome of a unit creation attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum UnitStatus {
    Created,
    Exists,
    Failed,
}

/// Response to `Backup` and `Restore`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResponse {
    pub status: UnitStatus,
    #[serde(default)]
    pub unit_name: String,
    #[serde(default)]
    pub unit_namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub type BackupResponse = UnitResponse;
pub type RestoreResponse = UnitResponse;

impl UnitResponse {
    pub fn created(handle: UnitHandle) -> Self {
        Self::with_status(UnitStatus::Created, handle)
    }

    pub fn exists(handle: UnitHandle) -> Self {
        Self::with_status(UnitStatus::Exists, handle)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: UnitStatus::Failed,
            unit_name: String::new(),
            unit_namespace: String::new(),
            message: Some(message.into()),
        }
    }

    fn with_status(status: UnitStatus, handle: UnitHandle) -> Self {
        Self {
            status,
            unit_name: handle.name,
            unit_namespace: handle.namespace,
            message: None,
        }
    }

    pub fn handle(&self) -> UnitHandle {
        UnitHandle::new(&self.unit_name, &self.unit_namespace)
    }
}

/// Artifact selector of a restore
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Revision {
    /// Position counted from the newest artifact, 0 being the newest
    Index(u32),
    /// Exact artifact key
    Named(String),
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::validation("revision must not be empty"));
        }
        Ok(match trimmed.parse::<u32>() {
            Ok(index) => Revision::Index(index),
            Err(_) => Revision::Named(trimmed.to_string()),
        })
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Index(index) => write!(f, "{}", index),
            Revision::Named(key) => f.write_str(key),
        }
    }
}

/// The per-engine adapter capability
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Idempotently create the scheduled backup unit
    async fn backup(&self, request: &BackupRequest) -> Result<BackupResponse>;

    /// Re-render an existing backup unit in place
    async fn update(&self, request: &UpdateRequest) -> Result<UpdateResponse>;

    /// Idempotently create the one-shot restore unit
    async fn restore(&self, request: &RestoreRequest) -> Result<RestoreResponse>;
}

/// Resolves an adapter address into a callable adapter
pub trait AdapterDialer: Send + Sync {
    fn dial(&self, address: &str) -> Result<Arc<dyn EngineAdapter>>;
}

/// Run an adapter call bounded by `timeout` and the caller's cancellation.
/// Timeouts and cancellations are reported as their own error variants.
pub async fn call<T, F>(
    method: &str,
    timeout: Duration,
    cancel: &CancellationToken,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled(method.to_string())),
        outcome = tokio::time::timeout(timeout, fut) => match outcome {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(method.to_string())),
        },
    }
}
