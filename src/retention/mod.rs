//! Retention engine
//!
//! Keeps the newest `retention_count` backup artifacts under a database's
//! prefix and deletes the rest. Runs as its own scheduled workload next to
//! each backup unit.

mod memory;
mod s3;

pub use memory::MemoryArtifactStore;
pub use s3::S3ArtifactStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{Error, Result};

/// A stored backup artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub key: String,
    pub last_modified: DateTime<Utc>,
}

impl Artifact {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

/// Artifact prefix of a database inside the bucket
pub fn artifact_prefix(db_name: &str) -> String {
    format!("{}/", db_name)
}

/// Listing and deletion of artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Every artifact whose key starts with `prefix`
    async fn list(&self, prefix: &str) -> Result<Vec<Artifact>>;

    /// Delete `keys` in one batch. Keys that are already gone are not an error.
    async fn delete(&self, keys: &[String]) -> Result<()>;
}

/// Outcome of one retention run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub listed: usize,
    pub deleted: Vec<String>,
}

/// Artifacts to evict so that only the newest `keep` remain. Oldest first,
/// ties on the timestamp broken by key.
pub fn select_evictions(mut artifacts: Vec<Artifact>, keep: usize) -> Vec<Artifact> {
    if artifacts.len() <= keep {
        return Vec::new();
    }
    artifacts.sort_by(|a, b| (a.last_modified, &a.key).cmp(&(b.last_modified, &b.key)));
    artifacts.truncate(artifacts.len() - keep);
    artifacts
}

/// Enforce the retention count on `prefix`
pub async fn enforce(
    store: &dyn ArtifactStore,
    prefix: &str,
    retention_count: usize,
) -> Result<RetentionReport> {
    if retention_count == 0 {
        return Err(Error::validation("retention count must be at least 1"));
    }

    let artifacts = store.list(prefix).await?;
    let listed = artifacts.len();
    let evictions: Vec<String> = select_evictions(artifacts, retention_count)
        .into_iter()
        .map(|artifact| artifact.key)
        .collect();

    if evictions.is_empty() {
        info!(prefix = %prefix, listed, retention_count, "Nothing to evict");
        return Ok(RetentionReport {
            listed,
            deleted: evictions,
        });
    }

    store.delete(&evictions).await?;
    info!(prefix = %prefix, listed, deleted = evictions.len(), "Evicted old backups");

    Ok(RetentionReport {
        listed,
        deleted: evictions,
    })
}
