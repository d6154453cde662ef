//! In-memory artifact store

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;

use super::{Artifact, ArtifactStore};

#[derive(Default)]
struct State {
    objects: BTreeMap<String, DateTime<Utc>>,
    delete_calls: usize,
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    state: RwLock<State>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, key: impl Into<String>, last_modified: DateTime<Utc>) {
        self.state.write().await.objects.insert(key.into(), last_modified);
    }

    /// All keys, sorted
    pub async fn keys(&self) -> Vec<String> {
        self.state.read().await.objects.keys().cloned().collect()
    }

    /// Number of batch deletions issued so far
    pub async fn delete_calls(&self) -> usize {
        self.state.read().await.delete_calls
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<Artifact>> {
        let state = self.state.read().await;
        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, last_modified)| Artifact::new(key.clone(), *last_modified))
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        state.delete_calls += 1;
        for key in keys {
            state.objects.remove(key);
        }
        Ok(())
    }
}
