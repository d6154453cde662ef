//! S3-compatible artifact store

use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::ObjectStore;
use tracing::debug;

use crate::config::RetentionConfig;
use crate::error::Result;

use super::{Artifact, ArtifactStore};

/// Region sent when the endpoint does not care
const DEFAULT_REGION: &str = "us-east-1";

pub struct S3ArtifactStore {
    store: Arc<dyn ObjectStore>,
}

impl S3ArtifactStore {
    /// Path-style client for the configured endpoint and bucket
    pub fn new(config: &RetentionConfig) -> Result<Self> {
        let store = AmazonS3Builder::new()
            .with_endpoint(&config.endpoint)
            .with_access_key_id(&config.access_key)
            .with_secret_access_key(&config.secret_key)
            .with_bucket_name(&config.bucket)
            .with_region(DEFAULT_REGION)
            .with_virtual_hosted_style_request(false)
            .with_allow_http(config.endpoint.starts_with("http://"))
            .build()?;
        Ok(Self::from_store(Arc::new(store)))
    }

    pub fn from_store(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn list(&self, prefix: &str) -> Result<Vec<Artifact>> {
        let prefix = Path::from(prefix);
        let objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;
        debug!(prefix = %prefix, count = objects.len(), "Listed artifacts");
        Ok(objects
            .into_iter()
            .map(|meta| Artifact::new(meta.location.to_string(), meta.last_modified))
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<()> {
        let locations = stream::iter(keys.iter().map(|key| Ok(Path::from(key.as_str())))).boxed();
        let mut results = self.store.delete_stream(locations);
        while let Some(result) = results.next().await {
            match result {
                Ok(path) => debug!(key = %path, "Deleted artifact"),
                Err(object_store::Error::NotFound { path, .. }) => {
                    debug!(key = %path, "Artifact already gone")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
