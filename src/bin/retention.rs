//! Retention run
//!
//! Deletes the oldest backup artifacts of one database so that at most
//! `MAX_BACKUP_COUNT` remain. Exits non-zero on failure; the next scheduled
//! run retries.

use tracing::info;

use db_backup_operator::{
    config::RetentionConfig,
    retention::{self, S3ArtifactStore},
    telemetry::init_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RetentionConfig::from_env()?;
    info!(
        bucket = %config.bucket,
        prefix = %config.prefix,
        keep = config.max_backup_count,
        "Enforcing retention"
    );

    let store = S3ArtifactStore::new(&config)?;
    let report = retention::enforce(&store, &config.prefix, config.max_backup_count).await?;

    info!(
        listed = report.listed,
        deleted = report.deleted.len(),
        "Retention run finished"
    );
    Ok(())
}
