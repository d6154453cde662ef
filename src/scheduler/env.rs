//! Environment contract of the execution workloads

use k8s_openapi::api::core::v1::EnvVar;

use crate::delegation::{BackupRequest, RestoreRequest};
use crate::retention::artifact_prefix;

fn var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

/// Connection and storage variables shared by backupers and restorers
struct CommonEnv<'a> {
    host: &'a str,
    port: u16,
    user: &'a str,
    password: &'a str,
    db_name: &'a str,
    endpoint: &'a str,
    access_key: &'a str,
    secret_key: &'a str,
    bucket: &'a str,
}

impl<'a> CommonEnv<'a> {
    fn render(&self) -> Vec<EnvVar> {
        vec![
            var("DB_HOST", self.host),
            var("DB_PORT", self.port.to_string()),
            var("DB_USER", self.user),
            var("DB_PASSWORD", self.password),
            var("DB_NAME", self.db_name),
            var("S3_ENDPOINT", self.endpoint),
            var("S3_ACCESS_KEY", self.access_key),
            var("S3_SECRET_KEY", self.secret_key),
            var("S3_BUCKET_NAME", self.bucket),
        ]
    }
}

impl<'a> From<&'a BackupRequest> for CommonEnv<'a> {
    fn from(req: &'a BackupRequest) -> Self {
        Self {
            host: &req.db_uri,
            port: req.db_port,
            user: &req.db_user,
            password: &req.db_pass,
            db_name: &req.db_name,
            endpoint: &req.s3_endpoint,
            access_key: &req.s3_access_key,
            secret_key: &req.s3_secret_key,
            bucket: &req.s3_bucket,
        }
    }
}

impl<'a> From<&'a RestoreRequest> for CommonEnv<'a> {
    fn from(req: &'a RestoreRequest) -> Self {
        Self {
            host: &req.db_uri,
            port: req.db_port,
            user: &req.db_user,
            password: &req.db_pass,
            db_name: &req.db_name,
            endpoint: &req.s3_endpoint,
            access_key: &req.s3_access_key,
            secret_key: &req.s3_secret_key,
            bucket: &req.s3_bucket,
        }
    }
}

/// Environment of a backuper. `CORE_ADDR` is only set when the core
/// advertised a callback address.
pub fn backup_env(req: &BackupRequest) -> Vec<EnvVar> {
    let mut env = CommonEnv::from(req).render();
    if !req.core_callback_addr.is_empty() {
        env.push(var("CORE_ADDR", req.core_callback_addr.as_str()));
    }
    env.push(var("MAX_BACKUP_COUNT", req.max_backup_count.to_string()));
    env
}

pub fn restore_env(req: &RestoreRequest) -> Vec<EnvVar> {
    let mut env = CommonEnv::from(req).render();
    env.push(var("BACKUP_REVISION", req.revision.as_str()));
    env
}

/// Environment of the retention engine for the database of `req`
pub fn retention_env(req: &BackupRequest) -> Vec<EnvVar> {
    vec![
        var("S3_ENDPOINT", req.s3_endpoint.as_str()),
        var("S3_ACCESS_KEY", req.s3_access_key.as_str()),
        var("S3_SECRET_KEY", req.s3_secret_key.as_str()),
        var("S3_BUCKET_NAME", req.s3_bucket.as_str()),
        var("S3_BACKUP_DIR", artifact_prefix(&req.db_name)),
        var("MAX_BACKUP_COUNT", req.max_backup_count.to_string()),
    ]
}
