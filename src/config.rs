//! Runtime configuration sourced from environment variables
//!
//! Each binary builds its configuration once at startup and hands it to the
//! components that need it. Nothing here is mutated after construction.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::scheduler::EngineKind;

/// Default namespace holding the adapter registry
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "oiler-backup-system";

/// Default metrics/report port for the core
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default delegation port for adapters
pub const DEFAULT_ADAPTER_PORT: u16 = 50051;

/// Default per-call timeout for adapter calls
pub const DEFAULT_ADAPTER_TIMEOUT_SECS: u64 = 30;

/// Environment lookup, abstracted so parsing can be exercised without
/// touching the process environment
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).filter(|v| !v.is_empty()).cloned()
    }
}

fn required(env: &impl EnvSource, key: &str) -> Result<String> {
    env.get(key)
        .ok_or_else(|| Error::config(format!("environment variable {} is required", key)))
}

fn parsed<T>(env: &impl EnvSource, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

/// Core operator configuration
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Namespace holding the adapter registry ConfigMap
    pub namespace: String,
    /// Callback address handed to execution workloads for metric reports
    pub core_addr: String,
    /// Port of the metrics/report HTTP server
    pub metrics_port: u16,
    /// Per-call timeout for adapter calls
    pub adapter_timeout: Duration,
    /// Reach adapters over TLS when the registry holds bare host:port values
    pub adapter_tls: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            core_addr: String::new(),
            metrics_port: DEFAULT_METRICS_PORT,
            adapter_timeout: Duration::from_secs(DEFAULT_ADAPTER_TIMEOUT_SECS),
            adapter_tls: false,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Result<Self> {
        let defaults = Self::default();
        let timeout_secs = parsed(env, "ADAPTER_TIMEOUT_SECS", DEFAULT_ADAPTER_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(Error::config("ADAPTER_TIMEOUT_SECS must be positive"));
        }

        Ok(Self {
            namespace: env.get("OPERATOR_NAMESPACE").unwrap_or(defaults.namespace),
            core_addr: env.get("CORE_ADDR").unwrap_or(defaults.core_addr),
            metrics_port: parsed(env, "METRICS_PORT", defaults.metrics_port)?,
            adapter_timeout: Duration::from_secs(timeout_secs),
            adapter_tls: parsed(env, "ADAPTER_TLS", defaults.adapter_tls)?,
        })
    }
}

/// Adapter scheduler configuration
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Engine served by this adapter
    pub engine: EngineKind,
    /// Namespace where execution units are created
    pub system_namespace: String,
    pub backuper_image: String,
    pub restorer_image: String,
    pub retention_image: String,
    /// Delegation server port
    pub port: u16,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Result<Self> {
        let engine_tag = required(env, "ENGINE_TYPE")?;
        let engine = EngineKind::from_tag(&engine_tag)
            .ok_or_else(|| Error::UnsupportedEngine(engine_tag.clone()))?;

        Ok(Self {
            engine,
            system_namespace: required(env, "SYSTEM_NAMESPACE")?,
            backuper_image: env
                .get("BACKUPER_IMAGE")
                .unwrap_or_else(|| engine.default_backuper_image().to_string()),
            restorer_image: env
                .get("RESTORER_IMAGE")
                .unwrap_or_else(|| engine.default_restorer_image().to_string()),
            retention_image: env
                .get("RETENTION_IMAGE")
                .unwrap_or_else(|| crate::scheduler::DEFAULT_RETENTION_IMAGE.to_string()),
            port: parsed(env, "PORT", DEFAULT_ADAPTER_PORT)?,
        })
    }
}

/// Retention run configuration, the environment contract of retention units
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    /// Per-database artifact prefix
    pub prefix: String,
    pub max_backup_count: usize,
}

impl RetentionConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_source(&ProcessEnv)
    }

    pub fn from_source(env: &impl EnvSource) -> Result<Self> {
        let raw_count = required(env, "MAX_BACKUP_COUNT")?;
        let max_backup_count = raw_count
            .parse::<usize>()
            .ok()
            .filter(|count| *count >= 1)
            .ok_or_else(|| Error::config(format!("Incorrect value MAX_BACKUP_COUNT: {}", raw_count)))?;

        Ok(Self {
            endpoint: required(env, "S3_ENDPOINT")?,
            access_key: required(env, "S3_ACCESS_KEY")?,
            secret_key: required(env, "S3_SECRET_KEY")?,
            bucket: required(env, "S3_BUCKET_NAME")?,
            prefix: required(env, "S3_BACKUP_DIR")?,
            max_backup_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn operator_config_defaults() {
        let config = OperatorConfig::from_source(&env(&[])).unwrap();
        assert_eq!(config.namespace, DEFAULT_OPERATOR_NAMESPACE);
        assert_eq!(config.metrics_port, 8080);
        assert_eq!(config.adapter_timeout, Duration::from_secs(30));
        assert!(!config.adapter_tls);
    }

    #[test]
    fn operator_config_rejects_zero_timeout() {
        let result = OperatorConfig::from_source(&env(&[("ADAPTER_TIMEOUT_SECS", "0")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn adapter_config_requires_namespace() {
        let result = AdapterConfig::from_source(&env(&[("ENGINE_TYPE", "postgres")]));
        let err = result.unwrap_err().to_string();
        assert!(err.contains("SYSTEM_NAMESPACE"));
    }

    #[test]
    fn adapter_config_uses_engine_default_images() {
        let config = AdapterConfig::from_source(&env(&[
            ("ENGINE_TYPE", "mysql"),
            ("SYSTEM_NAMESPACE", "backups"),
            ("PORT", "6000"),
        ]))
        .unwrap();
        assert_eq!(config.engine, EngineKind::MySql);
        assert_eq!(config.backuper_image, EngineKind::MySql.default_backuper_image());
        assert_eq!(config.port, 6000);
    }

    #[test]
    fn adapter_config_rejects_unknown_engine() {
        let result = AdapterConfig::from_source(&env(&[
            ("ENGINE_TYPE", "oracle"),
            ("SYSTEM_NAMESPACE", "backups"),
        ]));
        assert!(matches!(result, Err(Error::UnsupportedEngine(_))));
    }

    #[test]
    fn retention_config_rejects_zero_count() {
        let result = RetentionConfig::from_source(&env(&[
            ("S3_ENDPOINT", "http://minio:9000"),
            ("S3_ACCESS_KEY", "a"),
            ("S3_SECRET_KEY", "s"),
            ("S3_BUCKET_NAME", "b"),
            ("S3_BACKUP_DIR", "db1/"),
            ("MAX_BACKUP_COUNT", "0"),
        ]));
        assert!(result.unwrap_err().to_string().contains("MAX_BACKUP_COUNT"));
    }
}
