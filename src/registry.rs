//! Adapter registry
//!
//! Maps database engine tags to adapter addresses. The registry is a
//! ConfigMap managed by operators; it is read fresh on every reconciliation
//! pass so engines can be added without restarting the core.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};

use crate::error::{Error, Result};

/// Name of the registry ConfigMap in the operator namespace
pub const REGISTRY_CONFIG_MAP: &str = "database-config";

/// Immutable snapshot of engine → adapter address entries
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdapterRegistry {
    entries: BTreeMap<String, String>,
}

impl AdapterRegistry {
    pub fn new<E, A>(entries: impl IntoIterator<Item = (E, A)>) -> Self
    where
        E: Into<String>,
        A: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(engine, address)| (engine.into(), address.into().trim().to_string()))
            .filter(|(_, address)| !address.is_empty())
            .collect();
        Self { entries }
    }

    /// Build a snapshot from the registry ConfigMap's data
    pub fn from_config_map(config_map: &ConfigMap) -> Self {
        Self::new(config_map.data.clone().unwrap_or_default())
    }

    /// Adapter address for `engine`
    pub fn resolve(&self, engine: &str) -> Result<&str> {
        self.entries
            .get(engine)
            .map(String::as_str)
            .ok_or_else(|| Error::UnsupportedEngine(engine.to_string()))
    }

    pub fn engines(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Source of registry snapshots
#[async_trait]
pub trait RegistrySource: Send + Sync {
    async fn load(&self) -> Result<AdapterRegistry>;
}

/// Registry read from the `database-config` ConfigMap
pub struct ConfigMapRegistry {
    api: Api<ConfigMap>,
    namespace: String,
}

impl ConfigMapRegistry {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }
}

#[async_trait]
impl RegistrySource for ConfigMapRegistry {
    async fn load(&self) -> Result<AdapterRegistry> {
        let config_map = self.api.get_opt(REGISTRY_CONFIG_MAP).await?.ok_or_else(|| {
            Error::config(format!(
                "adapter registry ConfigMap {}/{} not found",
                self.namespace, REGISTRY_CONFIG_MAP
            ))
        })?;
        Ok(AdapterRegistry::from_config_map(&config_map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_registered_engine() {
        let registry = AdapterRegistry::new([("postgres", "addr:1"), ("mysql", "addr:2")]);
        assert_eq!(registry.resolve("postgres").unwrap(), "addr:1");
        assert_eq!(registry.engines().collect::<Vec<_>>(), vec!["mysql", "postgres"]);
    }

    #[test]
    fn unknown_engine_is_unsupported() {
        let registry = AdapterRegistry::new([("postgres", "addr:1")]);
        let err = registry.resolve("unknown").unwrap_err();
        assert!(matches!(err, Error::UnsupportedEngine(ref engine) if engine == "unknown"));
    }

    #[test]
    fn blank_addresses_are_ignored() {
        let registry = AdapterRegistry::new([("postgres", "  "), ("mongo", " mongo-adapter:50051 ")]);
        assert_eq!(registry.len(), 1);
        assert!(registry.resolve("postgres").is_err());
        assert_eq!(registry.resolve("mongo").unwrap(), "mongo-adapter:50051");
    }

    #[test]
    fn config_map_without_data_is_empty() {
        let registry = AdapterRegistry::from_config_map(&ConfigMap::default());
        assert!(registry.is_empty());
    }
}
