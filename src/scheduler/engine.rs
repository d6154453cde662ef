//! Engine profiles
//!
//! The three supported engines only differ in data: their tag, the short
//! name used in unit names and the workload images.

use std::fmt::{self, Display};

use crate::config::AdapterConfig;

/// Image running the retention engine
pub const DEFAULT_RETENTION_IMAGE: &str = "ghcr.io/oiler-backup/retention:latest";

/// Supported database engines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Postgres,
    MySql,
    Mongo,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [EngineKind::Postgres, EngineKind::MySql, EngineKind::Mongo];

    /// Parse a registry engine tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(EngineKind::Postgres),
            "mysql" => Some(EngineKind::MySql),
            "mongo" | "mongodb" => Some(EngineKind::Mongo),
            _ => None,
        }
    }

    /// Canonical engine tag, as used for registry keys
    pub fn tag(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::MySql => "mysql",
            EngineKind::Mongo => "mongo",
        }
    }

    /// Short name embedded in unit names
    pub fn short(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "pg",
            EngineKind::MySql => "mysql",
            EngineKind::Mongo => "mongo",
        }
    }

    pub fn default_backuper_image(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "ghcr.io/oiler-backup/postgres-backuper:latest",
            EngineKind::MySql => "ghcr.io/oiler-backup/mysql-backuper:latest",
            EngineKind::Mongo => "ghcr.io/oiler-backup/mongo-backuper:latest",
        }
    }

    pub fn default_restorer_image(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "ghcr.io/oiler-backup/postgres-restorer:latest",
            EngineKind::MySql => "ghcr.io/oiler-backup/mysql-restorer:latest",
            EngineKind::Mongo => "ghcr.io/oiler-backup/mongo-restorer:latest",
        }
    }
}

impl Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Everything a scheduler needs to know about its engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineProfile {
    pub engine: EngineKind,
    pub backuper_image: String,
    pub restorer_image: String,
    pub retention_image: String,
}

impl EngineProfile {
    /// Profile with the engine's default images
    pub fn new(engine: EngineKind) -> Self {
        Self {
            engine,
            backuper_image: engine.default_backuper_image().to_string(),
            restorer_image: engine.default_restorer_image().to_string(),
            retention_image: DEFAULT_RETENTION_IMAGE.to_string(),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self {
            engine: config.engine,
            backuper_image: config.backuper_image.clone(),
            restorer_image: config.restorer_image.clone(),
            retention_image: config.retention_image.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_through_aliases() {
        assert_eq!(EngineKind::from_tag("PostgreSQL"), Some(EngineKind::Postgres));
        assert_eq!(EngineKind::from_tag("mongodb"), Some(EngineKind::Mongo));
        assert_eq!(EngineKind::from_tag("oracle"), None);
        for engine in EngineKind::ALL {
            assert_eq!(EngineKind::from_tag(engine.tag()), Some(engine));
        }
    }

    #[test]
    fn postgres_uses_short_name_pg() {
        assert_eq!(EngineKind::Postgres.short(), "pg");
        assert_eq!(EngineProfile::new(EngineKind::Postgres).retention_image, DEFAULT_RETENTION_IMAGE);
    }
}
