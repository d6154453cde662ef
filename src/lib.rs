//! Database Backup Operator
//!
//! Control plane for scheduled database backups and one-shot restores on
//! Kubernetes. The core reconciles `DatabaseBackup` and `DatabaseRestore`
//! intents and delegates the execution units to per-engine adapters; the
//! retention engine trims old artifacts in object storage.

pub mod cluster;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod delegation;
pub mod error;
pub mod metrics;
pub mod reconcilers;
pub mod registry;
pub mod retention;
pub mod scheduler;
pub mod telemetry;

pub use error::{Error, Result};
