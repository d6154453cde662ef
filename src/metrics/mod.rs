//! Prometheus metrics for the Database Backup Operator
//!
//! This module exposes metrics for monitoring operator health and performance,
//! and receives run reports from backup workloads.

mod prometheus;

pub use prometheus::*;
