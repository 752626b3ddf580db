//! Core types and shared functionality for the PocketGNU cache worker.
//!
//! This crate provides:
//! - Partitioned response cache with SQLite backend
//! - Strategy routing table
//! - Request metrics
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;

pub use cache::{CacheDb, Snapshot};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use metrics::{Metrics, MetricsSnapshot};
pub use routes::{RouteRule, RouteTable, Strategy};
