//! SQLite-backed response cache split into named partitions.
//!
//! This module provides persistent cache storage using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named partitions that are created, listed and deleted as a unit
//! - Response snapshots keyed by partition and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Age-based eviction driven by the response `date` header

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod partitions;
pub mod snapshots;

pub use crate::Error;

pub use connection::CacheDb;
pub use snapshots::Snapshot;
