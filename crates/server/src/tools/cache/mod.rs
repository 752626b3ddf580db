//! Cache-related MCP tools.
//!
//! This module provides tools for inspecting and maintaining the partitioned cache.

pub mod cleanup;
pub mod clear;
pub mod get;

pub use cleanup::cleanup_impl;
pub use clear::clear_impl;
pub use get::{CacheGetParams, get_impl};
