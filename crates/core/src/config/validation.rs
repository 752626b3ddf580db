//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::routes::RouteTable;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent`, `cache_prefix` or `cache_version` is empty
    /// - `origin` is not an absolute http(s) URL
    /// - `max_age_days`, `cleanup_interval_secs` or `max_revalidations` is out of range
    /// - a route pattern does not compile
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        for (field, value) in [
            ("user_agent", &self.user_agent),
            ("cache_prefix", &self.cache_prefix),
            ("cache_version", &self.cache_version),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        match url::Url::parse(&self.origin) {
            Ok(origin) if matches!(origin.scheme(), "http" | "https") => {}
            Ok(origin) => {
                return Err(ConfigError::Invalid {
                    field: "origin".into(),
                    reason: format!("unsupported scheme: {}", origin.scheme()),
                });
            }
            Err(e) => return Err(ConfigError::Invalid { field: "origin".into(), reason: e.to_string() }),
        }

        if self.max_age_days < 1 {
            return Err(ConfigError::Invalid { field: "max_age_days".into(), reason: "must be at least 1 day".into() });
        }

        if self.cleanup_interval_secs < 60 {
            return Err(ConfigError::Invalid {
                field: "cleanup_interval_secs".into(),
                reason: "must be at least 60 seconds".into(),
            });
        }

        if self.max_revalidations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_revalidations".into(),
                reason: "must be greater than 0".into(),
            });
        }

        RouteTable::compile(&self.routes)
            .map_err(|e| ConfigError::Invalid { field: "routes".into(), reason: e.to_string() })?;

        if self.critical_resources.is_empty() {
            tracing::warn!("critical_resources is empty; install will populate an empty static partition");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{RouteRule, Strategy};

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_max_bytes_zero() {
        let config = AppConfig { max_bytes: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_bytes"));
    }

    #[test]
    fn test_validate_timeout_too_small() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_timeout_exceeds_limit() {
        let config = AppConfig { timeout_ms: 301_000, ..Default::default() }; // 5min 1sec
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "timeout_ms"));
    }

    #[test]
    fn test_validate_empty_version() {
        let config = AppConfig { cache_version: "  ".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "cache_version"));
    }

    #[test]
    fn test_validate_origin_scheme() {
        let config = AppConfig { origin: "ftp://pocketgnu.org".into(), ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "origin"));

        let config = AppConfig { origin: "not a url".into(), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_max_age_zero() {
        let config = AppConfig { max_age_days: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_age_days"));
    }

    #[test]
    fn test_validate_zero_revalidations() {
        let config = AppConfig { max_revalidations: 0, ..Default::default() };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "max_revalidations"));
    }

    #[test]
    fn test_validate_bad_route_pattern() {
        let config = AppConfig {
            routes: vec![RouteRule { pattern: "([unclosed".into(), strategy: Strategy::CacheFirst }],
            ..Default::default()
        };
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "routes"));
    }

    #[test]
    fn test_validate_edge_case_values() {
        let config = AppConfig { max_bytes: 1, timeout_ms: 100, cleanup_interval_secs: 60, ..Default::default() };
        assert!(config.validate().is_ok());
    }
}
