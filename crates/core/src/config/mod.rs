//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (POCKETSW_*)
//! 2. TOML config file (if POCKETSW_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::routes::{RouteRule, default_rules};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (POCKETSW_*)
/// 2. TOML config file (if POCKETSW_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to SQLite cache database.
    ///
    /// Set via POCKETSW_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Site origin that relative resource paths resolve against.
    ///
    /// Set via POCKETSW_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Prefix shared by both partition names.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version suffix of the partition names. Changing it invalidates every
    /// previously cached entry on the next activation.
    ///
    /// Set via POCKETSW_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Resources that must all be cached for install to succeed.
    #[serde(default = "default_critical_resources")]
    pub critical_resources: Vec<String>,

    /// Resources cached best-effort into the dynamic partition on install.
    #[serde(default = "default_non_critical_resources")]
    pub non_critical_resources: Vec<String>,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via POCKETSW_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via POCKETSW_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via POCKETSW_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Dynamic entries older than this are removed by cleanup.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: i64,

    /// Seconds between scheduled cleanup passes.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Maximum number of background revalidations in flight.
    #[serde(default = "default_max_revalidations")]
    pub max_revalidations: usize,

    /// Ordered routing table; the first matching pattern wins.
    #[serde(default = "default_rules")]
    pub routes: Vec<RouteRule>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./pocketsw-cache.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_prefix() -> String {
    "pocketgnu".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_critical_resources() -> Vec<String> {
    ["/", "/index.html", "/styles.css", "/script.js", "/manifest.json", "/offline.html"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_non_critical_resources() -> Vec<String> {
    ["/assets/logo.svg", "/assets/hero.webp", "/assets/fonts/inter-var.woff2", "/js/advanced-ux.js"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_user_agent() -> String {
    "pocketsw/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_age_days() -> i64 {
    7
}

fn default_cleanup_interval_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_revalidations() -> usize {
    8
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            origin: default_origin(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            critical_resources: default_critical_resources(),
            non_critical_resources: default_non_critical_resources(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_age_days: default_max_age_days(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_revalidations: default_max_revalidations(),
            routes: default_rules(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval between scheduled cleanup passes.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Maximum entry age before cleanup removes it.
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(self.max_age_days)
    }

    /// Name of the install-time partition for the current version.
    pub fn static_partition(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.cache_version)
    }

    /// Name of the runtime partition for the current version.
    pub fn dynamic_partition(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.cache_version)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `POCKETSW_`
    /// 2. TOML file from `POCKETSW_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("POCKETSW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("POCKETSW_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::Strategy;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./pocketsw-cache.sqlite"));
        assert_eq!(config.user_agent, "pocketsw/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_age_days, 7);
        assert_eq!(config.max_revalidations, 8);
        assert!(config.critical_resources.contains(&"/index.html".to_string()));
        assert!(!config.routes.is_empty());
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.cleanup_interval(), Duration::from_secs(86_400));
        assert_eq!(config.max_age(), chrono::Duration::days(7));
    }

    #[test]
    fn test_partition_names_carry_version() {
        let config = AppConfig { cache_version: "v2".into(), ..Default::default() };
        assert_eq!(config.static_partition(), "pocketgnu-static-v2");
        assert_eq!(config.dynamic_partition(), "pocketgnu-dynamic-v2");
    }

    #[test]
    fn test_routes_deserialize_from_toml() {
        let toml = r#"
            cache_version = "v9"

            [[routes]]
            pattern = "\\.pdf$"
            strategy = "cache-only"
        "#;
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap();

        assert_eq!(config.cache_version, "v9");
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].strategy, Strategy::CacheOnly);
    }
}
