//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (BTX_CACHE_*)
//! 2. TOML config file (if BTX_CACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Assets that must be present in the bucket after install.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "./",
    "./index.html",
    "./styles.css",
    "./app.js",
    "./manifest.json",
    "./icons/icon-192.png",
    "./icons/icon-512.png",
];

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (BTX_CACHE_*)
/// 2. TOML config file (if BTX_CACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scope URL of the app; manifest paths resolve against it and its
    /// origin decides which requests are intercepted.
    ///
    /// Set via BTX_CACHE_SCOPE_URL environment variable.
    #[serde(default = "default_scope_url")]
    pub scope_url: String,

    /// Prefix of every bucket name.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,

    /// Version string; bump it on every deploy that changes assets.
    ///
    /// Set via BTX_CACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Asset paths fetched and stored on install.
    #[serde(default = "default_manifest")]
    pub manifest: Vec<String>,

    /// Path to SQLite cache database.
    ///
    /// Set via BTX_CACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Keep buckets in memory instead of SQLite.
    #[serde(default)]
    pub in_memory: bool,

    /// User-Agent string for network requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to read per response.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Network timeout in milliseconds, applied by the transport.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Total body bytes allowed across all buckets.
    #[serde(default = "default_quota_bytes")]
    pub quota_bytes: u64,
}

fn default_scope_url() -> String {
    "http://127.0.0.1:8080/".into()
}

fn default_cache_prefix() -> String {
    "btx-offline-".into()
}

fn default_cache_version() -> String {
    "v1".into()
}

fn default_manifest() -> Vec<String> {
    DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./btx-offline-cache.sqlite")
}

fn default_user_agent() -> String {
    "btx-offline/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_quota_bytes() -> u64 {
    crate::cache::DEFAULT_QUOTA_BYTES
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scope_url: default_scope_url(),
            cache_prefix: default_cache_prefix(),
            cache_version: default_cache_version(),
            manifest: default_manifest(),
            db_path: default_db_path(),
            in_memory: false,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            quota_bytes: default_quota_bytes(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Name of the bucket owned by this version.
    pub fn bucket_name(&self) -> String {
        format!("{}{}", self.cache_prefix, self.cache_version)
    }

    /// Parsed scope URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `scope_url` does not parse.
    pub fn scope(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.scope_url)
            .map_err(|e| ConfigError::Invalid { field: "scope_url".into(), reason: e.to_string() })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `BTX_CACHE_`
    /// 2. TOML file from `BTX_CACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file or environment cannot be read,
    /// or validation fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BTX_CACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("BTX_CACHE_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
