//! Configuration validation rules.
//!
//! Checks applied to `AppConfig` after it has been loaded from
//! environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `scope_url` is not an http(s) URL ending in `/`
    /// - `cache_prefix` or `cache_version` is empty or contains whitespace
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `quota_bytes` is smaller than `max_bytes`
    /// - `user_agent` is empty
    ///
    /// Returns `ConfigError::Missing` if `manifest` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scope = self.scope()?;
        if !matches!(scope.scheme(), "http" | "https") {
            return Err(invalid("scope_url", "must use http or https"));
        }
        if !scope.path().ends_with('/') {
            return Err(invalid("scope_url", "must end with '/'"));
        }

        for (field, value) in [("cache_prefix", &self.cache_prefix), ("cache_version", &self.cache_version)] {
            if value.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(invalid(field, "must not contain whitespace"));
            }
        }

        if self.manifest.is_empty() {
            return Err(ConfigError::Missing {
                field: "manifest".into(),
                hint: "list at least the app shell, e.g. [\"./\", \"./index.html\"]".into(),
            });
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.quota_bytes < self.max_bytes as u64 {
            return Err(invalid("quota_bytes", "must be at least max_bytes"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.in_memory {
            tracing::warn!(
                db_path = %self.db_path.display(),
                "in_memory is set; buckets will not survive a restart and db_path is ignored"
            );
        }

        Ok(())
    }
}
