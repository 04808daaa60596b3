//! Configuration management for the cache administration layer
//!
//! The configuration is an explicit value handed to every component.
//! It can be loaded from a YAML file, from the `NGINX_REDIS_*`
//! environment variables, or both (environment wins).

use crate::error::{CacheAdminError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Key prefix used when none is configured
pub const DEFAULT_KEY_PREFIX: &str = "nginx-cache:";

/// Largest accepted connect timeout, in seconds
pub const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

/// How purge-by-url matches stored keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurgeMatch {
    /// Delete every key containing the URL (may over-match `/a` vs `/ab`)
    #[default]
    Substring,
    /// Delete only keys whose decoded URL equals the requested URL
    Exact,
}

/// Configuration for the cache store connection and key layout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheAdminConfig {
    /// Unix domain socket path; takes precedence over host/port when set
    #[serde(default)]
    pub socket_path: Option<String>,

    /// Store host (default when connecting: 127.0.0.1)
    #[serde(default)]
    pub host: Option<String>,

    /// Store port (default: 6379)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connect timeout in seconds (default: 1.5)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    /// Password sent with AUTH after connecting
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Logical database selected after connecting
    #[serde(default)]
    pub db_index: Option<i64>,

    /// Prefix every cache key starts with (default: "nginx-cache:")
    #[serde(default)]
    pub key_prefix: Option<String>,

    /// SCAN COUNT hint when listing cached URLs (default: 500)
    #[serde(default = "default_listing_batch_size")]
    pub listing_batch_size: usize,

    /// SCAN COUNT hint when flushing the whole cache (default: 1000)
    #[serde(default = "default_flush_batch_size")]
    pub flush_batch_size: usize,

    /// SCAN COUNT hint when purging a single URL (default: 500)
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: usize,

    /// Timeout for a single SCAN round trip, in milliseconds
    #[serde(default)]
    pub scan_timeout_ms: Option<u64>,

    /// Upper bound for a whole listing/flush/purge operation, in milliseconds
    #[serde(default)]
    pub operation_deadline_ms: Option<u64>,

    /// Matching mode for purge-by-url (default: substring)
    #[serde(default)]
    pub purge_match: PurgeMatch,

    /// Address the HTTP purge endpoint binds to (default: "127.0.0.1:8080")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Whether to register Prometheus metrics (default: true)
    #[serde(default = "default_true")]
    pub enable_metrics: bool,
}

// Default value functions for serde
fn default_port() -> u16 {
    6379
}

fn default_timeout_seconds() -> f64 {
    1.5
}

fn default_listing_batch_size() -> usize {
    500
}

fn default_flush_batch_size() -> usize {
    1000
}

fn default_purge_batch_size() -> usize {
    500
}

fn default_listen_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for CacheAdminConfig {
    fn default() -> Self {
        CacheAdminConfig {
            socket_path: None,
            host: None,
            port: default_port(),
            timeout_seconds: default_timeout_seconds(),
            auth_token: None,
            db_index: None,
            key_prefix: None,
            listing_batch_size: default_listing_batch_size(),
            flush_batch_size: default_flush_batch_size(),
            purge_batch_size: default_purge_batch_size(),
            scan_timeout_ms: None,
            operation_deadline_ms: None,
            purge_match: PurgeMatch::default(),
            listen_address: default_listen_address(),
            enable_metrics: default_true(),
        }
    }
}

impl CacheAdminConfig {
    /// Configuration pointing at a TCP host with every other value defaulted
    pub fn with_host(host: impl Into<String>) -> Self {
        CacheAdminConfig {
            host: Some(host.into()),
            ..Default::default()
        }
    }

    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(CacheAdminConfig)` if loading and validation succeed
    /// * `Err(CacheAdminError)` if file cannot be read or config is invalid
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            CacheAdminError::ConfigError(format!("Failed to read config file: {}", e))
        })?;

        let config: CacheAdminConfig = serde_yaml::from_str(&content).map_err(|e| {
            CacheAdminError::ConfigError(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the `NGINX_REDIS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = CacheAdminConfig::default();
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields with any `NGINX_REDIS_*` variables that are set
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())?;
        self.validate()
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Blank values count as unset, except `NGINX_REDIS_AUTH` where a blank
    /// value disables authentication.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string());

        if let Some(socket) = get("NGINX_REDIS_SOCKET").filter(|v| !v.is_empty()) {
            self.socket_path = Some(socket);
        }
        if let Some(host) = get("NGINX_REDIS_HOST").filter(|v| !v.is_empty()) {
            self.host = Some(host);
        }
        if let Some(port) = get("NGINX_REDIS_PORT").filter(|v| !v.is_empty()) {
            self.port = port.parse().map_err(|e| {
                CacheAdminError::ConfigError(format!("Invalid NGINX_REDIS_PORT '{}': {}", port, e))
            })?;
        }
        if let Some(timeout) = get("NGINX_REDIS_TIMEOUT").filter(|v| !v.is_empty()) {
            self.timeout_seconds = timeout.parse().map_err(|e| {
                CacheAdminError::ConfigError(format!(
                    "Invalid NGINX_REDIS_TIMEOUT '{}': {}",
                    timeout, e
                ))
            })?;
        }
        if let Some(auth) = get("NGINX_REDIS_AUTH") {
            self.auth_token = if auth.is_empty() { None } else { Some(auth) };
        }
        if let Some(db) = get("NGINX_REDIS_DB").filter(|v| !v.is_empty()) {
            self.db_index = Some(db.parse().map_err(|e| {
                CacheAdminError::ConfigError(format!("Invalid NGINX_REDIS_DB '{}': {}", db, e))
            })?);
        }
        if let Some(prefix) = get("NGINX_REDIS_PREFIX").filter(|v| !v.is_empty()) {
            self.key_prefix = Some(prefix);
        }

        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Validation Rules
    /// - port must be > 0
    /// - timeout_seconds must be > 0 and at most [`MAX_TIMEOUT_SECONDS`]
    /// - batch sizes must be > 0
    /// - db_index must be >= 0
    /// - socket_path, if set, must not be empty
    /// - key_prefix, if set, must contain something besides ':'
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(CacheAdminError::ConfigError(
                "port must be greater than 0".to_string(),
            ));
        }

        if !(self.timeout_seconds > 0.0 && self.timeout_seconds <= MAX_TIMEOUT_SECONDS) {
            return Err(CacheAdminError::ConfigError(format!(
                "timeout_seconds must be in (0, {}], got {}",
                MAX_TIMEOUT_SECONDS, self.timeout_seconds
            )));
        }

        for (name, value) in [
            ("listing_batch_size", self.listing_batch_size),
            ("flush_batch_size", self.flush_batch_size),
            ("purge_batch_size", self.purge_batch_size),
        ] {
            if value == 0 {
                return Err(CacheAdminError::ConfigError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if let Some(db) = self.db_index {
            if db < 0 {
                return Err(CacheAdminError::ConfigError(format!(
                    "db_index must be >= 0, got {}",
                    db
                )));
            }
        }

        if matches!(self.socket_path.as_deref(), Some(path) if path.trim().is_empty()) {
            return Err(CacheAdminError::ConfigError(
                "socket_path must not be empty when set".to_string(),
            ));
        }

        if let Some(prefix) = &self.key_prefix {
            if !prefix.is_empty() && prefix.trim_end_matches(':').is_empty() {
                return Err(CacheAdminError::ConfigError(format!(
                    "key_prefix must contain more than ':' characters, got '{}'",
                    prefix
                )));
            }
        }

        Ok(())
    }

    /// True when a host or a socket is configured
    pub fn is_configured(&self) -> bool {
        self.host.is_some() || self.socket_path.is_some()
    }

    /// The key prefix with exactly one trailing ':'
    pub fn prefix(&self) -> String {
        match self.key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}:", prefix.trim_end_matches(':'))
            }
            _ => DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Host to connect to when no socket is configured
    pub fn effective_host(&self) -> &str {
        match self.host.as_deref() {
            Some(host) if !host.is_empty() => host,
            _ => "127.0.0.1",
        }
    }

    /// Connect timeout as a Duration. Fails for values no Duration can hold,
    /// which only an unvalidated configuration can carry.
    pub fn connect_timeout(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.timeout_seconds).map_err(|e| {
            CacheAdminError::ConfigError(format!(
                "timeout_seconds {} is not a valid duration: {}",
                self.timeout_seconds, e
            ))
        })
    }

    /// Per-iteration SCAN timeout, if configured
    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_ms.map(Duration::from_millis)
    }

    /// Whole-operation deadline, if configured
    pub fn operation_deadline(&self) -> Option<Duration> {
        self.operation_deadline_ms.map(Duration::from_millis)
    }

    /// Names of the settings an operator is expected to provide but has not.
    ///
    /// Defaults do not count as provided. `port` is never reported since it
    /// always has a usable default.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.host.is_none() && self.socket_path.is_none() {
            missing.push("host");
        }
        if self.key_prefix.is_none() {
            missing.push("key_prefix");
        }
        missing
    }
}
