//! Administration facade
//!
//! [`CacheAdmin`] is what an operator-facing surface (the HTTP handler, a
//! CLI, a host application's hooks) talks to. It bundles listing,
//! invalidation and a configuration status check over one store.

use crate::aggregator::build_url_listing;
use crate::config::CacheAdminConfig;
use crate::error::Result;
use crate::invalidation::InvalidationService;
use crate::key_codec::KeyCodec;
use crate::models::UrlGroup;
use crate::purge_metrics::PurgeMetrics;
use crate::scanner::KeyScanner;
use crate::store::{CacheStore, RedisStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Listing size used when the caller does not ask for one
pub const DEFAULT_LISTING_LIMIT: usize = 1000;

/// Configuration health as shown to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigStatus {
    /// Host or socket configured
    pub configured: bool,
    /// Operator settings that were left unset
    pub missing: Vec<&'static str>,
    /// A test connection succeeded
    pub connected: bool,
    pub prefix: String,
    /// Why the test connection failed, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Cache administration over a [`CacheStore`]
pub struct CacheAdmin<S> {
    store: Arc<S>,
    config: CacheAdminConfig,
    scanner: KeyScanner,
    invalidation: InvalidationService<S>,
    metrics: Option<Arc<PurgeMetrics>>,
}

impl CacheAdmin<RedisStore> {
    /// Admin for the Redis server described by `config`
    pub fn from_config(config: CacheAdminConfig) -> Result<Self> {
        let store = RedisStore::new(&config);
        Self::new(store, config)
    }
}

impl<S: CacheStore> CacheAdmin<S> {
    pub fn new(store: S, config: CacheAdminConfig) -> Result<Self> {
        let store = Arc::new(store);
        let scanner =
            KeyScanner::new(KeyCodec::new(&config)?).with_scan_timeout(config.scan_timeout());
        let invalidation = InvalidationService::new(store.clone(), &config)?;

        Ok(CacheAdmin {
            store,
            config,
            scanner,
            invalidation,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<PurgeMetrics>) -> Self {
        self.invalidation = self.invalidation.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &CacheAdminConfig {
        &self.config
    }

    pub fn metrics(&self) -> Option<&Arc<PurgeMetrics>> {
        self.metrics.as_ref()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// True iff a host or socket is configured
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    /// Cached URLs grouped with their device variants and raw keys, at most
    /// `limit` URLs in scan order. Empty when the store is unreachable.
    pub async fn list_cached_urls(&self, limit: usize) -> Vec<UrlGroup> {
        let started = Instant::now();

        let entries = match self.store.connect().await {
            Ok(mut conn) => {
                self.scanner
                    .scan_matching(
                        &mut conn,
                        &self.scanner.codec().scan_pattern(),
                        self.config.listing_batch_size,
                        limit,
                        self.config.operation_deadline(),
                    )
                    .await
            }
            Err(e) => {
                warn!("Listing skipped, store unavailable: {}", e);
                Vec::new()
            }
        };

        let groups = build_url_listing(entries, limit);
        debug!("Listed {} cached URLs (limit {})", groups.len(), limit);

        if let Some(metrics) = &self.metrics {
            metrics.record_listing(groups.len(), started.elapsed());
        }
        groups
    }

    pub async fn flush_all(&self) -> u64 {
        self.invalidation.flush_all().await
    }

    pub async fn purge_keys(&self, keys: &[String]) -> u64 {
        self.invalidation.purge_by_keys(keys).await
    }

    pub async fn purge_url(&self, url: &str) -> u64 {
        self.invalidation.purge_by_url(url).await
    }

    pub fn invalidation(&self) -> &InvalidationService<S> {
        &self.invalidation
    }

    /// Report missing settings and try a connection
    pub async fn status(&self) -> ConfigStatus {
        let missing = self.config.missing_settings();
        let configured = self.config.is_configured();

        let (connected, error) = if configured {
            match self.store.connect().await {
                Ok(_) => (true, None),
                Err(e) if e.is_connection_failure() => {
                    warn!("Cache store unreachable: {}", e);
                    (false, Some(e.to_string()))
                }
                Err(e) => {
                    error!("Cache store check failed: {}", e);
                    (false, Some(e.to_string()))
                }
            }
        } else {
            (false, None)
        };

        if !missing.is_empty() {
            info!("Cache admin settings missing: {}", missing.join(", "));
        }

        ConfigStatus {
            configured,
            missing,
            connected,
            prefix: self.scanner.codec().prefix().to_string(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Device;
    use crate::store::MemoryStore;

    fn admin(store: &MemoryStore) -> CacheAdmin<MemoryStore> {
        CacheAdmin::new(store.clone(), CacheAdminConfig::with_host("localhost")).unwrap()
    }

    #[tokio::test]
    async fn test_list_cached_urls() {
        let store = MemoryStore::with_keys([
            "nginx-cache:httpsGETexample.com/aDesktop",
            "nginx-cache:httpsGETexample.com/aMobile",
            "nginx-cache:httpGETother.com/b",
        ]);
        let groups = admin(&store).list_cached_urls(DEFAULT_LISTING_LIMIT).await;

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].url, "example.com/a");
        assert_eq!(groups[0].devices, vec![Device::Desktop, Device::Mobile]);
        assert_eq!(groups[0].keys.len(), 2);
    }

    #[tokio::test]
    async fn test_listing_unreachable_is_empty() {
        let store = MemoryStore::with_keys(["nginx-cache:httpsGETexample.com/aDesktop"]);
        store.set_reachable(false);
        assert!(admin(&store).list_cached_urls(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_status_unconfigured() {
        let admin = CacheAdmin::new(MemoryStore::new(), CacheAdminConfig::default()).unwrap();
        let status = admin.status().await;

        assert!(!status.configured);
        assert!(!status.connected);
        assert_eq!(status.missing, vec!["host", "key_prefix"]);
        assert_eq!(status.prefix, "nginx-cache:");
    }

    #[tokio::test]
    async fn test_status_reports_connection_failure() {
        let store = MemoryStore::new();
        store.set_reachable(false);
        let status = admin(&store).status().await;

        assert!(status.configured);
        assert!(!status.connected);
        assert!(status
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Connection error")));
    }

    #[tokio::test]
    async fn test_status_reports_unusable_timeout() {
        let mut config = CacheAdminConfig::with_host("127.0.0.1");
        config.timeout_seconds = 1e20;
        let status = CacheAdmin::from_config(config).unwrap().status().await;

        assert!(status.configured);
        assert!(!status.connected);
        assert!(status
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("Configuration error")));
    }

    #[test]
    fn test_redis_admin_from_config() {
        let admin = CacheAdmin::from_config(CacheAdminConfig::default()).unwrap();
        assert!(!admin.is_configured());
    }
}
