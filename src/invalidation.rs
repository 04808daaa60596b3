//! Cache invalidation
//!
//! Every operation opens its own connection, walks the matching keys with a
//! [`KeyScan`] and deletes each non-empty page as it arrives. Store failures
//! never surface to callers: the loop stops, the keys deleted so far are
//! reported and a warning is logged.

use crate::config::{CacheAdminConfig, PurgeMatch};
use crate::error::Result;
use crate::key_codec::{strip_scheme, KeyCodec};
use crate::purge_metrics::{PurgeKind, PurgeMetrics};
use crate::scanner::{KeyScan, KeyScanner};
use crate::store::{CacheStore, StoreConnection};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Result of one invalidation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PurgeOutcome {
    /// Keys the store reported as deleted
    pub purged: u64,
    /// False when the run was cut short by a store failure or timeout
    pub complete: bool,
}

/// Deletes cache entries from a [`CacheStore`]
pub struct InvalidationService<S> {
    store: Arc<S>,
    scanner: KeyScanner,
    flush_batch_size: usize,
    purge_batch_size: usize,
    purge_match: PurgeMatch,
    deadline: Option<Duration>,
    metrics: Option<Arc<PurgeMetrics>>,
}

impl<S: CacheStore> InvalidationService<S> {
    pub fn new(store: Arc<S>, config: &CacheAdminConfig) -> Result<Self> {
        let scanner =
            KeyScanner::new(KeyCodec::new(config)?).with_scan_timeout(config.scan_timeout());
        Ok(InvalidationService {
            store,
            scanner,
            flush_batch_size: config.flush_batch_size,
            purge_batch_size: config.purge_batch_size,
            purge_match: config.purge_match,
            deadline: config.operation_deadline(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<PurgeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Delete every key under the cache prefix
    pub async fn flush_all(&self) -> u64 {
        self.flush_all_outcome().await.purged
    }

    pub async fn flush_all_outcome(&self) -> PurgeOutcome {
        let started = Instant::now();
        let pattern = self.scanner.codec().scan_pattern();

        let outcome = match self.store.connect().await {
            Ok(mut conn) => {
                let scan = self
                    .scanner
                    .scan(&mut conn, pattern, self.flush_batch_size)
                    .with_deadline(self.deadline);
                drain(scan, |_| true).await
            }
            Err(e) => {
                warn!("Flush skipped, store unavailable: {}", e);
                PurgeOutcome::default()
            }
        };

        info!("Flushed {} cache keys", outcome.purged);
        self.record(PurgeKind::All, outcome, started);
        outcome
    }

    /// Delete an explicit set of keys
    pub async fn purge_by_keys(&self, keys: &[String]) -> u64 {
        self.purge_by_keys_outcome(keys).await.purged
    }

    pub async fn purge_by_keys_outcome(&self, keys: &[String]) -> PurgeOutcome {
        if keys.is_empty() {
            return PurgeOutcome {
                purged: 0,
                complete: true,
            };
        }

        let started = Instant::now();
        let outcome = match self.store.connect().await {
            Ok(mut conn) => self.delete_chunks(&mut conn, keys).await,
            Err(e) => {
                warn!("Purge of {} keys skipped, store unavailable: {}", keys.len(), e);
                PurgeOutcome::default()
            }
        };

        info!("Purged {} of {} requested cache keys", outcome.purged, keys.len());
        self.record(PurgeKind::Keys, outcome, started);
        outcome
    }

    /// Delete every key stored for `url`, for all schemes and devices.
    ///
    /// With [`PurgeMatch::Substring`] any key whose URL part contains the
    /// scheme-less `url` is deleted, so `site.com/a` also removes
    /// `site.com/ab`. [`PurgeMatch::Exact`] keeps only keys whose decoded
    /// URL equals it.
    ///
    /// A `url` that is empty once trimmed and stripped of its scheme purges
    /// nothing and returns 0, rather than matching every key under the
    /// prefix. Use [`flush_all`](Self::flush_all) for that.
    pub async fn purge_by_url(&self, url: &str) -> u64 {
        self.purge_by_url_outcome(url).await.purged
    }

    pub async fn purge_by_url_outcome(&self, url: &str) -> PurgeOutcome {
        let target = strip_scheme(url.trim());
        if target.is_empty() {
            warn!("Refusing to purge an empty URL");
            return PurgeOutcome::default();
        }

        let started = Instant::now();
        let codec = self.scanner.codec();
        let exact = target.strip_suffix('/').unwrap_or(target);
        let pattern = match self.purge_match {
            PurgeMatch::Substring => codec.url_pattern(target),
            PurgeMatch::Exact => codec.url_pattern(exact),
        };

        let outcome = match self.store.connect().await {
            Ok(mut conn) => {
                let scan = self
                    .scanner
                    .scan(&mut conn, pattern, self.purge_batch_size)
                    .with_deadline(self.deadline);
                match self.purge_match {
                    PurgeMatch::Substring => drain(scan, |_| true).await,
                    PurgeMatch::Exact => drain(scan, |key| codec.decode(key).url == exact).await,
                }
            }
            Err(e) => {
                warn!("Purge of {} skipped, store unavailable: {}", url, e);
                PurgeOutcome::default()
            }
        };

        info!("Purged {} cache keys for {}", outcome.purged, url);
        self.record(PurgeKind::Url, outcome, started);
        outcome
    }

    async fn delete_chunks(&self, conn: &mut S::Connection, keys: &[String]) -> PurgeOutcome {
        let mut outcome = PurgeOutcome {
            purged: 0,
            complete: true,
        };
        let deadline_at = self.deadline.map(|d| (Instant::now(), d));

        for chunk in keys.chunks(self.purge_batch_size) {
            let remaining = deadline_at.map(|(start, d)| d.saturating_sub(start.elapsed()));
            match self.scanner.delete(conn, chunk, remaining).await {
                Ok(n) => outcome.purged += n,
                Err(e) => {
                    warn!("DEL of {} keys failed, stopping: {}", chunk.len(), e);
                    outcome.complete = false;
                    break;
                }
            }
        }
        outcome
    }

    fn record(&self, kind: PurgeKind, outcome: PurgeOutcome, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_purge(kind, outcome.purged, outcome.complete, started.elapsed());
        }
    }
}

/// Scan to the end, deleting every non-empty page of keys accepted by `keep`
async fn drain<C, F>(mut scan: KeyScan<'_, C>, keep: F) -> PurgeOutcome
where
    C: StoreConnection + ?Sized,
    F: Fn(&str) -> bool,
{
    let mut purged = 0;

    while let Some(keys) = scan.next_keys().await {
        let batch: Vec<String> = keys.into_iter().filter(|key| keep(key)).collect();
        if batch.is_empty() {
            continue;
        }
        match scan.delete(&batch).await {
            Ok(n) => {
                debug!("Deleted {} of {} keys matching {}", n, batch.len(), scan.pattern());
                purged += n;
            }
            Err(_) => break,
        }
    }

    PurgeOutcome {
        purged,
        complete: scan.completed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use prometheus::Registry;

    fn service(store: &MemoryStore, config: CacheAdminConfig) -> InvalidationService<MemoryStore> {
        InvalidationService::new(Arc::new(store.clone()), &config).unwrap()
    }

    fn seeded() -> MemoryStore {
        MemoryStore::with_keys([
            "nginx-cache:httpsGETexample.com/aDesktop",
            "nginx-cache:httpsGETexample.com/aMobile",
            "nginx-cache:httpsGETexample.com/abDesktop",
            "nginx-cache:httpGETother.com/b",
            "unrelated:key",
        ])
    }

    #[tokio::test]
    async fn test_flush_all_only_touches_prefix() {
        let store = seeded();
        let service = service(&store, CacheAdminConfig::with_host("localhost"));

        assert_eq!(service.flush_all().await, 4);
        assert_eq!(store.keys(), vec!["unrelated:key"]);
    }

    #[tokio::test]
    async fn test_flush_empty_store_issues_no_delete() {
        let store = MemoryStore::new();
        let service = service(&store, CacheAdminConfig::with_host("localhost"));

        assert_eq!(service.flush_all().await, 0);
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_purge_by_url_is_substring() {
        let store = seeded();
        let service = service(&store, CacheAdminConfig::with_host("localhost"));

        assert_eq!(service.purge_by_url("https://example.com/a").await, 3);
        assert!(store.contains("nginx-cache:httpGETother.com/b"));
    }

    #[tokio::test]
    async fn test_purge_by_url_exact() {
        let store = seeded();
        let mut config = CacheAdminConfig::with_host("localhost");
        config.purge_match = PurgeMatch::Exact;
        let service = service(&store, config);

        assert_eq!(service.purge_by_url("http://example.com/a/").await, 2);
        assert!(store.contains("nginx-cache:httpsGETexample.com/abDesktop"));
    }

    #[tokio::test]
    async fn test_purge_empty_url_deletes_nothing() {
        let store = seeded();
        let service = service(&store, CacheAdminConfig::with_host("localhost"));

        assert_eq!(service.purge_by_url("https://").await, 0);
        assert_eq!(service.purge_by_url("").await, 0);
        assert_eq!(service.purge_by_url("  http://  ").await, 0);
        assert_eq!(store.len(), 5);
        assert_eq!(store.scan_calls(), 0);
    }

    #[tokio::test]
    async fn test_purge_by_keys_chunks() {
        let store = MemoryStore::with_keys((0..7).map(|i| format!("k{}", i)));
        let mut config = CacheAdminConfig::with_host("localhost");
        config.purge_batch_size = 3;
        let service = service(&store, config);

        let keys: Vec<String> = (0..7).map(|i| format!("k{}", i)).collect();
        let outcome = service.purge_by_keys_outcome(&keys).await;
        assert_eq!(outcome.purged, 7);
        assert!(outcome.complete);
        assert_eq!(store.delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_to_zero() {
        let store = seeded();
        store.set_reachable(false);
        let service = service(&store, CacheAdminConfig::with_host("localhost"));

        assert_eq!(service.flush_all().await, 0);
        assert_eq!(service.purge_by_url("example.com").await, 0);
        assert_eq!(service.purge_by_keys(&["unrelated:key".to_string()]).await, 0);
        assert_eq!(store.len(), 5);
    }

    #[tokio::test]
    async fn test_metrics_recorded() {
        let store = seeded();
        let metrics = Arc::new(PurgeMetrics::with_registry(&Registry::new()).unwrap());
        let service = service(&store, CacheAdminConfig::with_host("localhost"))
            .with_metrics(metrics.clone());

        service.flush_all().await;
        assert_eq!(
            metrics.purge_items_total.with_label_values(&["all"]).get(),
            4.0
        );
        assert_eq!(
            metrics
                .purge_requests_by_result
                .with_label_values(&["all", "success"])
                .get(),
            1.0
        );
    }
}
