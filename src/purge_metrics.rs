//! Prometheus metrics for cache invalidation and listing

use prometheus::{
    CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Invalidation operation, used as the `method` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurgeKind {
    All,
    Keys,
    Url,
}

impl PurgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurgeKind::All => "all",
            PurgeKind::Keys => "keys",
            PurgeKind::Url => "url",
        }
    }
}

/// Metrics for purge and listing operations
#[derive(Clone)]
pub struct PurgeMetrics {
    registry: Registry,

    /// Purge requests by method
    pub purge_requests_total: CounterVec,

    /// Purge requests by method and result (success/failure)
    pub purge_requests_by_result: CounterVec,

    /// Keys deleted by method
    pub purge_items_total: CounterVec,

    pub purge_duration_seconds: HistogramVec,

    /// URL listing requests
    pub listing_requests_total: IntCounter,

    /// URLs returned by listings
    pub listed_urls_total: IntCounter,

    pub listing_duration_seconds: Histogram,
}

impl PurgeMetrics {
    /// Register metrics with the process-wide default registry.
    ///
    /// Fails if called twice in one process; use [`PurgeMetrics::with_registry`]
    /// for independent instances.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(prometheus::default_registry())
    }

    /// Register metrics with a custom registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let purge_requests_total = CounterVec::new(
            Opts::new(
                "nginx_cache_admin_purge_requests_total",
                "Total number of cache purge requests",
            ),
            &["method"],
        )?;
        registry.register(Box::new(purge_requests_total.clone()))?;

        let purge_requests_by_result = CounterVec::new(
            Opts::new(
                "nginx_cache_admin_purge_requests_by_result",
                "Total number of purge requests by result",
            ),
            &["method", "result"],
        )?;
        registry.register(Box::new(purge_requests_by_result.clone()))?;

        let purge_items_total = CounterVec::new(
            Opts::new(
                "nginx_cache_admin_purge_items_total",
                "Total number of cache keys deleted",
            ),
            &["method"],
        )?;
        registry.register(Box::new(purge_items_total.clone()))?;

        let purge_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "nginx_cache_admin_purge_duration_seconds",
                "Duration of purge operations in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method"],
        )?;
        registry.register(Box::new(purge_duration_seconds.clone()))?;

        let listing_requests_total = IntCounter::new(
            "nginx_cache_admin_listing_requests_total",
            "Total number of cached URL listings",
        )?;
        registry.register(Box::new(listing_requests_total.clone()))?;

        let listed_urls_total = IntCounter::new(
            "nginx_cache_admin_listed_urls_total",
            "Total number of URLs returned by listings",
        )?;
        registry.register(Box::new(listed_urls_total.clone()))?;

        let listing_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "nginx_cache_admin_listing_duration_seconds",
                "Duration of cached URL listings in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(listing_duration_seconds.clone()))?;

        Ok(Self {
            registry: registry.clone(),
            purge_requests_total,
            purge_requests_by_result,
            purge_items_total,
            purge_duration_seconds,
            listing_requests_total,
            listed_urls_total,
            listing_duration_seconds,
        })
    }

    /// Record one finished purge.
    ///
    /// `success` is false when the store failed part way; `purged` still
    /// counts the keys deleted before the failure.
    pub fn record_purge(&self, kind: PurgeKind, purged: u64, success: bool, elapsed: Duration) {
        let method = kind.as_str();
        let result = if success { "success" } else { "failure" };

        self.purge_requests_total.with_label_values(&[method]).inc();
        self.purge_requests_by_result
            .with_label_values(&[method, result])
            .inc();
        self.purge_items_total
            .with_label_values(&[method])
            .inc_by(purged as f64);
        self.purge_duration_seconds
            .with_label_values(&[method])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_listing(&self, urls: usize, elapsed: Duration) {
        self.listing_requests_total.inc();
        self.listed_urls_total.inc_by(urls as u64);
        self.listing_duration_seconds.observe(elapsed.as_secs_f64());
    }

    /// Render every metric in the registry in Prometheus text format
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
