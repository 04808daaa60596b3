//! Nginx full-page cache administration
//!
//! Inspect and invalidate the full-page cache that an nginx + Redis
//! front end keeps for a web application. Every cached response lives under
//! a key such as
//!
//! ```text
//! nginx-cache:httpsGETexample.com/blogDesktop
//! ```
//!
//! This crate decodes those keys back into URLs and device classes, lists
//! cached URLs grouped by device, and deletes entries by prefix, by URL or
//! by explicit key. It never writes cache entries.
//!
//! # Overview
//!
//! - [`KeyCodec`]: key grammar, decoding, encoding and SCAN patterns
//! - [`CacheStore`] / [`StoreConnection`]: connect, cursor SCAN and DEL,
//!   implemented by [`RedisStore`] and the in-process [`MemoryStore`]
//! - [`KeyScanner`]: paged, time-bounded scans that filter and decode keys
//! - [`build_url_listing`]: groups decoded entries by URL
//! - [`InvalidationService`]: flush-all, purge-by-keys, purge-by-url
//! - [`CacheAdmin`]: the facade the HTTP surface and other callers use
//! - [`PurgeHandler`]: JSON over HTTP, including the `PURGE` method
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use nginx_cache_admin::{CacheAdmin, CacheAdminConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CacheAdminConfig::from_env()?;
//! let admin = CacheAdmin::from_config(config)?;
//!
//! for group in admin.list_cached_urls(50).await {
//!     println!("{} {:?}", group.url, group.devices);
//! }
//!
//! let purged = admin.purge_url("https://example.com/blog").await;
//! println!("Purged {} keys", purged);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Loaded from YAML or from the `NGINX_REDIS_*` environment variables:
//!
//! ```yaml
//! host: "127.0.0.1"
//! port: 6379
//! timeout_seconds: 1.5
//! db_index: 0
//! key_prefix: "nginx-cache:"
//! purge_match: substring
//! listen_address: "127.0.0.1:8080"
//! ```
//!
//! See [`CacheAdminConfig`] for every option.
//!
//! # Error Handling
//!
//! Lower layers return [`CacheAdminError`]. The public listing and
//! invalidation operations do not: an unreachable store yields an empty
//! listing or a count of zero, and a store failure part way through a
//! purge returns the keys deleted so far.
//!
//! ```rust,no_run
//! use nginx_cache_admin::{CacheAdminConfig, CacheAdminError};
//!
//! # fn main() {
//! match CacheAdminConfig::from_file("cache-admin.yaml") {
//!     Ok(config) => println!("Configured: {}", config.is_configured()),
//!     Err(CacheAdminError::ConfigError(msg)) => eprintln!("Config error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```

pub mod admin;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod key_codec;
pub mod models;
pub mod purge_handler; // HTTP surface, including PURGE
pub mod purge_metrics; // Prometheus metrics for purge operations
pub mod scanner;
pub mod store;

// Re-export commonly used types
pub use admin::{CacheAdmin, ConfigStatus, DEFAULT_LISTING_LIMIT};
pub use aggregator::{build_url_listing, UrlAggregator};
pub use config::{CacheAdminConfig, PurgeMatch, DEFAULT_KEY_PREFIX, MAX_TIMEOUT_SECONDS};
pub use error::{CacheAdminError, Result};
pub use invalidation::{InvalidationService, PurgeOutcome};
pub use key_codec::KeyCodec;
pub use models::{DecodedEntry, Device, ScanPage, UrlGroup};
pub use purge_handler::{PurgeHandler, PurgeResponse};
pub use purge_metrics::{PurgeKind, PurgeMetrics};
pub use scanner::{KeyScan, KeyScanner};
pub use store::{CacheStore, MemoryStore, RedisStore, StoreConnection};
