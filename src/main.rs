//! Nginx Cache Admin Server
//!
//! Serves the cache administration HTTP surface. Configuration comes from
//! a YAML file (with `NGINX_REDIS_*` variables overriding it) or, without a
//! file argument, from the environment alone.

use anyhow::Context;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use nginx_cache_admin::{
    CacheAdmin, CacheAdminConfig, CacheStore, Device, KeyCodec, MemoryStore, PurgeHandler,
    PurgeMetrics,
};
use std::convert::Infallible;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// # Usage
/// ```bash
/// # Configure from NGINX_REDIS_* environment variables
/// nginx-cache-admin
///
/// # Configure from a file
/// nginx-cache-admin /etc/nginx-cache-admin.yaml
///
/// # Serve a seeded in-memory store instead of Redis
/// nginx-cache-admin --memory
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Starting Nginx Cache Admin Server");

    let args: Vec<String> = env::args().skip(1).collect();
    let use_memory = args.iter().any(|a| a == "--memory");
    let config_path = args.iter().find(|a| !a.starts_with("--"));

    let mut config = match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            let mut config = CacheAdminConfig::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path))?;
            config
                .apply_env_overrides()
                .context("Invalid NGINX_REDIS_* override")?;
            config
        }
        None => {
            info!("Loading configuration from NGINX_REDIS_* environment variables");
            CacheAdminConfig::from_env().context("Invalid NGINX_REDIS_* configuration")?
        }
    };

    info!("Configuration loaded successfully");
    info!("  - Socket: {:?}", config.socket_path);
    info!("  - Host: {:?}, port {}", config.host, config.port);
    info!("  - Database: {:?}", config.db_index);
    info!("  - Key prefix: {}", config.prefix());
    info!("  - Purge match: {:?}", config.purge_match);
    info!("  - Listen address: {}", config.listen_address);

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .with_context(|| format!("Invalid listen address {}", config.listen_address))?;

    let metrics = if config.enable_metrics {
        Some(Arc::new(
            PurgeMetrics::new().context("Failed to register metrics")?,
        ))
    } else {
        None
    };

    if use_memory {
        if !config.is_configured() {
            config.host = Some("memory".to_string());
        }
        let store = seeded_memory_store(&config)?;
        info!("Serving in-memory store with {} keys", store.len());
        let admin = CacheAdmin::new(store, config)?;
        serve(admin, metrics, addr).await
    } else {
        let admin = CacheAdmin::from_config(config)?;
        if !admin.is_configured() {
            warn!("No host or socket configured; set NGINX_REDIS_HOST or NGINX_REDIS_SOCKET");
        }
        serve(admin, metrics, addr).await
    }
}

async fn serve<S>(
    admin: CacheAdmin<S>,
    metrics: Option<Arc<PurgeMetrics>>,
    addr: SocketAddr,
) -> anyhow::Result<()>
where
    S: CacheStore + 'static,
{
    let admin = match metrics {
        Some(metrics) => admin.with_metrics(metrics),
        None => admin,
    };

    let status = admin.status().await;
    if status.connected {
        info!("Store reachable, prefix {}", status.prefix);
    } else {
        warn!(
            "Store not reachable: {}",
            status.error.as_deref().unwrap_or("not configured")
        );
    }

    let handler = PurgeHandler::new(Arc::new(admin));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on http://{}", addr);
    info!("  curl http://{}/urls?limit=50", addr);
    info!("  curl -X PURGE http://{}/blog -H 'Host: example.com'", addr);
    info!("  curl -X PURGE http://{}/* -H 'X-Purge-All: true'", addr);

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let handler = handler.clone();
                async move { Ok::<Response<Full<Bytes>>, Infallible>(handler.handle(req).await) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!("Connection error from {}: {}", peer_addr, err);
            }
        });
    }
}

fn seeded_memory_store(config: &CacheAdminConfig) -> anyhow::Result<MemoryStore> {
    let codec = KeyCodec::new(config)?;
    let store = MemoryStore::new();

    let pages = [
        "https://example.com/",
        "https://example.com/blog",
        "https://example.com/blog/hello-world",
        "http://example.com/about?lang=en",
        "https://shop.example.com/cart",
    ];
    for url in pages {
        store.insert(codec.encode(url, Device::Desktop));
        store.insert(codec.encode(url, Device::Mobile));
    }
    store.insert(codec.encode("https://example.com/feed", Device::All));

    Ok(store)
}
