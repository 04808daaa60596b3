//! Runs against a real Redis server when `REDIS_URL` or `NGINX_REDIS_HOST`
//! is set, and does nothing otherwise.
//!
//! ```bash
//! NGINX_REDIS_HOST=127.0.0.1 NGINX_REDIS_DB=15 cargo test --test test_redis_live
//! ```

use nginx_cache_admin::{CacheAdmin, CacheAdminConfig, Device, KeyCodec};
use redis::{AsyncCommands, IntoConnectionInfo};

fn live_config() -> Option<CacheAdminConfig> {
    if let Ok(url) = std::env::var("REDIS_URL") {
        let info = url.as_str().into_connection_info().ok()?;
        let mut config = CacheAdminConfig::default();
        match info.addr {
            redis::ConnectionAddr::Tcp(host, port) => {
                config.host = Some(host);
                config.port = port;
            }
            #[cfg(unix)]
            redis::ConnectionAddr::Unix(path) => {
                config.socket_path = Some(path.to_string_lossy().into_owned());
            }
            _ => return None,
        }
        config.db_index = Some(info.redis.db);
        config.auth_token = info.redis.password;
        config.key_prefix = Some(format!("cache-admin-test-{}:", std::process::id()));
        return Some(config);
    }

    std::env::var("NGINX_REDIS_HOST").ok()?;
    let mut config = CacheAdminConfig::from_env().ok()?;
    config.key_prefix = Some(format!("cache-admin-test-{}:", std::process::id()));
    Some(config)
}

#[tokio::test]
async fn test_live_list_and_purge() {
    let Some(config) = live_config() else {
        eprintln!("REDIS_URL / NGINX_REDIS_HOST not set, skipping live Redis test");
        return;
    };

    let codec = KeyCodec::new(&config).unwrap();
    let admin = CacheAdmin::from_config(config.clone()).unwrap();

    let store = admin.store();
    let client = redis::Client::open(store.connection_info().unwrap()).unwrap();
    let mut conn = client.get_multiplexed_async_connection().await.unwrap();

    let keys = [
        codec.encode("https://example.com/a", Device::Desktop),
        codec.encode("https://example.com/a", Device::Mobile),
        codec.encode("https://example.com/b", Device::Desktop),
        codec.encode("http://other.com/c", Device::All),
    ];
    for key in &keys {
        let _: () = conn.set(key, "<html></html>").await.unwrap();
    }

    let status = admin.status().await;
    assert!(status.connected);

    let groups = admin.list_cached_urls(10).await;
    assert_eq!(groups.len(), 2);

    assert_eq!(admin.purge_url("https://example.com/a").await, 2);
    assert_eq!(admin.purge_keys(&[keys[2].clone()]).await, 1);
    assert_eq!(admin.flush_all().await, 1);
    assert!(admin.list_cached_urls(10).await.is_empty());
}
