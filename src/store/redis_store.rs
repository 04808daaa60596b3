//! Redis backend

use super::{CacheStore, StoreConnection};
use crate::config::CacheAdminConfig;
use crate::error::{CacheAdminError, Result};
use crate::models::ScanPage;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::debug;

/// Store backed by a Redis (or protocol compatible) server
#[derive(Debug, Clone)]
pub struct RedisStore {
    config: CacheAdminConfig,
}

impl RedisStore {
    pub fn new(config: &CacheAdminConfig) -> Self {
        RedisStore {
            config: config.clone(),
        }
    }

    /// Connection parameters derived from the configuration.
    ///
    /// A socket path wins over host/port. AUTH and SELECT are issued by the
    /// client during the connection handshake.
    pub fn connection_info(&self) -> Result<ConnectionInfo> {
        if !self.config.is_configured() {
            return Err(CacheAdminError::NotConfigured);
        }

        let addr = match self.config.socket_path.as_deref() {
            Some(path) => unix_addr(path)?,
            None => ConnectionAddr::Tcp(self.config.effective_host().to_string(), self.config.port),
        };

        Ok(ConnectionInfo {
            addr,
            redis: RedisConnectionInfo {
                db: self.config.db_index.unwrap_or(0),
                password: self.config.auth_token.clone(),
                ..Default::default()
            },
        })
    }
}

#[cfg(unix)]
fn unix_addr(path: &str) -> Result<ConnectionAddr> {
    Ok(ConnectionAddr::Unix(path.into()))
}

#[cfg(not(unix))]
fn unix_addr(path: &str) -> Result<ConnectionAddr> {
    Err(CacheAdminError::ConfigError(format!(
        "unix sockets are not supported on this platform: {}",
        path
    )))
}

#[async_trait]
impl CacheStore for RedisStore {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection> {
        let info = self.connection_info()?;
        let timeout = self.config.connect_timeout()?;
        let client = redis::Client::open(info)?;

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| CacheAdminError::Timeout(timeout.as_millis() as u64))?
            .map_err(handshake_error)?;

        debug!(
            "Connected to store (socket={:?}, host={}, db={:?})",
            self.config.socket_path,
            self.config.effective_host(),
            self.config.db_index
        );
        Ok(RedisConnection { conn })
    }
}

/// Any failure while opening the connection, including a rejected AUTH or
/// SELECT, means the store is unusable.
fn handshake_error(err: redis::RedisError) -> CacheAdminError {
    CacheAdminError::ConnectionError(err.to_string())
}

/// Open Redis connection; closed on drop
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

#[async_trait]
impl StoreConnection for RedisConnection {
    async fn scan(&mut self, pattern: &str, cursor: u64, count: usize) -> Result<ScanPage> {
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await?;
        Ok(ScanPage { keys, next_cursor })
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted: u64 = self.conn.del(keys).await?;
        Ok(deleted)
    }
}
