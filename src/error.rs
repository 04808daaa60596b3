//! Error types for the cache administration crate

use thiserror::Error;

/// Result type alias for cache administration operations
pub type Result<T> = std::result::Result<T, CacheAdminError>;

/// Error types that can occur while talking to the cache store
#[derive(Error, Debug, Clone)]
pub enum CacheAdminError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Neither a socket path nor a host is configured
    #[error("Cache store is not configured")]
    NotConfigured,

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Store call timed out after {0} ms")]
    Timeout(u64),

    #[error("Operation deadline of {0} ms exceeded")]
    DeadlineExceeded(u64),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl From<std::io::Error> for CacheAdminError {
    fn from(err: std::io::Error) -> Self {
        CacheAdminError::IoError(err.to_string())
    }
}

impl From<redis::RedisError> for CacheAdminError {
    fn from(err: redis::RedisError) -> Self {
        let connection_failure = err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
            || matches!(
                err.kind(),
                redis::ErrorKind::AuthenticationFailed | redis::ErrorKind::InvalidClientConfig
            );

        if connection_failure {
            CacheAdminError::ConnectionError(err.to_string())
        } else {
            CacheAdminError::StoreError(err.to_string())
        }
    }
}

impl CacheAdminError {
    /// Whether the store could not be reached at all.
    ///
    /// Public operations degrade to an empty result on these instead of
    /// surfacing them to the caller.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            CacheAdminError::NotConfigured
                | CacheAdminError::ConnectionError(_)
                | CacheAdminError::Timeout(_)
        )
    }

    /// Convert error to HTTP status code
    pub fn to_http_status(&self) -> u16 {
        match self {
            CacheAdminError::ParseError(_) => 400,
            CacheAdminError::NotConfigured => 503,
            CacheAdminError::ConnectionError(_) => 503,
            CacheAdminError::Timeout(_) => 504,
            CacheAdminError::DeadlineExceeded(_) => 504,
            CacheAdminError::StoreError(_) => 502,
            CacheAdminError::ConfigError(_) => 500,
            CacheAdminError::HttpError(_) => 500,
            CacheAdminError::IoError(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_failures() {
        assert!(CacheAdminError::NotConfigured.is_connection_failure());
        assert!(CacheAdminError::ConnectionError("refused".into()).is_connection_failure());
        assert!(CacheAdminError::Timeout(1500).is_connection_failure());
        assert!(!CacheAdminError::StoreError("WRONGTYPE".into()).is_connection_failure());
        assert!(!CacheAdminError::ConfigError("port".into()).is_connection_failure());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(CacheAdminError::ParseError("json".into()).to_http_status(), 400);
        assert_eq!(CacheAdminError::NotConfigured.to_http_status(), 503);
        assert_eq!(CacheAdminError::Timeout(10).to_http_status(), 504);
        assert_eq!(CacheAdminError::StoreError("x".into()).to_http_status(), 502);
    }

    #[test]
    fn test_redis_io_error_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: CacheAdminError = redis::RedisError::from(io).into();
        assert!(matches!(err, CacheAdminError::ConnectionError(_)));
    }

    #[test]
    fn test_redis_type_error_is_store_error() {
        let err: CacheAdminError =
            redis::RedisError::from((redis::ErrorKind::TypeError, "bad reply")).into();
        assert!(matches!(err, CacheAdminError::StoreError(_)));
    }
}
