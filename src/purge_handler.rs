//! HTTP surface for cache administration
//!
//! Routes:
//! - `GET /urls?limit=N` - cached URLs grouped by device (default 1000)
//! - `GET /status` - configuration status and a connection test
//! - `GET /metrics` - Prometheus text exposition
//! - `POST /purge-keys` - body `{"keys": [...]}`, delete those keys
//! - `PURGE /*` with `X-Purge-All: true` - flush every cache key
//! - `PURGE /path` - purge the URL built from `Host`, `X-Forwarded-Proto`
//!   and the request path

use crate::admin::{CacheAdmin, DEFAULT_LISTING_LIMIT};
use crate::error::{CacheAdminError, Result};
use crate::store::CacheStore;
use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PURGE_METHOD: &str = "PURGE";

/// PURGE response body
#[derive(Debug, Serialize, Deserialize)]
pub struct PurgeResponse {
    pub success: bool,
    pub purged_count: u64,
    pub url: Option<String>,
    pub message: String,
}

/// Body of `POST /purge-keys`
#[derive(Debug, Deserialize)]
pub struct PurgeKeysRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Urls,
    Status,
    Metrics,
    PurgeKeys,
    Other,
}

impl Route {
    fn from_path(path: &str) -> Self {
        match path {
            "/urls" => Route::Urls,
            "/status" => Route::Status,
            "/metrics" => Route::Metrics,
            "/purge-keys" => Route::PurgeKeys,
            _ => Route::Other,
        }
    }
}

/// Request handler over a shared [`CacheAdmin`]
pub struct PurgeHandler<S> {
    admin: Arc<CacheAdmin<S>>,
}

impl<S> Clone for PurgeHandler<S> {
    fn clone(&self) -> Self {
        PurgeHandler {
            admin: self.admin.clone(),
        }
    }
}

impl<S: CacheStore> PurgeHandler<S> {
    pub fn new(admin: Arc<CacheAdmin<S>>) -> Self {
        Self { admin }
    }

    pub fn admin(&self) -> &CacheAdmin<S> {
        &self.admin
    }

    /// Handle one request. Failures become JSON error responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match self.route(req).await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} {} failed: {}", method, path, e);
                let status = StatusCode::from_u16(e.to_http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                error_response(status, &e.to_string())
            }
        }
    }

    async fn route<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Display,
    {
        let route = Route::from_path(req.uri().path());
        let method = req.method().clone();
        debug!("{} {}", method, req.uri());

        if method.as_str() == PURGE_METHOD {
            return self.handle_purge(req).await;
        }

        match (&method, route) {
            (&Method::GET, Route::Urls) => self.list_urls(&req).await,
            (&Method::GET, Route::Status) => {
                let status = self.admin.status().await;
                json_response(StatusCode::OK, &status)
            }
            (&Method::GET, Route::Metrics) => self.render_metrics(),
            (&Method::POST, Route::PurgeKeys) => self.purge_keys(req).await,
            (_, Route::Other) => Ok(error_response(StatusCode::NOT_FOUND, "Not found")),
            _ => Ok(error_response(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed",
            )),
        }
    }

    async fn list_urls<B>(&self, req: &Request<B>) -> Result<Response<Full<Bytes>>> {
        let limit = parse_limit(req.uri().query())?;
        let groups = self.admin.list_cached_urls(limit).await;
        json_response(StatusCode::OK, &groups)
    }

    fn render_metrics(&self) -> Result<Response<Full<Bytes>>> {
        let Some(metrics) = self.admin.metrics() else {
            return Ok(error_response(StatusCode::NOT_FOUND, "Metrics are disabled"));
        };
        let text = metrics
            .render()
            .map_err(|e| CacheAdminError::HttpError(format!("Failed to render metrics: {}", e)))?;

        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
            .body(Full::new(Bytes::from(text)))
            .map_err(|e| CacheAdminError::HttpError(format!("Failed to build response: {}", e)))
    }

    async fn purge_keys<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Display,
    {
        self.ensure_configured()?;

        let body = req
            .into_body()
            .collect()
            .await
            .map_err(|e| CacheAdminError::HttpError(format!("Failed to read body: {}", e)))?
            .to_bytes();
        let request: PurgeKeysRequest = serde_json::from_slice(&body)
            .map_err(|e| CacheAdminError::ParseError(format!("Invalid purge-keys body: {}", e)))?;

        let purged_count = self.admin.purge_keys(&request.keys).await;
        info!("Purged {} of {} keys via HTTP", purged_count, request.keys.len());

        json_response(
            StatusCode::OK,
            &PurgeResponse {
                success: true,
                purged_count,
                url: None,
                message: format!("Purged {} of {} keys", purged_count, request.keys.len()),
            },
        )
    }

    async fn handle_purge<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>> {
        self.ensure_configured()?;

        let purge_all = header_value(&req, "x-purge-all")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if purge_all {
            info!("Purging all cache entries");
            let purged_count = self.admin.flush_all().await;
            return json_response(
                StatusCode::OK,
                &PurgeResponse {
                    success: true,
                    purged_count,
                    url: None,
                    message: format!("Purged all {} cache entries", purged_count),
                },
            );
        }

        let url = request_url(&req);
        let purged_count = self.admin.purge_url(&url).await;
        let message = if purged_count > 0 {
            format!("Purged {} cache entries for {}", purged_count, url)
        } else {
            format!("No cache entries found for {}", url)
        };

        json_response(
            StatusCode::OK,
            &PurgeResponse {
                success: true,
                purged_count,
                url: Some(url),
                message,
            },
        )
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.admin.is_configured() {
            Ok(())
        } else {
            Err(CacheAdminError::NotConfigured)
        }
    }
}

fn header_value<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|h| h.to_str().ok())
}

/// Full URL a PURGE request refers to
fn request_url<B>(req: &Request<B>) -> String {
    let host = header_value(req, "host").unwrap_or("localhost");
    let scheme = match header_value(req, "x-forwarded-proto") {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    };
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}://{}{}", scheme, host, path)
}

fn parse_limit(query: Option<&str>) -> Result<usize> {
    let value = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "limit")
        .map(|(_, value)| value);

    match value {
        None => Ok(DEFAULT_LISTING_LIMIT),
        Some(v) => v
            .parse()
            .map_err(|_| CacheAdminError::ParseError(format!("Invalid limit: {}", v))),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Result<Response<Full<Bytes>>> {
    let json = serde_json::to_vec(body)
        .map_err(|e| CacheAdminError::HttpError(format!("Failed to serialize response: {}", e)))?;

    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Full::new(Bytes::from(json)))
        .map_err(|e| CacheAdminError::HttpError(format!("Failed to build response: {}", e)))
}

fn error_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let body = PurgeResponse {
        success: false,
        purged_count: 0,
        url: None,
        message: message.to_string(),
    };

    json_response(status, &body).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from(message.to_string())));
        *response.status_mut() = status;
        response
    })
}
