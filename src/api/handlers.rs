//! API Handlers
//!
//! HTTP request handlers for each proxy endpoint.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use tokio_util::io::ReaderStream;

use crate::cache::CacheStore;
use crate::config::Config;
use crate::error::ProxyError;
use crate::models::{ServiceIndex, StatsResponse};
use crate::proxy::{CacheSource, FetchOutcome, ProxyService};
use crate::upstream::{HttpUpstreamClient, UpstreamClient};

/// Header telling clients whether the bytes came from the local cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub proxy: ProxyService,
}

impl AppState {
    /// Creates a new AppState from a store and an upstream client.
    pub fn new(store: Arc<CacheStore>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self {
            proxy: ProxyService::new(store, upstream),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Opens the cache store (scanning any existing tree) and builds the
    /// HTTP upstream client.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let store = CacheStore::from_config(config).await?;
        let upstream = HttpUpstreamClient::from_config(config)?;
        Ok(Self::new(Arc::new(store), Arc::new(upstream)))
    }
}

/// Handler for GET /v3/index.json
///
/// Advertises this proxy's flat container, addressed the way the client
/// reached us.
pub async fn index_handler(uri: Uri, headers: HeaderMap) -> Json<ServiceIndex> {
    let scheme = uri
        .scheme_str()
        .map(str::to_string)
        .or_else(|| header_str(&headers, "x-forwarded-proto"))
        .unwrap_or_else(|| "http".to_string());
    let host = header_str(&headers, header::HOST.as_str())
        .or_else(|| uri.authority().map(|a| a.to_string()))
        .unwrap_or_else(|| "localhost".to_string());

    Json(ServiceIndex::for_feed(&scheme, &host))
}

/// Handler for GET /v3/flatcontainer/*key
///
/// Streams the artifact from cache, fetching and caching it first on a miss.
/// Upstream non-success statuses are passed through unchanged.
pub async fn package_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ProxyError> {
    match state.proxy.fetch(&key, &headers).await? {
        FetchOutcome::Served { object, source } => {
            let cache_status = match source {
                CacheSource::Cache => "HIT",
                CacheSource::Upstream => "MISS",
            };
            let body = Body::from_stream(ReaderStream::new(object.file));

            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_LENGTH, object.len.to_string()),
                ],
                [(CACHE_STATUS_HEADER, cache_status)],
                body,
            )
                .into_response())
        }
        FetchOutcome::Forwarded(status) => Ok(status.into_response()),
    }
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.proxy.store().stats().await.into())
}

/// Handler for GET /health
pub async fn health_handler() -> &'static str {
    "OK"
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_index_uses_absolute_uri() {
        let uri: Uri = "https://example.com/v3/index.json".parse().unwrap();

        let Json(index) = index_handler(uri, HeaderMap::new()).await;

        assert_eq!(index.resources.len(), 1);
        assert_eq!(index.resources[0].id, "https://example.com/v3/flatcontainer/");
        assert_eq!(index.resources[0].resource_type, "PackageBaseAddress/3.0.0");
    }

    #[tokio::test]
    async fn test_index_prefers_host_and_forwarded_proto() {
        let uri: Uri = "/v3/index.json".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, "feed.internal:5000".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());

        let Json(index) = index_handler(uri, headers).await;

        assert_eq!(
            index.resources[0].id,
            "https://feed.internal:5000/v3/flatcontainer/"
        );
    }

    #[tokio::test]
    async fn test_index_defaults_to_http_localhost() {
        let uri: Uri = "/v3/index.json".parse().unwrap();

        let Json(index) = index_handler(uri, HeaderMap::new()).await;

        assert_eq!(index.resources[0].id, "http://localhost/v3/flatcontainer/");
    }

    #[tokio::test]
    async fn test_health_handler() {
        assert_eq!(health_handler().await, "OK");
    }
}
