//! reqwest-backed upstream client.

use std::io;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use futures::TryStreamExt;
use tracing::{debug, warn};

use super::{UpstreamClient, UpstreamResponse};
use crate::cache::CacheKey;
use crate::config::Config;
use crate::error::UpstreamError;

/// Upstream client talking HTTP to a flat-container base URL.
#[derive(Debug, Clone)]
pub struct HttpUpstreamClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstreamClient {
    /// Creates a client for `base_url`, e.g.
    /// `https://api.nuget.org/v3/flatcontainer`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("nuget_cache_proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UpstreamError::Connectivity(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        Self::new(config.upstream_base.clone())
    }

    /// Absolute upstream URL for `key`.
    pub fn url_for(&self, key: &CacheKey) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn get(
        &self,
        key: &CacheKey,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.url_for(key);
        let mut request = self.client.get(&url);
        if let Some(auth) = headers.get(header::AUTHORIZATION) {
            request = request.header(header::AUTHORIZATION, auth.clone());
        }

        debug!(%url, "fetching from upstream");
        let response = request.send().await.map_err(|e| {
            warn!(%url, error = %e, "upstream request failed");
            UpstreamError::Connectivity(e.to_string())
        })?;

        let status = response.status();
        let body = response.bytes_stream().map_err(io::Error::other);

        Ok(UpstreamResponse::new(status, Box::pin(body)))
    }
}
