//! Upstream Module
//!
//! Client for the upstream registry's flat-container API.
//!
//! The proxy only needs one capability from the registry: GET a relative key,
//! optionally authorized, and get back a status and a byte stream.

mod http_client;

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use futures::Stream;

use crate::cache::CacheKey;
use crate::error::UpstreamError;

pub use http_client::HttpUpstreamClient;

/// Body of an upstream response.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

// == Upstream Response ==
/// Status and body returned by the upstream registry.
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: ByteStream,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, body: ByteStream) -> Self {
        Self { status, body }
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// == Upstream Client ==
/// Fetches artifacts from the upstream registry.
///
/// One attempt per call; retries belong to the caller.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// GETs `key` upstream. Only the `Authorization` header from `headers`
    /// is forwarded. Any HTTP status is a successful call; only transport
    /// failures are errors.
    async fn get(
        &self,
        key: &CacheKey,
        headers: &HeaderMap,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
