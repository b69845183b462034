//! Proxy Module
//!
//! Cache-aside orchestration: serve from the disk cache when possible,
//! otherwise fetch upstream, commit the result, and serve the committed copy.
//!
//! Concurrent misses for the same key are not coalesced. Each request
//! fetches upstream on its own and the later commit overwrites the earlier
//! one; a single-flight layer would slot in around `fetch_upstream`.

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, error, info, instrument};

use crate::cache::{CacheKey, CacheStore, CachedObject};
use crate::error::{ProxyError, StorageError};
use crate::upstream::UpstreamClient;

// == Fetch Outcome ==
/// Where served bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Cache,
    Upstream,
}

/// Result of a proxied fetch that is not an error.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Bytes to serve with a success status
    Served {
        object: CachedObject,
        source: CacheSource,
    },
    /// Upstream answered with a non-success status; pass it through
    Forwarded(StatusCode),
}

// == Proxy Service ==
/// Ties the cache store to the upstream client.
#[derive(Clone)]
pub struct ProxyService {
    store: Arc<CacheStore>,
    upstream: Arc<dyn UpstreamClient>,
}

impl ProxyService {
    pub fn new(store: Arc<CacheStore>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { store, upstream }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    // == Fetch ==
    /// Serves `raw_key` from cache or upstream.
    ///
    /// An entry evicted between the existence check and the open is treated
    /// as a plain miss.
    #[instrument(skip(self, headers), fields(key = %raw_key))]
    pub async fn fetch(&self, raw_key: &str, headers: &HeaderMap) -> Result<FetchOutcome, ProxyError> {
        let key = CacheKey::parse(raw_key)?;

        if self.store.exists(&key).await {
            match self.store.open(&key).await {
                Ok(object) => {
                    self.store.record_lookup(true).await;
                    debug!(bytes = object.len, "cache hit");
                    return Ok(FetchOutcome::Served {
                        object,
                        source: CacheSource::Cache,
                    });
                }
                Err(StorageError::NotFound(_)) => {
                    debug!("entry evicted before open, treating as miss");
                }
                Err(e) => {
                    error!(error = %e, "failed to open cached entry");
                    return Err(e.into());
                }
            }
        }

        self.store.record_lookup(false).await;
        self.fetch_upstream(&key, headers).await
    }

    /// Miss path: fetch, commit, then re-open what was committed.
    async fn fetch_upstream(
        &self,
        key: &CacheKey,
        headers: &HeaderMap,
    ) -> Result<FetchOutcome, ProxyError> {
        let response = self.upstream.get(key, headers).await?;

        if !response.status.is_success() {
            info!(status = %response.status, "forwarding upstream status");
            return Ok(FetchOutcome::Forwarded(response.status));
        }

        let size = self.store.put(key, response.body).await.map_err(|e| {
            error!(error = %e, "failed to store upstream response");
            ProxyError::from(e)
        })?;
        info!(bytes = size, "cached upstream artifact");

        let object = self.store.open(key).await.map_err(|e| {
            error!(error = %e, "failed to reopen committed entry");
            ProxyError::from(e)
        })?;

        Ok(FetchOutcome::Served {
            object,
            source: CacheSource::Upstream,
        })
    }
}
