//! Configuration Module
//!
//! Handles loading and managing proxy configuration from environment variables.

use std::env;
use std::path::PathBuf;

use tracing::warn;

/// Default directory holding the cache tree.
pub const DEFAULT_CACHE_ROOT: &str = "nuget-cache";

/// Default cache budget in megabytes (1 GB).
pub const DEFAULT_MAX_CACHE_SIZE_MB: u64 = 1024;

/// Default upstream flat-container base URL.
pub const DEFAULT_UPSTREAM_BASE: &str = "https://api.nuget.org/v3/flatcontainer";

const MEGABYTE: u64 = 1024 * 1024;

/// Proxy configuration parameters.
///
/// Built once at startup and handed to the cache store and upstream client
/// constructors; nothing reads it from ambient globals afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that exclusively owns the cache tree
    pub cache_root: PathBuf,
    /// Maximum total size of cached artifacts, in megabytes
    pub max_cache_size_mb: u64,
    /// Upstream flat-container base URL
    pub upstream_base: String,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// Each setting is read from its primary key, then its upper-case alias.
    /// - `CacheRoot` / `CACHE_ROOT` - Cache directory (default: `nuget-cache`)
    /// - `MaxCacheSizeMB` / `MAX_CACHE_SIZE_MB` - Positive cache budget in MB (default: 1024)
    /// - `UpstreamBase` / `UPSTREAM_BASE` - Upstream base URL (default: nuget.org flat container)
    /// - `ServerPort` / `SERVER_PORT` - HTTP server port (default: 5000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &str, alias: &str| {
            lookup(primary)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(alias).filter(|v| !v.trim().is_empty()))
        };

        Self {
            cache_root: read("CacheRoot", "CACHE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_ROOT)),
            max_cache_size_mb: parse_cache_size_mb(
                read("MaxCacheSizeMB", "MAX_CACHE_SIZE_MB").as_deref(),
            ),
            upstream_base: read("UpstreamBase", "UPSTREAM_BASE")
                .unwrap_or_else(|| DEFAULT_UPSTREAM_BASE.to_string()),
            server_port: read("ServerPort", "SERVER_PORT")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5000),
        }
    }

    /// Cache capacity in bytes.
    pub fn max_cache_bytes(&self) -> u64 {
        self.max_cache_size_mb.saturating_mul(MEGABYTE)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            max_cache_size_mb: DEFAULT_MAX_CACHE_SIZE_MB,
            upstream_base: DEFAULT_UPSTREAM_BASE.to_string(),
            server_port: 5000,
        }
    }
}

/// Parses the configured cache size, falling back to the default for
/// absent, non-numeric or non-positive values.
fn parse_cache_size_mb(raw: Option<&str>) -> u64 {
    match raw.and_then(|v| v.trim().parse::<u64>().ok()) {
        Some(mb) if mb > 0 => mb,
        _ => {
            warn!(
                value = raw.unwrap_or("<unset>"),
                default_mb = DEFAULT_MAX_CACHE_SIZE_MB,
                "MaxCacheSizeMB missing or invalid, using default"
            );
            DEFAULT_MAX_CACHE_SIZE_MB
        }
    }
}
