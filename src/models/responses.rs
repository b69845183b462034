//! Response DTOs for the proxy API
//!
//! Defines the structure of outgoing JSON response bodies.

use serde::Serialize;

use crate::cache::CacheStats;

/// `@type` advertised for the flat-container resource.
pub const PACKAGE_BASE_ADDRESS_TYPE: &str = "PackageBaseAddress/3.0.0";

/// Response body for the service index (GET /v3/index.json)
#[derive(Debug, Clone, Serialize)]
pub struct ServiceIndex {
    /// Protocol version, always "3.0.0"
    pub version: String,
    /// Resources offered by this feed
    pub resources: Vec<ServiceResource>,
}

/// One resource entry of the service index.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceResource {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub resource_type: String,
    pub comment: String,
}

impl ServiceIndex {
    /// Builds the index advertising this proxy's flat container at
    /// `<scheme>://<host>/v3/flatcontainer/`.
    pub fn for_feed(scheme: &str, host: &str) -> Self {
        Self {
            version: "3.0.0".to_string(),
            resources: vec![ServiceResource {
                id: format!("{scheme}://{host}/v3/flatcontainer/"),
                resource_type: PACKAGE_BASE_ADDRESS_TYPE.to_string(),
                comment: "Base URL for cached packages".to_string(),
            }],
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of requests served from cache
    pub hits: u64,
    /// Number of requests that went upstream
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Current number of cached artifacts
    pub total_entries: usize,
    /// Current bytes on disk
    pub total_bytes: u64,
    /// Configured capacity in bytes
    pub capacity_bytes: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            total_bytes: stats.total_bytes,
            capacity_bytes: stats.capacity_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_index_serialize() {
        let index = ServiceIndex::for_feed("https", "example.com");
        let json = serde_json::to_value(&index).unwrap();

        assert_eq!(json["version"], "3.0.0");
        let resources = json["resources"].as_array().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["@id"], "https://example.com/v3/flatcontainer/");
        assert_eq!(resources[0]["@type"], "PackageBaseAddress/3.0.0");
        assert_eq!(resources[0]["comment"], "Base URL for cached packages");
    }

    #[test]
    fn test_stats_response_hit_rate() {
        let mut stats = CacheStats::new(100);
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();

        let resp = StatsResponse::from(stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.capacity_bytes, 100);
    }
}
