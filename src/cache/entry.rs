//! Cache Entry Module
//!
//! Index metadata kept in memory for every artifact on disk.

use std::time::SystemTime;

use chrono::{DateTime, Utc};

// == Cache Entry ==
/// Size and recency of one cached artifact.
///
/// The bytes themselves live on disk; this is the index record used for
/// capacity accounting and eviction ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Length of the file in bytes
    pub size: u64,
    /// Last time the entry was written or opened
    pub last_accessed: DateTime<Utc>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry accessed right now.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            last_accessed: Utc::now(),
        }
    }

    /// Creates an entry from timestamps found on disk.
    pub fn from_disk(size: u64, accessed: SystemTime) -> Self {
        Self {
            size,
            last_accessed: DateTime::<Utc>::from(accessed),
        }
    }

    // == Touch ==
    /// Refreshes the last-access timestamp and returns it.
    pub fn touch(&mut self) -> DateTime<Utc> {
        self.last_accessed = Utc::now();
        self.last_accessed
    }
}
