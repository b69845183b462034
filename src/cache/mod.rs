//! Cache Module
//!
//! Size-bounded disk cache with least-recently-used eviction and atomic
//! commits.

mod entry;
mod key;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use key::CacheKey;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::{CachedObject, CacheStore};
