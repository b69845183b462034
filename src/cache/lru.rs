//! LRU Tracker Module
//!
//! Orders cache keys by last-access time for eviction.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::cache::CacheKey;

/// Position of a key in the recency order: access time, then a monotonic
/// sequence number so equal timestamps still order totally.
type Rank = (DateTime<Utc>, u64);

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys are ranked by ascending last-access timestamp; the first key in
/// the order is the least recently used.
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Keys by rank, oldest first
    order: BTreeMap<Rank, CacheKey>,
    /// Current rank of every tracked key
    ranks: HashMap<CacheKey, Rank>,
    /// Next tie-break sequence number
    next_seq: u64,
}

impl LruTracker {
    // == Constructor ==
    /// Creates a new empty LRU tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Records an access to `key` at `at`, replacing any previous rank.
    pub fn touch(&mut self, key: &CacheKey, at: DateTime<Utc>) {
        self.remove(key);
        let rank = (at, self.next_seq);
        self.next_seq += 1;
        self.order.insert(rank, key.clone());
        self.ranks.insert(key.clone(), rank);
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &CacheKey) {
        if let Some(rank) = self.ranks.remove(key) {
            self.order.remove(&rank);
        }
    }

    // == Oldest First ==
    /// Snapshot of all tracked keys, least recently used first.
    pub fn oldest_first(&self) -> Vec<CacheKey> {
        self.order.values().cloned().collect()
    }

    // == Peek Oldest ==
    /// Returns the least recently used key without removing it.
    #[allow(dead_code)]
    pub fn peek_oldest(&self) -> Option<&CacheKey> {
        self.order.values().next()
    }

    // == Length ==
    /// Returns the number of tracked keys.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    // == Is Empty ==
    /// Returns true if no keys are tracked.
    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    // == Contains ==
    /// Checks if a key is being tracked.
    #[allow(dead_code)]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.ranks.contains_key(key)
    }
}
