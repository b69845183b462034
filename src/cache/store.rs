//! Cache Store Module
//!
//! Size-bounded disk cache: an in-memory index over files under the cache
//! root, LRU eviction, and stage-then-rename commits.

use std::collections::HashMap;
use std::fs::FileTimes;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStats, LruTracker};
use crate::config::Config;
use crate::error::{Result, StorageError};

/// Subdirectory of the cache root holding committed entries.
const ENTRIES_DIR: &str = "v3";

/// Subdirectory of the cache root holding in-flight staging files.
const STAGING_DIR: &str = "staging";

// == Cached Object ==
/// An opened cache entry.
///
/// Holds the file handle, not the path: an eviction that unlinks the file
/// after `open` returns does not disturb reads already in progress.
#[derive(Debug)]
pub struct CachedObject {
    pub file: fs::File,
    pub len: u64,
}

// == Cache Index ==
/// Mutable state guarded by the store's mutex.
#[derive(Debug)]
struct CacheIndex {
    entries: HashMap<CacheKey, CacheEntry>,
    lru: LruTracker,
    total_bytes: u64,
    stats: CacheStats,
}

impl CacheIndex {
    fn new(capacity: u64) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            total_bytes: 0,
            stats: CacheStats::new(capacity),
        }
    }

    fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        self.lru.touch(&key, entry.last_accessed);
        self.total_bytes += entry.size;
        if let Some(old) = self.entries.insert(key, entry) {
            self.total_bytes -= old.size;
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.total_bytes -= entry.size;
        Some(entry)
    }

    fn touch(&mut self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let at = self.entries.get_mut(key)?.touch();
        self.lru.touch(key, at);
        Some(at)
    }

    fn size_of(&self, key: &CacheKey) -> u64 {
        self.entries.get(key).map(|e| e.size).unwrap_or(0)
    }

    // == Evict ==
    /// Deletes least recently used entries until `deficit` bytes are freed or
    /// no candidates remain. `keep` is never selected. Each candidate is
    /// visited once; a failed deletion is logged and skipped.
    ///
    /// Synchronous: each file deletion and its index update happen with no
    /// suspension point between them.
    fn evict(&mut self, entries_root: &Path, deficit: u64, keep: Option<&CacheKey>) -> u64 {
        let mut freed = 0u64;

        for key in self.lru.oldest_first() {
            if freed >= deficit {
                break;
            }
            if keep == Some(&key) {
                continue;
            }

            let path = key.resolve(entries_root);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(%key, "evicted entry was already gone from disk");
                }
                Err(e) => {
                    warn!(%key, error = %e, "failed to evict cache entry");
                    continue;
                }
            }

            if let Some(entry) = self.remove(&key) {
                freed += entry.size;
                self.stats.record_eviction();
                info!(%key, bytes = entry.size, "evicted cache entry");
            }
            prune_empty_dirs(entries_root, &path);
        }

        freed
    }
}

// == Cache Store ==
/// Disk cache with a fixed byte capacity.
///
/// Every mutation (capacity check, eviction, commit) and every last-access
/// update runs under one mutex. Streaming bytes in or out never holds it.
#[derive(Debug)]
pub struct CacheStore {
    /// `CacheRoot/v3`, parent of every entry
    entries_root: PathBuf,
    /// `CacheRoot/staging`, same filesystem as the entries
    staging_dir: PathBuf,
    /// Maximum sum of entry sizes in bytes
    capacity: u64,
    index: Arc<Mutex<CacheIndex>>,
}

impl CacheStore {
    // == Constructor ==
    /// Opens (or creates) a cache under `root` with a byte `capacity`.
    ///
    /// Removes staging files left by an interrupted process, rebuilds the
    /// index from the files on disk ordered by their access times, and evicts
    /// the oldest entries if the tree is already over capacity.
    pub async fn new(root: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        let root = root.as_ref();
        let entries_root = root.join(ENTRIES_DIR);
        let staging_dir = root.join(STAGING_DIR);
        fs::create_dir_all(&entries_root).await?;
        fs::create_dir_all(&staging_dir).await?;

        let (scan_root, scan_staging) = (entries_root.clone(), staging_dir.clone());
        let index = run_blocking(move || load_index(&scan_root, &scan_staging, capacity)).await?;

        info!(
            root = %entries_root.display(),
            entries = index.entries.len(),
            total_bytes = index.total_bytes,
            capacity,
            "Cache store initialized"
        );

        Ok(Self {
            entries_root,
            staging_dir,
            capacity,
            index: Arc::new(Mutex::new(index)),
        })
    }

    /// Opens the cache described by `config`.
    pub async fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.cache_root, config.max_cache_bytes()).await
    }

    // == Exists ==
    /// Returns true if an entry is currently stored for `key`.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        self.index.lock().await.entries.contains_key(key)
    }

    // == Open ==
    /// Opens the entry for `key` and refreshes its last-access time.
    ///
    /// The guard is released once the handle is open and the timestamp is
    /// recorded; reading happens without it.
    pub async fn open(&self, key: &CacheKey) -> Result<CachedObject> {
        let mut index = self.index.lock().await;
        let len = match index.entries.get(key) {
            Some(entry) => entry.size,
            None => return Err(StorageError::NotFound(key.to_string())),
        };

        let path = key.resolve(&self.entries_root);
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(%key, "indexed cache file vanished from disk");
                index.remove(key);
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let accessed = index.touch(key);
        drop(index);

        let std_file = file.into_std().await;
        let std_file = run_blocking(move || {
            if let Some(at) = accessed {
                record_access_time(&std_file, &path, at);
            }
            Ok(std_file)
        })
        .await?;

        Ok(CachedObject {
            file: fs::File::from_std(std_file),
            len,
        })
    }

    // == Put ==
    /// Stores `content` as the entry for `key`, replacing any prior entry.
    ///
    /// The stream is staged to a temporary file first; the entry becomes
    /// visible only through a single rename after capacity has been made.
    /// The staging file is removed on every failure path, including when
    /// this future is dropped mid-transfer. A stream that grows past the
    /// capacity is abandoned as soon as it does. Returns the stored size.
    pub async fn put<S>(&self, key: &CacheKey, mut content: S) -> Result<u64>
    where
        S: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let staging_dir = self.staging_dir.clone();
        let staged = run_blocking(move || {
            Ok(tempfile::Builder::new()
                .prefix("put-")
                .suffix(".tmp")
                .tempfile_in(&staging_dir)?)
        })
        .await?;
        let (std_file, staged_path) = staged.into_parts();
        let mut file = fs::File::from_std(std_file);

        let mut size = 0u64;
        while let Some(chunk) = content.next().await {
            let chunk = chunk.map_err(StorageError::Source)?;
            size += chunk.len() as u64;
            if size > self.capacity {
                warn!(%key, size, capacity = self.capacity, "object larger than cache capacity");
                return Err(StorageError::CapacityExceeded {
                    size,
                    capacity: self.capacity,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        // Once spawned, the commit finishes even if this future is dropped.
        let index = Arc::clone(&self.index).lock_owned().await;
        let entries_root = self.entries_root.clone();
        let capacity = self.capacity;
        let key = key.clone();
        run_blocking(move || commit(index, &entries_root, capacity, &key, staged_path, size)).await
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub async fn stats(&self) -> CacheStats {
        let index = self.index.lock().await;
        let mut stats = index.stats.clone();
        stats.set_occupancy(index.entries.len(), index.total_bytes);
        stats
    }

    /// Counts a request as a cache hit or miss.
    pub async fn record_lookup(&self, hit: bool) {
        let mut index = self.index.lock().await;
        if hit {
            index.stats.record_hit();
        } else {
            index.stats.record_miss();
        }
    }

    /// Current sum of entry sizes in bytes.
    pub async fn total_bytes(&self) -> u64 {
        self.index.lock().await.total_bytes
    }

    /// Configured capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Directory holding committed entries.
    pub fn entries_root(&self) -> &Path {
        &self.entries_root
    }
}

// == Commit ==
/// Makes room for `size` bytes and renames the staged file into place.
/// Runs on the blocking pool with the index guard held throughout.
fn commit(
    mut index: OwnedMutexGuard<CacheIndex>,
    entries_root: &Path,
    capacity: u64,
    key: &CacheKey,
    staged: TempPath,
    size: u64,
) -> Result<u64> {
    // The entry being replaced does not count against the new one.
    let current = index.total_bytes - index.size_of(key);
    if current + size > capacity {
        let deficit = current + size - capacity;
        let freed = index.evict(entries_root, deficit, Some(key));
        debug!(%key, deficit, freed, "eviction pass finished");
    }

    let current = index.total_bytes - index.size_of(key);
    if current + size > capacity {
        warn!(%key, size, current, capacity, "could not free enough cache space");
        return Err(StorageError::CapacityExceeded { size, capacity });
    }

    let final_path = key.resolve(entries_root);
    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    staged
        .persist(&final_path)
        .map_err(|e| StorageError::Io(e.error))?;

    let entry = CacheEntry::new(size);
    let at = entry.last_accessed;
    index.insert(key.clone(), entry);
    drop(index);

    if let Ok(committed) = std::fs::File::open(&final_path) {
        record_access_time(&committed, &final_path, at);
    }

    debug!(%key, size, "cache entry committed");
    Ok(size)
}

/// Runs filesystem work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(|e| StorageError::Io(e.into()))?
}

/// Removes empty ancestors of `path`, stopping at the entries root.
fn prune_empty_dirs(entries_root: &Path, path: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if current == entries_root || !current.starts_with(entries_root) {
            break;
        }
        // remove_dir refuses non-empty directories.
        if std::fs::remove_dir(current).is_err() {
            break;
        }
        debug!(dir = %current.display(), "removed empty cache directory");
        dir = current.parent();
    }
}

// == Startup Helpers ==

/// Builds the index from the tree on disk, evicting down to `capacity`.
fn load_index(entries_root: &Path, staging_dir: &Path, capacity: u64) -> Result<CacheIndex> {
    clean_orphaned_staging(staging_dir);

    let mut found = Vec::new();
    scan_entries(entries_root, entries_root, &mut found)?;
    found.sort_by(|(_, a), (_, b)| a.last_accessed.cmp(&b.last_accessed));

    let mut index = CacheIndex::new(capacity);
    for (key, entry) in found {
        index.insert(key, entry);
    }

    if index.total_bytes > capacity {
        let deficit = index.total_bytes - capacity;
        warn!(
            total_bytes = index.total_bytes,
            capacity, "cache tree exceeds capacity at startup, evicting"
        );
        index.evict(entries_root, deficit, None);
    }
    Ok(index)
}

/// Deletes staging files left behind by an interrupted process.
fn clean_orphaned_staging(staging_dir: &Path) {
    let Ok(entries) = std::fs::read_dir(staging_dir) else {
        return;
    };
    let mut cleaned = 0u64;
    for entry in entries.flatten() {
        let path = entry.path();
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to clean orphaned staging file");
        } else {
            cleaned += 1;
        }
    }
    if cleaned > 0 {
        info!(dir = %staging_dir.display(), cleaned, "cleaned orphaned staging files");
    }
}

/// Walks the entries tree collecting every file that maps to a valid key.
fn scan_entries(root: &Path, dir: &Path, found: &mut Vec<(CacheKey, CacheEntry)>) -> Result<()> {
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        let file_type = item.file_type()?;

        if file_type.is_dir() {
            scan_entries(root, &path, found)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let key = match CacheKey::from_relative_path(relative) {
            Ok(key) => key,
            Err(_) => {
                warn!(path = %path.display(), "skipping file that is not a valid cache key");
                continue;
            }
        };

        let meta = item.metadata()?;
        let accessed = meta
            .accessed()
            .or_else(|_| meta.modified())
            .unwrap_or_else(|_| SystemTime::now());
        found.push((key, CacheEntry::from_disk(meta.len(), accessed)));
    }
    Ok(())
}

/// Mirrors the index's last-access time onto the file so that the order
/// survives a restart. Failure only costs ordering accuracy after restart.
fn record_access_time(file: &std::fs::File, path: &Path, at: DateTime<Utc>) {
    let times = FileTimes::new().set_accessed(SystemTime::from(at));
    if let Err(e) = file.set_times(times) {
        debug!(path = %path.display(), error = %e, "could not update file access time");
    }
}
