//! Cache Key Module
//!
//! Validated flat-container keys that always resolve inside the cache root.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::error::{Result, StorageError};

// == Cache Key ==
/// A slash-separated relative path identifying a cached artifact,
/// e.g. `newtonsoft.json/13.0.3/newtonsoft.json.13.0.3.nupkg`.
///
/// Construction rejects anything that could escape the cache root: empty
/// segments, `.`/`..`, backslashes, drive prefixes and NUL bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    // == Parse ==
    /// Builds a key from a request path, stripping leading separators.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::InvalidKey(raw.to_string()));
        }

        for segment in trimmed.split('/') {
            let bad = segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['\\', ':', '\0']);
            if bad {
                return Err(StorageError::InvalidKey(raw.to_string()));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    // == From Relative Path ==
    /// Rebuilds a key from a path relative to the cache root (startup scan).
    pub fn from_relative_path(path: &Path) -> Result<Self> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => match part.to_str() {
                    Some(s) => segments.push(s),
                    None => {
                        return Err(StorageError::InvalidKey(path.display().to_string()));
                    }
                },
                _ => return Err(StorageError::InvalidKey(path.display().to_string())),
            }
        }
        Self::parse(&segments.join("/"))
    }

    /// The key as a slash-separated string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    // == Resolve ==
    /// Resolves the on-disk location of this key under `root`, mapping `/`
    /// to the platform separator.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.0.split('/'));
        path
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
