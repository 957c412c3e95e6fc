#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Content-addressed cache for computed risk surfaces.
//!
//! Keys are SHA-256 digests over a sorted `name=value` parameter list, so
//! identical requests always land on the same entry regardless of the order
//! the parameters were supplied in. Entries are never evicted or expired;
//! pruning the cache directory is left to the deployment.
//!
//! Unreadable or corrupted entries are reported as misses, never as errors.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};

use risk_map_risk_models::RiskSurface;
use sha2::{Digest, Sha256};

/// Errors that can occur while writing a cache entry.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem error.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be serialized.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A deterministic cache key (lowercase hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Hashes `prefix` together with every parameter.
    ///
    /// Parameters are sorted by name before hashing. A repeated name keeps
    /// its last value.
    #[must_use]
    pub fn from_params<'a, I>(prefix: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let sorted: BTreeMap<&str, String> = params.into_iter().collect();

        let mut canonical = String::from(prefix);
        for (name, value) in &sorted {
            canonical.push('|');
            canonical.push_str(name);
            canonical.push('=');
            canonical.push_str(value);
        }

        Self(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// The hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage for computed surfaces, keyed by [`CacheKey`].
///
/// Concurrent writers to the same key are allowed; the last write wins.
pub trait ResultCache: Send + Sync {
    /// Returns the stored surface, or `None` on a miss or an unreadable entry.
    fn get(&self, key: &CacheKey) -> Option<RiskSurface>;

    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the entry cannot be serialized or written.
    fn put(&self, key: &CacheKey, value: &RiskSurface) -> Result<(), CacheError>;
}

/// Distinguishes temp files from concurrent writers in the same process.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A cache that stores one JSON file per key under `root/namespace/`.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Creates a file cache rooted at `root`, storing entries under the
    /// `namespace` subdirectory. Directories are created lazily on first
    /// write.
    #[must_use]
    pub fn new(root: &Path, namespace: &str) -> Self {
        Self {
            dir: root.join(namespace),
        }
    }

    /// Directory holding this cache's entries.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl ResultCache for FileCache {
    fn get(&self, key: &CacheKey) -> Option<RiskSurface> {
        let path = self.entry_path(key);

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Unreadable cache entry {}: {e}", path.display());
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(surface) => Some(surface),
            Err(e) => {
                log::warn!("Corrupted cache entry {}: {e}", path.display());
                None
            }
        }
    }

    fn put(&self, key: &CacheKey, value: &RiskSurface) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir)?;

        let bytes = serde_json::to_vec(value)?;
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .dir
            .join(format!("{key}.json.{}.{seq}.tmp", std::process::id()));

        std::fs::write(&tmp, bytes)?;
        if let Err(e) = std::fs::rename(&tmp, self.entry_path(key)) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }

        Ok(())
    }
}

/// A process-local cache, mostly useful for tests and ephemeral runs.
///
/// Entries are whole values, so a lock poisoned by a panicking writer still
/// guards a consistent map and is used as is.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<BTreeMap<CacheKey, RiskSurface>>,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been stored yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResultCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<RiskSurface> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn put(&self, key: &CacheKey, value: &RiskSurface) -> Result<(), CacheError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), value.clone());
        Ok(())
    }
}
