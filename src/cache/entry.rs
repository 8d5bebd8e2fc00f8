//! Cache entry handles and the staging guard
//!
//! A [`CacheEntry`] is bound to one content hash. When the entry does not
//! exist yet the caller writes into `staging_path` and then finalizes;
//! the [`StagingGuard`] discards the staging area on every other exit path.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Errors raised by a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache is disabled")]
    Disabled,

    #[error("invalid content hash {0:?}")]
    InvalidHash(String),

    #[error("entry {hash} has no staged content")]
    NotStaged { hash: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Single-use handle to one cache slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Content hash the entry is keyed by
    pub hash: String,
    /// Whether a finalized copy is already present
    pub exists: bool,
    /// Where new content must be written before finalizing
    pub staging_path: PathBuf,
    /// Where the finalized content lives
    pub final_path: PathBuf,
}

/// Cache Entry Manager contract.
///
/// Implementations must keep finalize safe under concurrent identical
/// writes: two callers may stage the same hash at once and both finalize.
pub trait CacheEntryManager: Send + Sync {
    /// Whether caching is switched off for this session
    fn is_disabled(&self) -> bool;

    /// Look up (or reserve staging for) the entry keyed by `hash`
    fn lookup(&self, hash: &str) -> Result<CacheEntry, CacheError>;

    /// Move staged content into place, making it visible to future lookups
    fn finalize(&self, entry: &mut CacheEntry) -> Result<(), CacheError>;

    /// Discard the staging area. Idempotent, a no-op after finalize.
    fn cleanup_staging(&self, entry: &CacheEntry);
}

/// Owns a [`CacheEntry`] and discards its staging area when dropped
pub struct StagingGuard<'a> {
    cache: &'a dyn CacheEntryManager,
    entry: CacheEntry,
}

impl<'a> StagingGuard<'a> {
    /// Look up `hash` and guard the returned entry
    pub fn lookup(cache: &'a dyn CacheEntryManager, hash: &str) -> Result<Self, CacheError> {
        let entry = cache.lookup(hash)?;
        Ok(Self { cache, entry })
    }

    /// The guarded entry
    pub fn entry(&self) -> &CacheEntry {
        &self.entry
    }

    /// Finalize the staged content
    pub fn finalize(&mut self) -> Result<(), CacheError> {
        self.cache.finalize(&mut self.entry)
    }
}

impl fmt::Debug for StagingGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingGuard")
            .field("entry", &self.entry)
            .finish()
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        debug!(hash = %self.entry.hash, "Cleaning up cache staging area");
        self.cache.cleanup_staging(&self.entry);
    }
}
