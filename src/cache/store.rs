//! Filesystem-backed image cache
//!
//! Layout under the cache root:
//!
//! | Path | Contents |
//! |------|----------|
//! | `library/<hash>` | Finalized, immutable images |
//! | `tmp/<hash>.<uuid>` | Staging files for in-flight downloads |
//!
//! Staging names are unique per lookup, so concurrent pulls of the same
//! hash never share a staging file. Finalize is a rename; the last writer
//! wins and, since content is hash-checked before finalize, every writer
//! puts identical bytes in place.

use crate::cache::entry::{CacheEntry, CacheEntryManager, CacheError};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

const LIBRARY_DIR: &str = "library";
const STAGING_DIR: &str = "tmp";

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// A finalized image found in the cache
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub hash: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Utc>,
}

/// Image cache rooted at a directory, or disabled
#[derive(Debug, Clone)]
pub struct FsCache {
    root: Option<PathBuf>,
}

impl FsCache {
    /// Open (creating if needed) a cache rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        for dir in [root.join(LIBRARY_DIR), root.join(STAGING_DIR)] {
            fs::create_dir_all(&dir)
                .map_err(|e| CacheError::io(format!("creating {}", dir.display()), e))?;
        }
        debug!("Opened image cache at {}", root.display());
        Ok(Self { root: Some(root) })
    }

    /// A cache handle that reports itself disabled
    pub fn disabled() -> Self {
        Self { root: None }
    }

    /// Default cache root for this user
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fetchgate")
    }

    /// Cache root, `None` when disabled
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn enabled_root(&self) -> Result<&Path, CacheError> {
        self.root.as_deref().ok_or(CacheError::Disabled)
    }

    /// List finalized images, newest first
    pub fn list(&self) -> Result<Vec<CachedImage>, CacheError> {
        let dir = self.enabled_root()?.join(LIBRARY_DIR);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(format!("reading {}", dir.display()), e)),
        };

        let mut images = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CacheError::io(format!("reading {}", dir.display()), e))?;
            let meta = entry
                .metadata()
                .map_err(|e| CacheError::io(format!("stat {}", entry.path().display()), e))?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            images.push(CachedImage {
                hash: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                size_bytes: meta.len(),
                modified,
            });
        }

        images.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(images)
    }

    /// Remove every finalized image and staging file. Returns images removed.
    pub fn clean(&self) -> Result<usize, CacheError> {
        let root = self.enabled_root()?;
        let removed = self.list()?.len();

        for name in [LIBRARY_DIR, STAGING_DIR] {
            let dir = root.join(name);
            match fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(format!("removing {}", dir.display()), e)),
            }
            fs::create_dir_all(&dir)
                .map_err(|e| CacheError::io(format!("creating {}", dir.display()), e))?;
        }

        info!(removed, "Cleaned image cache at {}", root.display());
        Ok(removed)
    }
}

impl CacheEntryManager for FsCache {
    fn is_disabled(&self) -> bool {
        self.root.is_none()
    }

    fn lookup(&self, hash: &str) -> Result<CacheEntry, CacheError> {
        let root = self.enabled_root()?;
        validate_hash(hash)?;

        let final_path = root.join(LIBRARY_DIR).join(hash);
        let staging_path = root
            .join(STAGING_DIR)
            .join(format!("{}.{}", hash, Uuid::new_v4().simple()));
        let exists = final_path.is_file();

        if !exists {
            // Reserve the staging name so nobody else can claim it
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&staging_path)
                .map_err(|e| {
                    CacheError::io(format!("creating staging file {}", staging_path.display()), e)
                })?;
        }

        debug!(hash, exists, "Cache lookup");
        Ok(CacheEntry {
            hash: hash.to_string(),
            exists,
            staging_path,
            final_path,
        })
    }

    fn finalize(&self, entry: &mut CacheEntry) -> Result<(), CacheError> {
        if entry.exists {
            return Ok(());
        }
        if !entry.staging_path.is_file() {
            return Err(CacheError::NotStaged {
                hash: entry.hash.clone(),
            });
        }

        if let Err(e) = fs::rename(&entry.staging_path, &entry.final_path) {
            // Another writer finalized identical content first
            if !entry.final_path.is_file() {
                return Err(CacheError::io(
                    format!(
                        "moving {} to {}",
                        entry.staging_path.display(),
                        entry.final_path.display()
                    ),
                    e,
                ));
            }
            debug!(hash = %entry.hash, "Entry finalized concurrently, keeping existing copy");
        }

        entry.exists = true;
        Ok(())
    }

    fn cleanup_staging(&self, entry: &CacheEntry) {
        match fs::remove_file(&entry.staging_path) {
            Ok(()) => debug!("Removed staging file {}", entry.staging_path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => debug!(
                "Could not remove staging file {}: {}",
                entry.staging_path.display(),
                e
            ),
        }
    }
}

/// Hashes are opaque but become file names, so they must be a single
/// plain path component
fn validate_hash(hash: &str) -> Result<(), CacheError> {
    let valid = !hash.is_empty()
        && hash != "."
        && hash != ".."
        && hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidHash(hash.to_string()))
    }
}
