//! Content hashing of downloaded images
//!
//! The library identifies images by `sha256.<hex>`, the SHA-256 of the
//! whole image file.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Prefix the library puts in front of a hex SHA-256 digest
pub const HASH_PREFIX: &str = "sha256.";

const READ_CHUNK: usize = 64 * 1024;

/// Computes the content hash of a file on disk
pub trait Hasher: Send + Sync {
    /// Hash the file at `path` in the same format the resolver reports
    fn hash(&self, path: &Path) -> io::Result<String>;
}

/// SHA-256 hasher producing library-style `sha256.<hex>` strings
#[derive(Debug, Clone, Copy, Default)]
pub struct LibraryHasher;

impl Hasher for LibraryHasher {
    fn hash(&self, path: &Path) -> io::Result<String> {
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; READ_CHUNK];

        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(format!("{}{}", HASH_PREFIX, hex::encode(hasher.finalize())))
    }
}
