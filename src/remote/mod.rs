//! Remote library collaborators
//!
//! The orchestrator only talks to the library through these traits:
//! - [`MetadataResolver`] maps a reference + architecture to a descriptor
//! - [`Downloader`] streams image bytes to a local path
//!
//! [`LibraryClient`] implements both against the library HTTP API.

mod library;

pub use library::LibraryClient;

use crate::cancel::CancelToken;
use crate::reference::ArtifactReference;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// What the library reports about an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    /// Authoritative expected content hash
    pub content_hash: String,
    /// Architecture the descriptor was resolved for
    pub arch: String,
    /// Image size in bytes, when reported
    pub size: Option<u64>,
}

/// Errors from remote collaborators
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("not found")]
    NotFound,

    #[error("cancelled")]
    Cancelled,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Receives byte counts while a download is in flight
pub trait ProgressSink: Send + Sync {
    /// Called once before the first byte, with the size if known
    fn start(&self, total: Option<u64>);

    /// Called after each chunk is written
    fn advance(&self, bytes: u64);

    /// Called once when the transfer ends, successfully or not
    fn finish(&self);
}

/// Progress sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _total: Option<u64>) {}
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}

/// Resolves references to their remote descriptor
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Return [`RemoteError::NotFound`] when the library has no such image
    async fn resolve(
        &self,
        cancel: &CancelToken,
        reference: &ArtifactReference,
        arch: &str,
    ) -> Result<RemoteDescriptor, RemoteError>;
}

/// Transfers image bytes to a local path
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the image to `dest`, replacing any previous content.
    ///
    /// `dest` is created by the caller; implementations must not create
    /// it, so a path discarded after cancellation stays discarded.
    /// Must return [`RemoteError::Cancelled`] promptly once `cancel` fires.
    async fn download(
        &self,
        cancel: &CancelToken,
        dest: &Path,
        reference: &ArtifactReference,
        arch: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(), RemoteError>;
}
