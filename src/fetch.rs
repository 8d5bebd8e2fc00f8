//! Fetch orchestration
//!
//! Resolves a reference to its content hash, makes sure exactly one
//! validated copy of the image exists (in the cache or at a caller path),
//! and gates the result behind signature verification.
//!
//! # Delivery Modes
//!
//! | Mode | Cache | Hash check | Result |
//! |------|-------|------------|--------|
//! | `CachedOnly` | used | always | cache entry |
//! | `DirectToPath` | bypassed | only with `strict_hash` | destination |
//! | `CachedThenCopyOut` | used | always | destination (atomic copy) |
//!
//! A cache entry is only finalized after the staged bytes hash to the
//! value the library reported. The staging area is owned by a
//! [`StagingGuard`] and is discarded on every exit path, including
//! cancellation.

use crate::cache::{CacheEntryManager, StagingGuard};
use crate::cancel::CancelToken;
use crate::error::{FetchError, FetchResult, Stage};
use crate::hash::Hasher;
use crate::reference::ArtifactReference;
use crate::relocate::{copy_atomic, DEFAULT_COPY_MODE};
use crate::remote::{
    Downloader, MetadataResolver, NoProgress, ProgressSink, RemoteDescriptor, RemoteError,
};
use crate::trust::{TrustConfig, TrustError, TrustOutcome, TrustVerifier};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of the temporary file used when pulling with the cache disabled
pub const TMP_CACHE_PREFIX: &str = "fetchgate-tmp-cache-";

/// Where a fetched image ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Fetch into the cache and return the cache entry
    CachedOnly,
    /// Download straight to the path, bypassing the cache
    DirectToPath(PathBuf),
    /// Fetch into the cache, then copy atomically to the path
    CachedThenCopyOut(PathBuf),
}

/// A successfully delivered image and its trust status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pulled {
    /// Signature verified
    Verified(PathBuf),
    /// Present and intact, but without a trusted signature
    Unsigned { path: PathBuf, reason: String },
}

impl Pulled {
    /// Path of the delivered image
    pub fn path(&self) -> &Path {
        match self {
            Self::Verified(path) | Self::Unsigned { path, .. } => path,
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    /// Apply a strict policy: unsigned images become a verification failure
    pub fn require_signed(self, reference: &ArtifactReference) -> FetchResult<PathBuf> {
        match self {
            Self::Verified(path) => Ok(path),
            Self::Unsigned { path, reason } => Err(FetchError::VerificationFailed {
                reference: reference.to_string(),
                path,
                reason: format!("image is not signed: {}", reason),
            }),
        }
    }
}

/// Knobs for the orchestrator
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Hash-check direct downloads as well
    pub strict_hash: bool,
    /// Directory for temporary downloads when the cache is disabled
    pub tmp_dir: PathBuf,
    /// Mode for newly created copy-out destinations, before umask
    pub copy_mode: u32,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            strict_hash: false,
            tmp_dir: std::env::temp_dir(),
            copy_mode: DEFAULT_COPY_MODE,
        }
    }
}

/// The fetch orchestrator.
///
/// Holds the collaborators; the cache handle is passed to every call so
/// its lifetime stays with the caller's session.
pub struct Fetcher {
    resolver: Arc<dyn MetadataResolver>,
    downloader: Arc<dyn Downloader>,
    hasher: Arc<dyn Hasher>,
    verifier: Arc<dyn TrustVerifier>,
    progress: Arc<dyn ProgressSink>,
    trust: TrustConfig,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        downloader: Arc<dyn Downloader>,
        hasher: Arc<dyn Hasher>,
        verifier: Arc<dyn TrustVerifier>,
    ) -> Self {
        Self {
            resolver,
            downloader,
            hasher,
            verifier,
            progress: Arc::new(NoProgress),
            trust: TrustConfig::default(),
            options: FetchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_trust_config(mut self, trust: TrustConfig) -> Self {
        self.trust = trust;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Pull into the cache. Fails with `CacheDisabled` if there is no cache.
    pub async fn pull_to_cache(
        &self,
        cancel: &CancelToken,
        cache: &dyn CacheEntryManager,
        reference: &ArtifactReference,
        arch: &str,
    ) -> FetchResult<PathBuf> {
        if cache.is_disabled() {
            return Err(FetchError::CacheDisabled {
                reference: reference.to_string(),
            });
        }
        self.fetch(cancel, cache, reference, arch, &DeliveryMode::CachedOnly)
            .await
    }

    /// Pull into the cache, or into a fresh temporary file when the cache
    /// is disabled. Returns the image path.
    pub async fn pull(
        &self,
        cancel: &CancelToken,
        cache: &dyn CacheEntryManager,
        reference: &ArtifactReference,
        arch: &str,
    ) -> FetchResult<PathBuf> {
        if !cache.is_disabled() {
            return self
                .fetch(cancel, cache, reference, arch, &DeliveryMode::CachedOnly)
                .await;
        }

        let dest = tempfile::Builder::new()
            .prefix(TMP_CACHE_PREFIX)
            .tempfile_in(&self.options.tmp_dir)
            .map_err(|e| {
                FetchError::io(
                    format!("creating tmp file in {}", self.options.tmp_dir.display()),
                    e,
                )
            })?
            .into_temp_path()
            .keep()
            .map_err(|e| FetchError::io("keeping tmp file", e.error))?;
        info!("Downloading library image to tmp cache: {}", dest.display());

        let result = self
            .fetch(
                cancel,
                cache,
                reference,
                arch,
                &DeliveryMode::DirectToPath(dest.clone()),
            )
            .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&dest).await;
        }
        result
    }

    /// Pull to `dest` through the cache (or directly when the cache is
    /// disabled), then verify signatures.
    ///
    /// An unsigned image is returned as [`Pulled::Unsigned`]; a rejected
    /// one is an error and stays at `dest` for inspection.
    pub async fn pull_to_path(
        &self,
        cancel: &CancelToken,
        cache: &dyn CacheEntryManager,
        reference: &ArtifactReference,
        arch: &str,
        dest: &Path,
    ) -> FetchResult<Pulled> {
        let mode = if cache.is_disabled() {
            debug!("Cache disabled, pulling directly to: {}", dest.display());
            DeliveryMode::DirectToPath(dest.to_path_buf())
        } else {
            DeliveryMode::CachedThenCopyOut(dest.to_path_buf())
        };

        let path = self.fetch(cancel, cache, reference, arch, &mode).await?;
        self.verify(cancel, reference, &path).await
    }

    /// Fetch `reference` for `arch` using the given delivery mode
    pub async fn fetch(
        &self,
        cancel: &CancelToken,
        cache: &dyn CacheEntryManager,
        reference: &ArtifactReference,
        arch: &str,
        mode: &DeliveryMode,
    ) -> FetchResult<PathBuf> {
        let descriptor = self.resolve(cancel, reference, arch).await?;

        let path = match mode {
            DeliveryMode::DirectToPath(dest) => {
                self.fetch_direct(cancel, reference, arch, &descriptor, dest)
                    .await?;
                dest.clone()
            }
            DeliveryMode::CachedOnly | DeliveryMode::CachedThenCopyOut(_) => {
                self.fetch_cached(cancel, cache, reference, arch, &descriptor)
                    .await?
            }
        };

        match mode {
            DeliveryMode::CachedThenCopyOut(dest) => {
                self.copy_out(reference, &path, dest).await?;
                Ok(dest.clone())
            }
            _ => Ok(path),
        }
    }

    /// Run the signature check on a delivered image
    pub async fn verify(
        &self,
        cancel: &CancelToken,
        reference: &ArtifactReference,
        path: &Path,
    ) -> FetchResult<Pulled> {
        let result = until_cancelled(cancel, self.verifier.verify(cancel, path, &self.trust))
            .await
            .ok_or_else(|| cancelled(reference, Stage::Verify))?;

        match result {
            Ok(TrustOutcome::Verified) => {
                info!(reference = %reference, "Image signature verified");
                Ok(Pulled::Verified(path.to_path_buf()))
            }
            Ok(TrustOutcome::UnverifiedAccepted { reason }) => {
                warn!(reference = %reference, "Image is not signed by a trusted key: {}", reason);
                Ok(Pulled::Unsigned {
                    path: path.to_path_buf(),
                    reason,
                })
            }
            Ok(TrustOutcome::Failed { reason }) => Err(FetchError::VerificationFailed {
                reference: reference.to_string(),
                path: path.to_path_buf(),
                reason,
            }),
            Err(TrustError::Cancelled) => Err(cancelled(reference, Stage::Verify)),
            Err(e) => Err(FetchError::VerificationFailed {
                reference: reference.to_string(),
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    async fn resolve(
        &self,
        cancel: &CancelToken,
        reference: &ArtifactReference,
        arch: &str,
    ) -> FetchResult<RemoteDescriptor> {
        let result = until_cancelled(cancel, self.resolver.resolve(cancel, reference, arch))
            .await
            .ok_or_else(|| cancelled(reference, Stage::Resolve))?;

        match result {
            Ok(descriptor) => {
                debug!(
                    reference = %reference,
                    arch,
                    hash = %descriptor.content_hash,
                    "Resolved library image"
                );
                Ok(descriptor)
            }
            Err(RemoteError::NotFound) => Err(FetchError::NotFound {
                reference: reference.to_string(),
                arch: arch.to_string(),
            }),
            Err(RemoteError::Cancelled) => Err(cancelled(reference, Stage::Resolve)),
            Err(e) => Err(FetchError::Resolve {
                reference: reference.to_string(),
                arch: arch.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn fetch_direct(
        &self,
        cancel: &CancelToken,
        reference: &ArtifactReference,
        arch: &str,
        descriptor: &RemoteDescriptor,
        dest: &Path,
    ) -> FetchResult<()> {
        // Downloaders only write into existing files
        tokio::fs::File::create(dest)
            .await
            .map_err(|e| FetchError::Download {
                reference: reference.to_string(),
                arch: arch.to_string(),
                reason: format!("unable to create {}: {}", dest.display(), e),
            })?;

        info!(reference = %reference, "Downloading library image");
        self.download(cancel, reference, arch, dest).await?;

        if !self.options.strict_hash {
            // Only the signature check guards direct downloads
            debug!("Direct download, skipping hash check against library");
            return Ok(());
        }

        let actual = self.hash_file(cancel, reference, dest).await?;
        if actual != descriptor.content_hash {
            warn!(
                reference = %reference,
                expected = %descriptor.content_hash,
                actual = %actual,
                "Hash mismatch on direct download, removing {}",
                dest.display()
            );
            let _ = tokio::fs::remove_file(dest).await;
            return Err(FetchError::HashMismatch {
                reference: reference.to_string(),
                expected: descriptor.content_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    async fn fetch_cached(
        &self,
        cancel: &CancelToken,
        cache: &dyn CacheEntryManager,
        reference: &ArtifactReference,
        arch: &str,
        descriptor: &RemoteDescriptor,
    ) -> FetchResult<PathBuf> {
        let hash = &descriptor.content_hash;
        let mut guard = StagingGuard::lookup(cache, hash).map_err(|e| FetchError::CacheLookup {
            reference: reference.to_string(),
            hash: hash.clone(),
            reason: e.to_string(),
        })?;

        if guard.entry().exists {
            info!(reference = %reference, hash = %hash, "Using cached image");
            return Ok(guard.entry().final_path.clone());
        }

        info!(reference = %reference, hash = %hash, "Downloading library image");
        let staging = guard.entry().staging_path.clone();
        self.download(cancel, reference, arch, &staging).await?;

        let actual = self.hash_file(cancel, reference, &staging).await?;
        if actual != *hash {
            warn!(
                reference = %reference,
                expected = %hash,
                actual = %actual,
                "Downloaded image does not match library hash"
            );
            return Err(FetchError::HashMismatch {
                reference: reference.to_string(),
                expected: hash.clone(),
                actual,
            });
        }

        guard.finalize().map_err(|e| FetchError::Finalize {
            reference: reference.to_string(),
            hash: hash.clone(),
            reason: e.to_string(),
        })?;
        debug!(hash = %hash, "Cache entry finalized");
        Ok(guard.entry().final_path.clone())
    }

    async fn download(
        &self,
        cancel: &CancelToken,
        reference: &ArtifactReference,
        arch: &str,
        dest: &Path,
    ) -> FetchResult<()> {
        let download =
            self.downloader
                .download(cancel, dest, reference, arch, Arc::clone(&self.progress));
        let result = until_cancelled(cancel, download)
            .await
            .ok_or_else(|| cancelled(reference, Stage::Download))?;

        match result {
            Ok(()) => Ok(()),
            Err(RemoteError::Cancelled) => Err(cancelled(reference, Stage::Download)),
            Err(e) => Err(FetchError::Download {
                reference: reference.to_string(),
                arch: arch.to_string(),
                reason: format!("unable to download image: {}", e),
            }),
        }
    }

    async fn hash_file(
        &self,
        cancel: &CancelToken,
        reference: &ArtifactReference,
        path: &Path,
    ) -> FetchResult<String> {
        let hasher = Arc::clone(&self.hasher);
        let owned = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || hasher.hash(&owned));

        let joined = until_cancelled(cancel, task)
            .await
            .ok_or_else(|| cancelled(reference, Stage::Hash))?;

        joined
            .map_err(|e| FetchError::Internal(format!("hash task failed: {}", e)))?
            .map_err(|source| FetchError::HashCompute {
                reference: reference.to_string(),
                path: path.to_path_buf(),
                source,
            })
    }

    async fn copy_out(
        &self,
        reference: &ArtifactReference,
        src: &Path,
        dst: &Path,
    ) -> FetchResult<()> {
        let (from, to, mode) = (src.to_path_buf(), dst.to_path_buf(), self.options.copy_mode);
        debug!("Copying {} to {}", src.display(), dst.display());

        tokio::task::spawn_blocking(move || copy_atomic(&from, &to, mode))
            .await
            .map_err(|e| FetchError::Internal(format!("copy task failed: {}", e)))?
            .map_err(|source| FetchError::Copy {
                reference: reference.to_string(),
                src: src.to_path_buf(),
                dst: dst.to_path_buf(),
                source,
            })
    }
}

/// Run `fut` unless `cancel` fires first; `None` means cancelled
async fn until_cancelled<F: Future>(cancel: &CancelToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

fn cancelled(reference: &ArtifactReference, stage: Stage) -> FetchError {
    info!(reference = %reference, %stage, "Pull cancelled");
    FetchError::Cancelled {
        reference: reference.to_string(),
        stage,
    }
}
