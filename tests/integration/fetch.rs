//! Orchestrator tests against in-memory collaborators

use async_trait::async_trait;
use fetchgate::cache::{CacheEntryManager, FsCache};
use fetchgate::hash::Hasher;
use fetchgate::remote::{
    Downloader, MetadataResolver, ProgressSink, RemoteDescriptor, RemoteError,
};
use fetchgate::trust::{TrustConfig, TrustError, TrustOutcome, TrustVerifier};
use fetchgate::{
    ArtifactReference, CancelToken, DeliveryMode, FetchError, FetchOptions, Fetcher, Pulled, Stage,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// How the library double answers
#[derive(Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Serve,
    /// Writes part of the payload, then waits for cancellation
    Stall,
    /// Resolve answers with HTTP 500
    BrokenResolve,
    /// Download writes part of the payload, then answers with HTTP 500
    BrokenDownload,
}

/// Library double: reports `hash` and serves `payload`
struct FakeLibrary {
    hash: Option<String>,
    payload: Vec<u8>,
    behavior: Behavior,
    downloads: AtomicUsize,
}

impl FakeLibrary {
    fn with(hash: Option<&str>, payload: &[u8], behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            hash: hash.map(str::to_string),
            payload: payload.to_vec(),
            behavior,
            downloads: AtomicUsize::new(0),
        })
    }

    fn serving(hash: &str, payload: &[u8]) -> Arc<Self> {
        Self::with(Some(hash), payload, Behavior::Serve)
    }

    fn missing() -> Arc<Self> {
        Self::with(None, b"", Behavior::Serve)
    }

    fn stalling(hash: &str) -> Arc<Self> {
        Self::with(Some(hash), b"partial", Behavior::Stall)
    }

    fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataResolver for FakeLibrary {
    async fn resolve(
        &self,
        _cancel: &CancelToken,
        _reference: &ArtifactReference,
        arch: &str,
    ) -> Result<RemoteDescriptor, RemoteError> {
        if self.behavior == Behavior::BrokenResolve {
            return Err(RemoteError::Status(500));
        }
        let hash = self.hash.clone().ok_or(RemoteError::NotFound)?;
        Ok(RemoteDescriptor {
            content_hash: hash,
            arch: arch.to_string(),
            size: Some(self.payload.len() as u64),
        })
    }
}

#[async_trait]
impl Downloader for FakeLibrary {
    async fn download(
        &self,
        cancel: &CancelToken,
        dest: &Path,
        _reference: &ArtifactReference,
        _arch: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(), RemoteError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        progress.start(Some(self.payload.len() as u64));
        // Like real downloaders, only write into a file the caller created
        std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(dest)?
            .write_all(&self.payload)?;
        progress.advance(self.payload.len() as u64);

        match self.behavior {
            Behavior::Stall => {
                cancel.cancelled().await;
                Err(RemoteError::Cancelled)
            }
            Behavior::BrokenDownload => Err(RemoteError::Status(500)),
            Behavior::Serve | Behavior::BrokenResolve => {
                progress.finish();
                Ok(())
            }
        }
    }
}

/// Treats the file content as its own hash
#[derive(Default)]
struct ContentHasher {
    calls: AtomicUsize,
}

impl Hasher for ContentHasher {
    fn hash(&self, path: &Path) -> std::io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(std::fs::read_to_string(path)?.trim().to_string())
    }
}

/// Returns a fixed outcome and records the paths it was asked about
struct ScriptedVerifier {
    outcome: TrustOutcome,
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedVerifier {
    fn new(outcome: TrustOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrustVerifier for ScriptedVerifier {
    async fn verify(
        &self,
        _cancel: &CancelToken,
        path: &Path,
        _config: &TrustConfig,
    ) -> Result<TrustOutcome, TrustError> {
        self.seen.lock().unwrap().push(path.to_path_buf());
        Ok(self.outcome.clone())
    }
}

struct Harness {
    temp: TempDir,
    cache: FsCache,
    library: Arc<FakeLibrary>,
    hasher: Arc<ContentHasher>,
    verifier: Arc<ScriptedVerifier>,
    fetcher: Fetcher,
}

impl Harness {
    fn new(library: Arc<FakeLibrary>, outcome: TrustOutcome) -> Self {
        let temp = TempDir::new().unwrap();
        let cache = FsCache::open(temp.path().join("cache")).unwrap();
        let hasher = Arc::new(ContentHasher::default());
        let verifier = ScriptedVerifier::new(outcome);
        let fetcher = Fetcher::new(
            library.clone(),
            library.clone(),
            hasher.clone(),
            verifier.clone(),
        )
        .with_options(FetchOptions {
            tmp_dir: temp.path().to_path_buf(),
            ..FetchOptions::default()
        });
        Self {
            temp,
            cache,
            library,
            hasher,
            verifier,
            fetcher,
        }
    }

    fn out(&self, name: &str) -> PathBuf {
        self.temp.path().join(name)
    }

    fn staging_files(&self) -> usize {
        std::fs::read_dir(self.temp.path().join("cache").join("tmp"))
            .unwrap()
            .count()
    }

    fn entry(&self, hash: &str) -> PathBuf {
        self.temp.path().join("cache").join("library").join(hash)
    }
}

fn alpine() -> ArtifactReference {
    ArtifactReference::parse("alpine:latest").unwrap()
}

#[tokio::test]
async fn empty_cache_downloads_verifies_and_finalizes() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let cancel = CancelToken::never();

    let path = h
        .fetcher
        .pull_to_cache(&cancel, &h.cache, &alpine(), "amd64")
        .await
        .unwrap();

    assert_eq!(h.library.downloads(), 1);
    assert_eq!(h.hasher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(path, h.entry("abc123"));
    assert!(path.is_file());
    assert_eq!(h.staging_files(), 0);

    let pulled = h.fetcher.verify(&cancel, &alpine(), &path).await.unwrap();
    assert_eq!(pulled, Pulled::Verified(path));
}

#[tokio::test]
async fn cache_hit_skips_download() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let cancel = CancelToken::never();

    let first = h
        .fetcher
        .pull_to_cache(&cancel, &h.cache, &alpine(), "amd64")
        .await
        .unwrap();
    let second = h
        .fetcher
        .pull_to_cache(&cancel, &h.cache, &alpine(), "amd64")
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.library.downloads(), 1);
    assert_eq!(h.hasher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hash_mismatch_finalizes_nothing() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"xyz999"), TrustOutcome::Verified);

    let err = h
        .fetcher
        .pull_to_cache(&CancelToken::never(), &h.cache, &alpine(), "amd64")
        .await
        .unwrap_err();

    match err {
        FetchError::HashMismatch {
            ref expected,
            ref actual,
            ..
        } => {
            assert_eq!(expected, "abc123");
            assert_eq!(actual, "xyz999");
        }
        ref other => panic!("expected HashMismatch, got {other:?}"),
    }
    assert!(!h.entry("abc123").exists());
    assert_eq!(h.staging_files(), 0);
    assert!(h.verifier.seen().is_empty());
}

#[tokio::test]
async fn direct_mode_skips_hash_check() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"xyz999"), TrustOutcome::Verified);
    let dest = h.out("alpine.sif");

    let path = h
        .fetcher
        .fetch(
            &CancelToken::never(),
            &FsCache::disabled(),
            &alpine(),
            "amd64",
            &DeliveryMode::DirectToPath(dest.clone()),
        )
        .await
        .unwrap();

    assert_eq!(path, dest);
    assert_eq!(std::fs::read(&dest).unwrap(), b"xyz999");
    assert_eq!(h.hasher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn strict_direct_mode_rejects_mismatch() {
    let mut h = Harness::new(FakeLibrary::serving("abc123", b"xyz999"), TrustOutcome::Verified);
    h.fetcher = h.fetcher.with_options(FetchOptions {
        strict_hash: true,
        ..FetchOptions::default()
    });
    let dest = h.out("alpine.sif");

    let err = h
        .fetcher
        .fetch(
            &CancelToken::never(),
            &FsCache::disabled(),
            &alpine(),
            "amd64",
            &DeliveryMode::DirectToPath(dest.clone()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HashMismatch { .. }));
    assert!(!dest.exists());
}

#[tokio::test]
async fn pull_to_path_copies_out_of_cache() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let dest = h.out("alpine.sif");

    let pulled = h
        .fetcher
        .pull_to_path(&CancelToken::never(), &h.cache, &alpine(), "amd64", &dest)
        .await
        .unwrap();

    assert_eq!(pulled, Pulled::Verified(dest.clone()));
    assert_eq!(std::fs::read(&dest).unwrap(), b"abc123");
    assert!(h.entry("abc123").is_file());
    assert_eq!(h.verifier.seen(), vec![dest]);
}

#[tokio::test]
async fn pull_to_path_without_cache_goes_direct() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let dest = h.out("alpine.sif");

    h.fetcher
        .pull_to_path(
            &CancelToken::never(),
            &FsCache::disabled(),
            &alpine(),
            "amd64",
            &dest,
        )
        .await
        .unwrap();

    assert!(dest.is_file());
    assert!(!h.entry("abc123").exists());
}

#[tokio::test]
async fn unsigned_image_is_delivered_with_reason() {
    let h = Harness::new(
        FakeLibrary::serving("abc123", b"abc123"),
        TrustOutcome::UnverifiedAccepted {
            reason: "no signatures found".to_string(),
        },
    );
    let dest = h.out("alpine.sif");

    let pulled = h
        .fetcher
        .pull_to_path(&CancelToken::never(), &h.cache, &alpine(), "amd64", &dest)
        .await
        .unwrap();

    assert!(!pulled.is_verified());
    assert_eq!(pulled.path(), dest.as_path());
    assert!(dest.is_file());
    assert!(pulled.require_signed(&alpine()).is_err());
}

#[tokio::test]
async fn failed_verification_keeps_bytes() {
    let h = Harness::new(
        FakeLibrary::serving("abc123", b"abc123"),
        TrustOutcome::Failed {
            reason: "signature does not match".to_string(),
        },
    );
    let dest = h.out("alpine.sif");

    let err = h
        .fetcher
        .pull_to_path(&CancelToken::never(), &h.cache, &alpine(), "amd64", &dest)
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Verify));
    assert!(err.to_string().contains("signature does not match"));
    assert!(dest.is_file());
    assert!(h.entry("abc123").is_file());
}

#[tokio::test]
async fn missing_image_reports_not_found() {
    let h = Harness::new(FakeLibrary::missing(), TrustOutcome::Verified);

    let err = h
        .fetcher
        .pull_to_cache(&CancelToken::never(), &h.cache, &alpine(), "arm64")
        .await
        .unwrap_err();

    match err {
        FetchError::NotFound { reference, arch } => {
            assert_eq!(reference, "library://alpine:latest");
            assert_eq!(arch, "arm64");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_eq!(h.library.downloads(), 0);
}

#[tokio::test]
async fn pull_to_cache_requires_cache() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);

    let err = h
        .fetcher
        .pull_to_cache(
            &CancelToken::never(),
            &FsCache::disabled(),
            &alpine(),
            "amd64",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::CacheDisabled { .. }));
    assert_eq!(h.library.downloads(), 0);
}

#[tokio::test]
async fn pull_without_cache_uses_tmp_file() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);

    let path = h
        .fetcher
        .pull(
            &CancelToken::never(),
            &FsCache::disabled(),
            &alpine(),
            "amd64",
        )
        .await
        .unwrap();

    assert!(path.starts_with(h.temp.path()));
    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with(fetchgate::fetch::TMP_CACHE_PREFIX));
    assert_eq!(std::fs::read(&path).unwrap(), b"abc123");
}

#[tokio::test]
async fn cancel_mid_download_leaves_no_entry() {
    let h = Harness::new(FakeLibrary::stalling("abc123"), TrustOutcome::Verified);
    let (handle, cancel) = CancelToken::pair();

    let reference = alpine();

    let pull = h.fetcher.pull_to_cache(&cancel, &h.cache, &reference, "amd64");
    let trigger = async {
        while h.library.downloads() == 0 {
            tokio::task::yield_now().await;
        }
        handle.cancel();
    };
    let (result, ()) = tokio::join!(pull, trigger);

    let err = result.unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(err.stage(), Some(Stage::Download));
    assert!(!h.entry("abc123").exists());
    assert_eq!(h.staging_files(), 0);
}

#[tokio::test]
async fn cancelled_before_start_touches_nothing() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let (handle, cancel) = CancelToken::pair();
    handle.cancel();

    let err = h
        .fetcher
        .pull_to_cache(&cancel, &h.cache, &alpine(), "amd64")
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(h.library.downloads(), 0);
    assert_eq!(h.staging_files(), 0);
}

#[tokio::test]
async fn second_copy_out_replaces_destination() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let dest = h.out("alpine.sif");
    std::fs::write(&dest, b"stale").unwrap();

    h.fetcher
        .pull_to_path(&CancelToken::never(), &h.cache, &alpine(), "amd64", &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"abc123");
    assert!(h.cache.lookup("abc123").unwrap().exists);
}

#[tokio::test]
async fn resolve_failure_is_reported_at_resolve() {
    let h = Harness::new(
        FakeLibrary::with(Some("abc123"), b"abc123", Behavior::BrokenResolve),
        TrustOutcome::Verified,
    );

    let err = h
        .fetcher
        .pull_to_cache(&CancelToken::never(), &h.cache, &alpine(), "amd64")
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Resolve { .. }));
    assert_eq!(err.stage(), Some(Stage::Resolve));
    assert!(err.to_string().contains("500"));
    assert_eq!(h.library.downloads(), 0);
    assert_eq!(h.staging_files(), 0);
}

#[tokio::test]
async fn download_failure_discards_staging() {
    let h = Harness::new(
        FakeLibrary::with(Some("abc123"), b"abc123", Behavior::BrokenDownload),
        TrustOutcome::Verified,
    );

    let err = h
        .fetcher
        .pull_to_cache(&CancelToken::never(), &h.cache, &alpine(), "amd64")
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Download { .. }));
    assert_eq!(err.stage(), Some(Stage::Download));
    assert!(err.to_string().contains("library://alpine:latest"));
    assert_eq!(h.library.downloads(), 1);
    assert_eq!(h.hasher.calls.load(Ordering::SeqCst), 0);
    assert!(!h.entry("abc123").exists());
    assert_eq!(h.staging_files(), 0);
}

#[tokio::test]
async fn unusable_hash_fails_cache_lookup() {
    let h = Harness::new(
        FakeLibrary::serving("../escape", b"../escape"),
        TrustOutcome::Verified,
    );

    let err = h
        .fetcher
        .pull_to_cache(&CancelToken::never(), &h.cache, &alpine(), "amd64")
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::CacheLookup { .. }));
    assert_eq!(err.stage(), Some(Stage::CacheLookup));
    assert_eq!(h.library.downloads(), 0);
    assert_eq!(h.staging_files(), 0);
}

#[tokio::test]
async fn copy_out_into_missing_directory_fails() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let dest = h.out("no-such-dir").join("alpine.sif");

    let err = h
        .fetcher
        .pull_to_path(&CancelToken::never(), &h.cache, &alpine(), "amd64", &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Copy { .. }));
    assert_eq!(err.stage(), Some(Stage::Copy));
    assert!(!dest.exists());
    // The cache entry was already finalized and stays usable
    assert!(h.entry("abc123").is_file());
    assert!(h.verifier.seen().is_empty());
}

#[tokio::test]
async fn failed_copy_out_leaves_destination_untouched() {
    let h = Harness::new(FakeLibrary::serving("abc123", b"abc123"), TrustOutcome::Verified);
    let dest = h.out("alpine.sif");
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(dest.join("keep"), b"old content").unwrap();

    let err = h
        .fetcher
        .pull_to_path(&CancelToken::never(), &h.cache, &alpine(), "amd64", &dest)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Copy { .. }));
    assert_eq!(std::fs::read(dest.join("keep")).unwrap(), b"old content");
    let leftovers: Vec<_> = std::fs::read_dir(h.temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.contains(".tmp-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn failed_pull_without_cache_removes_tmp_file() {
    let h = Harness::new(
        FakeLibrary::with(Some("abc123"), b"abc123", Behavior::BrokenDownload),
        TrustOutcome::Verified,
    );

    let err = h
        .fetcher
        .pull(
            &CancelToken::never(),
            &FsCache::disabled(),
            &alpine(),
            "amd64",
        )
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(Stage::Download));
    let leftovers: Vec<_> = std::fs::read_dir(h.temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with(fetchgate::fetch::TMP_CACHE_PREFIX))
        .collect();
    assert!(leftovers.is_empty());
}
