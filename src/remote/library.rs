//! HTTP client for the container library API
//!
//! `ureq` is blocking, so every request runs on tokio's blocking pool.
//! Downloads check the cancel token between chunks.

use super::{Downloader, MetadataResolver, ProgressSink, RemoteDescriptor, RemoteError};
use crate::cancel::CancelToken;
use crate::config::schema::LibraryConfig;
use crate::reference::ArtifactReference;
use async_trait::async_trait;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: ImageData,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    hash: String,
    #[serde(default)]
    arch: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

impl From<ureq::Error> for RemoteError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(404) => Self::NotFound,
            ureq::Error::StatusCode(code) => Self::Status(code),
            ureq::Error::Io(e) => Self::Io(e),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Library API client
#[derive(Clone)]
pub struct LibraryClient {
    agent: ureq::Agent,
    base_url: String,
    auth_token: Option<String>,
}

impl std::fmt::Debug for LibraryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryClient")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl LibraryClient {
    /// Create a client for the library at `base_url`
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_connect(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .build()
            .into();

        Self {
            agent,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    /// Create a client from the `[library]` config section
    pub fn from_config(config: &LibraryConfig) -> Self {
        Self::new(
            config.url.clone(),
            config.auth_token.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Base URL serving `reference`; a registry qualifier overrides the default
    fn base_for(&self, reference: &ArtifactReference) -> String {
        match reference.registry() {
            Some(registry) => format!("https://{}", registry),
            None => self.base_url.clone(),
        }
    }

    fn image_url(&self, reference: &ArtifactReference) -> String {
        format!("{}/v1/images/{}", self.base_for(reference), reference.path())
    }

    fn imagefile_url(&self, reference: &ArtifactReference) -> String {
        format!("{}/v1/imagefile/{}", self.base_for(reference), reference.path())
    }

    fn get(
        &self,
        url: &str,
        arch: &str,
    ) -> Result<ureq::http::Response<ureq::Body>, RemoteError> {
        let mut request = self.agent.get(url).query("arch", arch);
        if let Some(ref token) = self.auth_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        Ok(request.call()?)
    }

    fn fetch_descriptor(&self, url: &str, arch: &str) -> Result<RemoteDescriptor, RemoteError> {
        let mut response = self.get(url, arch)?;
        let body = response.body_mut().read_to_string()?;
        let parsed: ImageResponse =
            serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;

        if parsed.data.hash.is_empty() {
            return Err(RemoteError::Decode("image has no hash".to_string()));
        }

        Ok(RemoteDescriptor {
            content_hash: parsed.data.hash,
            arch: parsed.data.arch.unwrap_or_else(|| arch.to_string()),
            size: parsed.data.size,
        })
    }

    fn stream_to_file(
        &self,
        url: &str,
        arch: &str,
        dest: &Path,
        cancel: &CancelToken,
        progress: &dyn ProgressSink,
    ) -> Result<u64, RemoteError> {
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        let response = self.get(url, arch)?;
        let body = response.into_body();
        if cancel.is_cancelled() {
            return Err(RemoteError::Cancelled);
        }
        progress.start(body.content_length());

        // Never create `dest`: once the caller discards it, it must stay gone
        let mut reader = body.into_reader();
        let mut file = OpenOptions::new().write(true).truncate(true).open(dest)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut written = 0u64;

        loop {
            if cancel.is_cancelled() {
                return Err(RemoteError::Cancelled);
            }
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n])?;
            written += n as u64;
            progress.advance(n as u64);
        }

        file.sync_all()?;
        Ok(written)
    }
}

#[async_trait]
impl MetadataResolver for LibraryClient {
    async fn resolve(
        &self,
        _cancel: &CancelToken,
        reference: &ArtifactReference,
        arch: &str,
    ) -> Result<RemoteDescriptor, RemoteError> {
        let client = self.clone();
        let url = self.image_url(reference);
        let arch = arch.to_string();
        debug!("Fetching image metadata from {}", url);

        tokio::task::spawn_blocking(move || client.fetch_descriptor(&url, &arch))
            .await
            .map_err(|e| RemoteError::Transport(format!("metadata task failed: {}", e)))?
    }
}

#[async_trait]
impl Downloader for LibraryClient {
    async fn download(
        &self,
        cancel: &CancelToken,
        dest: &Path,
        reference: &ArtifactReference,
        arch: &str,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<(), RemoteError> {
        let client = self.clone();
        let url = self.imagefile_url(reference);
        let arch = arch.to_string();
        let dest: PathBuf = dest.to_path_buf();
        let cancel = cancel.clone();
        debug!("Downloading {} to {}", url, dest.display());

        tokio::task::spawn_blocking(move || {
            let result = client.stream_to_file(&url, &arch, &dest, &cancel, progress.as_ref());
            progress.finish();
            result.map(|bytes| debug!(bytes, "Download complete"))
        })
        .await
        .map_err(|e| RemoteError::Transport(format!("download task failed: {}", e)))?
    }
}
