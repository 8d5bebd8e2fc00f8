//! Signature verification of pulled images
//!
//! Verification itself is delegated to an external tool; this module only
//! classifies what the tool reports into a [`TrustOutcome`].

use crate::cancel::CancelToken;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Result of checking an image's signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustOutcome {
    /// Signed by a trusted key
    Verified,
    /// Intact but unsigned, or signed by an unknown key. The caller decides.
    UnverifiedAccepted { reason: String },
    /// Verification ran and rejected the image
    Failed { reason: String },
}

/// Errors that prevent verification from producing an outcome
#[derive(Debug, Error)]
pub enum TrustError {
    #[error("verification cancelled")]
    Cancelled,

    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("verification I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where keys are looked up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustConfig {
    /// Remote keyserver; `None` means the local keyring only
    pub keyserver_url: Option<String>,
}

/// Checks the signatures of an image on disk
#[async_trait]
pub trait TrustVerifier: Send + Sync {
    async fn verify(
        &self,
        cancel: &CancelToken,
        path: &Path,
        config: &TrustConfig,
    ) -> Result<TrustOutcome, TrustError>;
}

/// Output fragments meaning "no usable signature" rather than "bad signature"
const UNSIGNED_MARKERS: &[&str] = &[
    "no signature",
    "signature not found",
    "not signed",
    "no public key",
    "key not found",
    "unknown key",
    "unknown signer",
];

/// Runs `<program> verify [--url <keyserver>] <path>`
#[derive(Debug, Clone)]
pub struct CommandVerifier {
    program: String,
}

impl CommandVerifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, path: &Path, config: &TrustConfig) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("verify");
        if let Some(ref url) = config.keyserver_url {
            cmd.arg("--url").arg(url);
        }
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TrustVerifier for CommandVerifier {
    async fn verify(
        &self,
        cancel: &CancelToken,
        path: &Path,
        config: &TrustConfig,
    ) -> Result<TrustOutcome, TrustError> {
        debug!("Running {} verify on {}", self.program, path.display());
        let child = self
            .command(path, config)
            .spawn()
            .map_err(|e| TrustError::Spawn {
                command: self.program.clone(),
                source: e,
            })?;

        // Dropping the child on cancellation kills it
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(TrustError::Cancelled),
            output = child.wait_with_output() => output?,
        };

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(classify_output(output.status.success(), &text))
    }
}

/// Map verifier exit status and output to an outcome
pub fn classify_output(success: bool, output: &str) -> TrustOutcome {
    if success {
        return TrustOutcome::Verified;
    }

    let reason = output
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .unwrap_or("verification failed")
        .to_string();

    let lower = output.to_lowercase();
    if UNSIGNED_MARKERS.iter().any(|m| lower.contains(m)) {
        TrustOutcome::UnverifiedAccepted { reason }
    } else {
        TrustOutcome::Failed { reason }
    }
}
