//! Error types for fetchgate
//!
//! All modules use `FetchResult<T>` as their return type. Collaborator
//! errors are mapped into `FetchError` with the reference, architecture
//! and hash needed to diagnose a failure without retrying.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for fetchgate operations
pub type FetchResult<T> = Result<T, FetchError>;

/// Stage of a pull that an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    CacheLookup,
    Download,
    Hash,
    Finalize,
    Copy,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resolve => "resolve",
            Self::CacheLookup => "cache lookup",
            Self::Download => "download",
            Self::Hash => "hash",
            Self::Finalize => "finalize",
            Self::Copy => "copy",
            Self::Verify => "verify",
        };
        write!(f, "{}", name)
    }
}

/// All errors that can occur while fetching an artifact
#[derive(Error, Debug)]
pub enum FetchError {
    // Caller errors
    #[error("Invalid artifact reference {reference:?}: {reason}")]
    InvalidReference { reference: String, reason: String },

    // Resolve stage
    #[error("Image does not exist in the library: {reference} ({arch})")]
    NotFound { reference: String, arch: String },

    #[error("resolve failed for {reference} ({arch}): {reason}")]
    Resolve {
        reference: String,
        arch: String,
        reason: String,
    },

    // Cache stages
    #[error("cache lookup failed for {reference}: unable to check if {hash} exists in cache: {reason}")]
    CacheLookup {
        reference: String,
        hash: String,
        reason: String,
    },

    #[error("Cache is disabled, cannot pull {reference} into the cache")]
    CacheDisabled { reference: String },

    #[error("finalize failed for {reference}: cache entry {hash}: {reason}")]
    Finalize {
        reference: String,
        hash: String,
        reason: String,
    },

    // Download stage
    #[error("download failed for {reference} ({arch}): {reason}")]
    Download {
        reference: String,
        arch: String,
        reason: String,
    },

    // Integrity stage
    #[error("hash failed for {reference}: error getting image hash of {path}: {source}")]
    HashCompute {
        reference: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("hash mismatch for {reference}: downloaded file hash ({actual}) and expected hash ({expected}) do not match")]
    HashMismatch {
        reference: String,
        expected: String,
        actual: String,
    },

    // Relocation stage
    #[error("copy failed for {reference}: error copying {src} to {dst}: {source}")]
    Copy {
        reference: String,
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Trust stage
    #[error("verify failed for {reference}: {path}: {reason}")]
    VerificationFailed {
        reference: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{stage} cancelled for {reference}")]
    Cancelled { reference: String, stage: Stage },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl FetchError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Stage of the pull this error came from, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::NotFound { .. } | Self::Resolve { .. } => Some(Stage::Resolve),
            Self::CacheLookup { .. } | Self::CacheDisabled { .. } => Some(Stage::CacheLookup),
            Self::Download { .. } => Some(Stage::Download),
            Self::HashCompute { .. } | Self::HashMismatch { .. } => Some(Stage::Hash),
            Self::Finalize { .. } => Some(Stage::Finalize),
            Self::Copy { .. } => Some(Stage::Copy),
            Self::VerificationFailed { .. } => Some(Stage::Verify),
            Self::Cancelled { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Check if the error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("Check the image name, tag and --arch"),
            Self::HashMismatch { .. } => {
                Some("The download was corrupted or the library changed; pull again")
            }
            Self::CacheDisabled { .. } => Some("Enable the cache or pull with --output"),
            Self::VerificationFailed { .. } => {
                Some("The image was kept for inspection but must not be trusted")
            }
            Self::InvalidReference { .. } => Some("Use the form [library://]entity/collection/name[:tag]"),
            _ => None,
        }
    }
}
