//! Configuration schema for fetchgate
//!
//! Configuration is stored at `~/.config/fetchgate/config.toml`

use crate::relocate::DEFAULT_COPY_MODE;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Remote library settings
    pub library: LibraryConfig,

    /// Image cache settings
    pub cache: CacheConfig,

    /// Signature verification settings
    pub trust: TrustSettings,

    /// Fetch behavior
    pub fetch: FetchConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Remote library settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Library API base URL
    pub url: String,

    /// Bearer token for private images
    pub auth_token: Option<String>,

    /// Architecture used when none is given on the command line
    pub default_arch: String,

    /// Connect and response timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            url: "https://library.sylabs.io".to_string(),
            auth_token: None,
            default_arch: host_arch().to_string(),
            timeout_secs: 30,
        }
    }
}

/// Map the host architecture to library naming
pub fn host_arch() -> &'static str {
    library_arch(std::env::consts::ARCH)
}

/// Library name for a Rust target architecture; unknown names pass through
fn library_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    }
}

/// Image cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Use the image cache (default: true)
    pub enabled: bool,

    /// Cache root (default: platform cache dir)
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Signature verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustSettings {
    /// Keyserver used for key lookup
    pub keyserver_url: String,

    /// Look keys up on the keyserver, not only in the local keyring
    pub use_keyserver: bool,

    /// Verification tool invoked as `<command> verify ...`
    pub command: String,

    /// Treat unsigned images as a failure
    pub require_signed: bool,
}

impl Default for TrustSettings {
    fn default() -> Self {
        Self {
            keyserver_url: "https://keys.sylabs.io".to_string(),
            use_keyserver: true,
            command: "singularity".to_string(),
            require_signed: false,
        }
    }
}

/// Fetch behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Hash-check downloads that bypass the cache too
    pub strict_hash: bool,

    /// Temporary download directory when the cache is disabled
    pub tmp_dir: Option<PathBuf>,

    /// Mode for newly created output files, before umask
    pub copy_mode: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            strict_hash: false,
            tmp_dir: None,
            copy_mode: DEFAULT_COPY_MODE,
        }
    }
}
