//! Library reference normalization
//!
//! Turns user input such as `alpine`, `library://alpine:3.19` or
//! `library://cloud.example.com/entity/collection/alpine:latest` into a
//! canonical [`ArtifactReference`]. A missing tag defaults to `latest`.

use crate::error::{FetchError, FetchResult};
use std::fmt;
use std::str::FromStr;

/// URI scheme accepted in front of a reference
pub const LIBRARY_SCHEME: &str = "library://";

/// Tag applied when the reference does not carry one
pub const DEFAULT_TAG: &str = "latest";

/// Maximum path depth: entity/collection/container
const MAX_SEGMENTS: usize = 3;

/// Canonical, immutable reference to a library image
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactReference {
    registry: Option<String>,
    name: String,
    tag: String,
}

impl ArtifactReference {
    /// Normalize a raw user reference
    pub fn parse(raw: &str) -> FetchResult<Self> {
        let input = raw.trim();
        let invalid = |reason: &str| FetchError::InvalidReference {
            reference: raw.to_string(),
            reason: reason.to_string(),
        };

        if input.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if input.chars().any(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        let (rest, schemed) = match input.strip_prefix(LIBRARY_SCHEME) {
            Some(rest) => (rest, true),
            None => (input, false),
        };

        // `library:///path` explicitly selects the default library
        let (registry, path) = if schemed && !rest.starts_with('/') {
            split_registry(rest)
        } else {
            (None, rest.trim_start_matches('/'))
        };

        if path.is_empty() {
            return Err(invalid("missing image name"));
        }

        let (name, tag) = match path.rsplit_once(':') {
            // A colon before the last '/' belongs to a path segment, not a tag
            Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
            _ => (path, None),
        };

        let segments: Vec<&str> = name.split('/').collect();
        if segments.len() > MAX_SEGMENTS {
            return Err(invalid("too many path components (max entity/collection/name)"));
        }
        for segment in &segments {
            if segment.is_empty() {
                return Err(invalid("empty path component"));
            }
            if *segment == "." || *segment == ".." {
                return Err(invalid("relative path component"));
            }
            if !segment.chars().all(is_name_char) {
                return Err(invalid("name contains invalid characters"));
            }
        }

        let tag = match tag {
            Some("") => return Err(invalid("empty tag")),
            Some(tag) if !tag.chars().all(is_name_char) => {
                return Err(invalid("tag contains invalid characters"))
            }
            Some(tag) => tag.to_string(),
            None => DEFAULT_TAG.to_string(),
        };

        Ok(Self {
            registry: registry.map(str::to_string),
            name: name.to_string(),
            tag,
        })
    }

    /// Registry host qualifier, if the reference names one
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// Image path without registry or tag
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image tag (`latest` when none was given)
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// `name:tag` as used in library API paths
    pub fn path(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

impl fmt::Display for ArtifactReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.registry {
            Some(registry) => write!(f, "{}{}/{}:{}", LIBRARY_SCHEME, registry, self.name, self.tag),
            None => write!(f, "{}{}:{}", LIBRARY_SCHEME, self.name, self.tag),
        }
    }
}

impl FromStr for ArtifactReference {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// Split a leading host component off a schemed reference
fn split_registry(rest: &str) -> (Option<&str>, &str) {
    match rest.split_once('/') {
        Some((host, path)) if looks_like_host(host) => (Some(host), path),
        _ => (None, rest),
    }
}

fn looks_like_host(segment: &str) -> bool {
    segment == "localhost" || segment.contains('.') || segment.contains(':')
}
