//! fetchgate - verified, cache-aware library image fetching
//!
//! Resolves library references to content hashes, keeps a single
//! hash-checked copy of each image in a local cache, relocates images
//! atomically and gates them behind signature verification.

pub mod cache;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod hash;
pub mod reference;
pub mod relocate;
pub mod remote;
pub mod trust;
pub mod ui;

pub use cancel::{CancelHandle, CancelToken};
pub use error::{FetchError, FetchResult, Stage};
pub use fetch::{DeliveryMode, FetchOptions, Fetcher, Pulled};
pub use reference::ArtifactReference;
