//! Content-addressed image cache
//!
//! Images are keyed by the content hash the library reports for them.
//! Entries are immutable once finalized; nothing that failed hash
//! verification ever becomes visible to a lookup.
//!
//! # Entry States
//!
//! | State | `exists` | Description |
//! |-------|----------|-------------|
//! | Miss | false | Staging file reserved, download pending |
//! | Finalized | true | Hash-checked, immutable |

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, CacheEntryManager, CacheError, StagingGuard};
pub use store::{format_bytes, CachedImage, FsCache};
