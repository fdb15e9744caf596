//! Cache-aside adapters over the upstream sources.
//!
//! Both caches share the same discipline: a failed or undecodable read is a
//! miss, a failed write is logged and forgotten, and only upstream failures
//! are visible to callers.

mod documents;
mod pages;

pub use documents::*;
pub use pages::*;

use std::time::Duration;

/// Default lifetime of cached catalog pages and label documents.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24);
