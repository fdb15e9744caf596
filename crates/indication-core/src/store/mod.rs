//! Key-value store capability shared by the caches and the mapping store.
//!
//! Components receive an `Arc<dyn KvStore>` at construction; nothing reaches
//! for a global handle. Two backends ship with the crate: [`MemoryStore`] for
//! single-process deployments and tests, and [`SqliteStore`] when cached
//! pages, labels and mappings should survive a restart.

mod memory;
mod schema;
mod sqlite;

pub use memory::*;
pub use schema::*;
pub use sqlite::*;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use thiserror::Error;

/// Store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Wrong value type for key: {0}")]
    WrongType(String),

    #[error("Lock poisoned")]
    Poisoned,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid scan pattern: {0}")]
    Pattern(#[from] globset::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    SetEx {
        key: String,
        value: String,
        ttl: Duration,
    },
    SetAdd {
        set: String,
        member: String,
    },
    SetRemove {
        set: String,
        member: String,
    },
    Delete {
        key: String,
    },
}

/// One page of a cursor scan.
///
/// A returned `cursor` of 0 means the scan is complete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Key-value operations with expiry, sets and cursor scans.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a live string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a string value that expires after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Add a member to a set. Sets never expire.
    async fn set_add(&self, set: &str, member: &str) -> StoreResult<()>;

    /// Remove a member from a set.
    async fn set_remove(&self, set: &str, member: &str) -> StoreResult<()>;

    /// All members of a set (empty if the set does not exist).
    async fn set_members(&self, set: &str) -> StoreResult<BTreeSet<String>>;

    /// Delete a key. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Examine up to `count` keys starting at `cursor` and return the live ones
    /// matching `pattern` (`*` matches any run of characters).
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StoreResult<ScanPage>;

    /// Apply all operations or none of them.
    async fn exec_batch(&self, ops: Vec<BatchOp>) -> StoreResult<()>;

    /// Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> StoreResult<usize> {
        Ok(0)
    }
}

/// Open the configured backend: SQLite at `path`, or in-process memory.
pub fn open_store(path: Option<&Path>) -> StoreResult<Arc<dyn KvStore>> {
    match path {
        Some(path) => Ok(Arc::new(SqliteStore::open(path)?)),
        None => Ok(Arc::new(MemoryStore::new())),
    }
}

/// Compile a scan pattern. `*` matches any run of characters, `/` included;
/// use [`globset::escape`] on untrusted fragments.
pub fn key_matcher(pattern: &str) -> StoreResult<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(false)
        .build()?;
    Ok(glob.compile_matcher())
}
