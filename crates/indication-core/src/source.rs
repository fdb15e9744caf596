//! Upstream data sources behind the caches.

use async_trait::async_trait;
use thiserror::Error;

/// Upstream fetch errors.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Upstream unavailable: {0}")]
    Unavailable(String),
}

pub type SourceResult<T> = Result<T, SourceError>;

/// An externally paginated dataset.
#[async_trait]
pub trait PageSource<P>: Send + Sync {
    /// Cache key prefix for this source's pages; must be unique per source.
    fn namespace(&self) -> &str;

    /// Fetch one page (1-based).
    async fn fetch_page(&self, page: u32) -> SourceResult<P>;
}

/// Full text documents addressed by identifier.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Cache key prefix for this source's documents.
    fn namespace(&self) -> &str;

    /// Fetch the raw document body.
    async fn fetch_document(&self, identifier: &str) -> SourceResult<String>;
}
