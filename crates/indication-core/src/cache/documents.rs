//! Cache-aside fetch of full label documents.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::diagnostics::{CacheDiagnostics, CacheEvent, CacheStats};
use crate::source::DocumentSource;
use crate::store::KvStore;

/// Caches raw documents under `<namespace><identifier>`.
pub struct DocumentCache {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn KvStore>,
    ttl: Duration,
    diagnostics: CacheDiagnostics,
}

impl DocumentCache {
    pub fn new(source: Arc<dyn DocumentSource>, store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            source,
            store,
            ttl,
            diagnostics: CacheDiagnostics::new("documents"),
        }
    }

    pub fn cache_key(&self, identifier: &str) -> String {
        format!("{}{}", self.source.namespace(), identifier)
    }

    pub fn stats(&self) -> CacheStats {
        self.diagnostics.snapshot()
    }

    /// Fetch a document, or `None` when it cannot be obtained upstream.
    pub async fn fetch_document(&self, identifier: &str) -> Option<String> {
        let key = self.cache_key(identifier);

        match self.store.get(&key).await {
            Ok(Some(body)) => {
                self.diagnostics.record(CacheEvent::Hit, &key);
                return Some(body);
            }
            Ok(None) => self.diagnostics.record(CacheEvent::Miss, &key),
            Err(e) => self
                .diagnostics
                .record_failure(CacheEvent::ReadDegraded, &key, &e),
        }

        let body = match self.source.fetch_document(identifier).await {
            Ok(body) => body,
            Err(e) => {
                warn!(setid = identifier, error = %e, "label document unavailable");
                return None;
            }
        };
        debug!(setid = identifier, bytes = body.len(), "fetched label document");

        if let Err(e) = self.store.set_ex(&key, &body, self.ttl).await {
            self.diagnostics
                .record_failure(CacheEvent::WriteDegraded, &key, &e);
        }
        Some(body)
    }
}
