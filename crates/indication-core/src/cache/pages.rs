//! Cache-aside wrapper around a paginated source.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::diagnostics::{CacheDiagnostics, CacheEvent, CacheStats};
use crate::source::{PageSource, SourceResult};
use crate::store::KvStore;

/// Caches whole pages of a [`PageSource`] under `<namespace><page>`.
pub struct PageCache<P> {
    source: Arc<dyn PageSource<P>>,
    store: Arc<dyn KvStore>,
    ttl: Duration,
    diagnostics: CacheDiagnostics,
}

impl<P> PageCache<P>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn PageSource<P>>, store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            source,
            store,
            ttl,
            diagnostics: CacheDiagnostics::new("pages"),
        }
    }

    pub fn cache_key(&self, page: u32) -> String {
        format!("{}{}", self.source.namespace(), page)
    }

    pub fn stats(&self) -> CacheStats {
        self.diagnostics.snapshot()
    }

    /// Fetch one page, from cache when possible.
    ///
    /// An unreachable cache and an empty one take the same path: upstream
    /// fetch, then a background cache write the caller never waits on.
    pub async fn fetch_page(&self, page: u32) -> SourceResult<P> {
        let key = self.cache_key(page);

        match self.store.get(&key).await {
            Ok(Some(cached)) => match serde_json::from_str::<P>(&cached) {
                Ok(value) => {
                    self.diagnostics.record(CacheEvent::Hit, &key);
                    return Ok(value);
                }
                Err(e) => self
                    .diagnostics
                    .record_failure(CacheEvent::ReadDegraded, &key, &e),
            },
            Ok(None) => self.diagnostics.record(CacheEvent::Miss, &key),
            Err(e) => self
                .diagnostics
                .record_failure(CacheEvent::ReadDegraded, &key, &e),
        }

        let fetched = self.source.fetch_page(page).await.map_err(|e| {
            error!(page, error = %e, "upstream page fetch failed");
            e
        })?;

        self.spawn_write(key, &fetched);
        Ok(fetched)
    }

    fn spawn_write(&self, key: String, value: &P) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                self.diagnostics
                    .record_failure(CacheEvent::WriteDegraded, &key, &e);
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let diagnostics = self.diagnostics.clone();
        let ttl = self.ttl;
        tokio::spawn(async move {
            if let Err(e) = store.set_ex(&key, &payload, ttl).await {
                diagnostics.record_failure(CacheEvent::WriteDegraded, &key, &e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::cache::testing::{settle, UnreachableStore};
    use crate::cache::DEFAULT_CACHE_TTL;
    use crate::models::{CatalogPage, CatalogRecord, PageMetadata};
    use crate::source::SourceError;
    use crate::store::MemoryStore;

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageSource<CatalogPage> for CountingSource {
        fn namespace(&self) -> &str {
            "test_page_"
        }

        async fn fetch_page(&self, page: u32) -> SourceResult<CatalogPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::Unavailable("upstream down".into()));
            }
            Ok(CatalogPage {
                records: vec![CatalogRecord::new(format!("id-{page}"), format!("Drug {page}"))],
                metadata: PageMetadata {
                    total_pages: 3,
                    current_page: page,
                    ..Default::default()
                },
            })
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let source = CountingSource::new(false);
        let store = Arc::new(MemoryStore::new());
        let cache: PageCache<CatalogPage> = PageCache::new(source.clone(), store.clone(), DEFAULT_CACHE_TTL);

        let first = cache.fetch_page(2).await.unwrap();
        settle().await;
        let second = cache.fetch_page(2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert!(store.get("test_page_2").await.unwrap().is_some());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_unreachable_cache_falls_back_to_upstream() {
        let source = CountingSource::new(false);
        let cache: PageCache<CatalogPage> = PageCache::new(source.clone(), Arc::new(UnreachableStore), DEFAULT_CACHE_TTL);

        let page = cache.fetch_page(1).await.unwrap();
        settle().await;

        assert_eq!(page.records[0].identifier, "id-1");
        assert_eq!(source.calls(), 1);

        let stats = cache.stats();
        assert_eq!(stats.read_failures, 1);
        assert_eq!(stats.write_failures, 1);
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_a_miss() {
        let source = CountingSource::new(false);
        let store = Arc::new(MemoryStore::new());
        store.set_ex("test_page_1", "not json", DEFAULT_CACHE_TTL).await.unwrap();
        let cache: PageCache<CatalogPage> = PageCache::new(source.clone(), store.clone(), DEFAULT_CACHE_TTL);

        let page = cache.fetch_page(1).await.unwrap();
        settle().await;

        assert_eq!(page.current_page(), 1);
        assert_eq!(source.calls(), 1);
        let repaired: CatalogPage =
            serde_json::from_str(&store.get("test_page_1").await.unwrap().unwrap()).unwrap();
        assert_eq!(repaired, page);
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates_without_write() {
        let source = CountingSource::new(true);
        let store = Arc::new(MemoryStore::new());
        let cache: PageCache<CatalogPage> = PageCache::new(source.clone(), store.clone(), DEFAULT_CACHE_TTL);

        let result = cache.fetch_page(1).await;
        settle().await;

        assert!(result.is_err());
        assert!(store.is_empty().await);
    }
}
