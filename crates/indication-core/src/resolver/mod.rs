//! Catalog resolver.
//!
//! Locates one label in the paginated DailyMed listing by scanning pages in
//! order through the page cache.

use tracing::{debug, info, warn};

use crate::cache::PageCache;
use crate::models::{CatalogPage, CatalogRecord};

/// Linear page scanner over the catalog.
pub struct CatalogResolver {
    pages: PageCache<CatalogPage>,
}

impl CatalogResolver {
    pub fn new(pages: PageCache<CatalogPage>) -> Self {
        Self { pages }
    }

    /// Get the page cache for direct access.
    pub fn pages(&self) -> &PageCache<CatalogPage> {
        &self.pages
    }

    /// Find a record by exact set ID.
    pub async fn find_by_identifier(&self, identifier: &str) -> Option<CatalogRecord> {
        self.scan(identifier, |record| record.identifier == identifier)
            .await
    }

    /// Find the first record whose title contains `title`, ignoring case.
    pub async fn find_by_title(&self, title: &str) -> Option<CatalogRecord> {
        let query = title.trim();
        if query.is_empty() {
            return None;
        }
        self.scan(query, |record| record.title_contains(query)).await
    }

    /// Walk pages from 1 until `matches` accepts a record or the pages run out.
    ///
    /// `total_pages` is re-read from every page. A failed page ends the scan
    /// with `None`; callers see "not found", never the fetch error.
    async fn scan<F>(&self, query: &str, matches: F) -> Option<CatalogRecord>
    where
        F: Fn(&CatalogRecord) -> bool,
    {
        let mut current_page = 1;
        let mut total_pages = 1;

        while current_page <= total_pages {
            let page = match self.pages.fetch_page(current_page).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(%query, page = current_page, error = %e, "catalog scan aborted");
                    return None;
                }
            };
            total_pages = page.total_pages();

            if let Some(found) = page.records.into_iter().find(|r| matches(r)) {
                info!(%query, setid = %found.identifier, page = current_page, "catalog record found");
                return Some(found);
            }

            debug!(%query, page = current_page, total_pages, "no match on page");
            current_page += 1;
        }

        info!(%query, pages_scanned = current_page - 1, "catalog record not found");
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::cache::DEFAULT_CACHE_TTL;
    use crate::models::PageMetadata;
    use crate::source::{PageSource, SourceError, SourceResult};
    use crate::store::MemoryStore;

    /// Serves fixed pages; `None` entries fail.
    struct FixedPages {
        pages: Vec<Option<CatalogPage>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PageSource<CatalogPage> for FixedPages {
        fn namespace(&self) -> &str {
            "fixed_page_"
        }

        async fn fetch_page(&self, page: u32) -> SourceResult<CatalogPage> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(page as usize - 1)
                .cloned()
                .flatten()
                .ok_or_else(|| SourceError::Unavailable(format!("page {page}")))
        }
    }

    fn page(current: u32, total: u32, records: &[(&str, &str)]) -> Option<CatalogPage> {
        Some(CatalogPage {
            records: records
                .iter()
                .map(|(id, title)| CatalogRecord::new(*id, *title))
                .collect(),
            metadata: PageMetadata {
                current_page: current,
                total_pages: total,
                ..Default::default()
            },
        })
    }

    fn setup(pages: Vec<Option<CatalogPage>>) -> (CatalogResolver, Arc<FixedPages>) {
        let source = Arc::new(FixedPages {
            pages,
            fetches: AtomicUsize::new(0),
        });
        let cache: PageCache<CatalogPage> =
            PageCache::new(source.clone(), Arc::new(MemoryStore::new()), DEFAULT_CACHE_TTL);
        (CatalogResolver::new(cache), source)
    }

    #[tokio::test]
    async fn test_found_on_second_page_at_index_zero() {
        let (resolver, source) = setup(vec![
            page(1, 2, &[("a", "ASPIRIN"), ("b", "IBUPROFEN")]),
            page(2, 2, &[("target", "DUPIXENT"), ("c", "NAPROXEN")]),
        ]);

        let record = resolver.find_by_identifier("target").await.unwrap();

        assert_eq!(record.title, "DUPIXENT");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stops_at_matching_page() {
        let (resolver, source) = setup(vec![
            page(1, 5, &[("a", "A")]),
            page(2, 5, &[("b", "B")]),
            page(3, 5, &[("c", "C")]),
            page(4, 5, &[("d", "D")]),
            page(5, 5, &[("e", "E")]),
        ]);

        assert!(resolver.find_by_identifier("c").await.is_some());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_after_last_page() {
        let (resolver, source) = setup(vec![page(1, 2, &[("a", "A")]), page(2, 2, &[("b", "B")])]);

        assert!(resolver.find_by_identifier("zzz").await.is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_total_pages_refreshed_per_page() {
        let (resolver, source) = setup(vec![
            page(1, 1, &[("a", "A")]),
            page(2, 3, &[("b", "B")]),
            page(3, 3, &[("c", "C")]),
        ]);
        assert!(resolver.find_by_identifier("c").await.is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        let (resolver, source) = setup(vec![
            page(1, 2, &[("a", "A")]),
            page(2, 3, &[("b", "B")]),
            page(3, 3, &[("c", "C")]),
        ]);
        assert!(resolver.find_by_identifier("c").await.is_some());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_page_is_not_found() {
        let (resolver, source) = setup(vec![page(1, 3, &[("a", "A")]), None, page(3, 3, &[("c", "C")])]);

        assert!(resolver.find_by_identifier("c").await.is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_title_match_is_case_insensitive_substring() {
        let (resolver, _) = setup(vec![page(
            1,
            1,
            &[("a", "ASPIRIN 81 MG"), ("d", "DUPIXENT (DUPILUMAB) INJECTION")],
        )]);

        let record = resolver.find_by_title("dupixent").await.unwrap();
        assert_eq!(record.identifier, "d");

        let record = resolver.find_by_title("Dupilumab").await.unwrap();
        assert_eq!(record.identifier, "d");
    }

    #[tokio::test]
    async fn test_title_first_match_wins() {
        let (resolver, _) = setup(vec![
            page(1, 2, &[("x", "OTHER")]),
            page(2, 2, &[("first", "Dupixent pen"), ("second", "DUPIXENT syringe")]),
        ]);

        assert_eq!(resolver.find_by_title("DUPIXENT").await.unwrap().identifier, "first");
    }

    #[tokio::test]
    async fn test_empty_title_query_does_not_scan() {
        let (resolver, source) = setup(vec![page(1, 1, &[("a", "A")])]);

        assert!(resolver.find_by_title("   ").await.is_none());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }
}
