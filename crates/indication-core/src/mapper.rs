//! Indication mapper.
//!
//! Drives one resolution end to end:
//!
//! ```text
//! CacheCheck ──hit──────────────────────────────────────────────▶ Done
//!     │ miss
//!     ▼
//! CatalogLookup ─▶ DocumentFetch ─▶ Extraction ─▶ ExternalMapping ─▶ Persist ─▶ Done
//!     │ none           │ none                          │ error
//!     ▼                ▼                               ▼
//!  NotFound         NotFound                        Upstream
//! ```
//!
//! Concurrent resolutions of the same lookup share one computation through an
//! in-flight registry, so the completion service sees one call per key.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indication_llm::{CompletionClient, CompletionRequest, MAPPING_PROMPT};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::cache::{DocumentCache, PageCache};
use crate::config::IndicationConfig;
use crate::extractor::{ContextExtractor, INDICATION_PATTERN};
use crate::mapping::MappingStore;
use crate::models::{CatalogPage, MappingRecord};
use crate::resolver::CatalogResolver;
use crate::source::{DocumentSource, PageSource};
use crate::store::KvStore;

/// Resolution errors; the only errors callers of the pipeline see.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream failure: {0}")]
    Upstream(String),
}

impl MappingError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MappingError::NotFound(_))
    }
}

pub type MappingResult<T> = Result<T, MappingError>;

/// What to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Identifier(String),
    Title(String),
}

impl Lookup {
    /// Registry key; titles compare case-insensitively.
    fn key(&self) -> String {
        match self {
            Lookup::Identifier(id) => format!("id:{id}"),
            Lookup::Title(title) => format!("title:{}", title.to_lowercase()),
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Lookup::Identifier(value) | Lookup::Title(value) => value.trim().is_empty(),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Identifier(id) => write!(f, "setid {id}"),
            Lookup::Title(title) => write!(f, "title \"{title}\""),
        }
    }
}

type Slot = Arc<OnceCell<MappingResult<MappingRecord>>>;
type Registry = Mutex<HashMap<String, Slot>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, Slot>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One caller's share of an in-flight resolution.
///
/// The registry entry is released on drop, so a caller cancelled mid-await
/// cannot strand a settled result in the registry.
struct InFlight<'a> {
    registry: &'a Registry,
    key: String,
    slot: Slot,
}

impl<'a> InFlight<'a> {
    /// Join the pending resolution for `key`, or register a new one. A settled
    /// slot is never joined.
    fn join(registry: &'a Registry, key: String) -> Self {
        let mut entries = lock(registry);
        let pending = entries
            .get(&key)
            .filter(|slot| !slot.initialized())
            .cloned();
        let slot = match pending {
            Some(slot) => slot,
            None => {
                let slot = Slot::default();
                entries.insert(key.clone(), Arc::clone(&slot));
                slot
            }
        };
        Self {
            registry,
            key,
            slot,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut entries = lock(self.registry);
        // Held by the registry and this caller only, or already settled.
        let finished = self.slot.initialized() || Arc::strong_count(&self.slot) <= 2;
        let current = entries
            .get(&self.key)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot));
        if finished && current {
            entries.remove(&self.key);
        }
    }
}

pub struct IndicationMapper {
    catalog: CatalogResolver,
    documents: DocumentCache,
    extractor: ContextExtractor,
    completion: Arc<dyn CompletionClient>,
    store: MappingStore,
    in_flight: Registry,
}

impl IndicationMapper {
    pub fn new(
        catalog: CatalogResolver,
        documents: DocumentCache,
        extractor: ContextExtractor,
        completion: Arc<dyn CompletionClient>,
        store: MappingStore,
    ) -> Self {
        Self {
            catalog,
            documents,
            extractor,
            completion,
            store,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the full pipeline over one shared store, with TTLs and extractor
    /// settings from `config`.
    pub fn from_config(
        config: &IndicationConfig,
        pages: Arc<dyn PageSource<CatalogPage>>,
        documents: Arc<dyn DocumentSource>,
        completion: Arc<dyn CompletionClient>,
        kv: Arc<dyn KvStore>,
    ) -> Self {
        let page_cache = PageCache::new(pages, Arc::clone(&kv), config.page_ttl());
        Self::new(
            CatalogResolver::new(page_cache),
            DocumentCache::new(documents, Arc::clone(&kv), config.document_ttl()),
            ContextExtractor::new(config.extractor),
            completion,
            MappingStore::new(kv, config.mapping_ttl()),
        )
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn catalog(&self) -> &CatalogResolver {
        &self.catalog
    }

    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    pub async fn resolve_by_identifier(&self, identifier: &str) -> MappingResult<MappingRecord> {
        self.resolve(Lookup::Identifier(identifier.to_string())).await
    }

    pub async fn resolve_by_title(&self, title: &str) -> MappingResult<MappingRecord> {
        self.resolve(Lookup::Title(title.to_string())).await
    }

    /// Resolve a lookup, joining any identical resolution already running.
    pub async fn resolve(&self, lookup: Lookup) -> MappingResult<MappingRecord> {
        if lookup.is_blank() {
            return Err(MappingError::NotFound(format!("empty lookup: {lookup}")));
        }

        let flight = InFlight::join(&self.in_flight, lookup.key());
        let result = flight.slot.get_or_init(|| self.run(&lookup)).await.clone();
        result
    }

    async fn run(&self, lookup: &Lookup) -> MappingResult<MappingRecord> {
        // CacheCheck
        if let Some(record) = self.cached(lookup).await {
            info!(%lookup, setid = %record.identifier, "mapping served from store");
            return Ok(record);
        }

        // CatalogLookup
        let entry = match lookup {
            Lookup::Identifier(id) => self.catalog.find_by_identifier(id).await,
            Lookup::Title(title) => self.catalog.find_by_title(title).await,
        }
        .ok_or_else(|| MappingError::NotFound(format!("no catalog entry for {lookup}")))?;
        info!(%lookup, setid = %entry.identifier, "catalog entry resolved");

        if let Lookup::Title(_) = lookup {
            if let Some(record) = self.store.get_by_id(&entry.identifier).await {
                info!(%lookup, setid = %record.identifier, "mapping served from store");
                return Ok(record);
            }
        }

        // DocumentFetch
        let document = self
            .documents
            .fetch_document(&entry.identifier)
            .await
            .ok_or_else(|| {
                MappingError::NotFound(format!("no label document for setid {}", entry.identifier))
            })?;

        // Extraction
        let context = self.extractor.extract(&document, INDICATION_PATTERN);
        if context.is_empty() {
            warn!(setid = %entry.identifier, "no indication context in label");
        } else {
            debug!(setid = %entry.identifier, snippets = context.snippets.len(), "context extracted");
        }

        // ExternalMapping
        let request = CompletionRequest::new(MAPPING_PROMPT, context.snippets.clone());
        let response = self.completion.complete(&request).await.map_err(|e| {
            error!(setid = %entry.identifier, error = %e, "completion failed");
            MappingError::Upstream(e.to_string())
        })?;
        info!(
            setid = %entry.identifier,
            total_tokens = response.total_tokens,
            "completion received"
        );

        // Persist
        let derived = serde_json::to_value(&response).ok();
        let record = MappingRecord::new(entry.identifier, entry.title, context.snippets, derived);
        if !self.store.save_record(&record).await {
            warn!(setid = %record.identifier, "mapping not persisted; returning fresh result");
        }
        Ok(record)
    }

    async fn cached(&self, lookup: &Lookup) -> Option<MappingRecord> {
        match lookup {
            Lookup::Identifier(id) => self.store.get_by_id(id).await,
            Lookup::Title(title) => {
                let identifier = self.store.find_identifier_by_title(title).await?;
                self.store.get_by_id(&identifier).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use indication_llm::{CompletionResponse, LlmResult, MockCompletionClient};

    use super::*;
    use crate::cache::testing::UnreachableStore;
    use crate::models::{CatalogRecord, PageMetadata};
    use crate::source::{SourceError, SourceResult};
    use crate::store::MemoryStore;

    const LABEL: &str = "<document><title>DUPIXENT</title>\
        <section><title>1 INDICATIONS AND USAGE</title>\
        <paragraph>Atopic dermatitis</paragraph></section></document>";

    struct OnePage;

    #[async_trait]
    impl PageSource<CatalogPage> for OnePage {
        fn namespace(&self) -> &str {
            "one_page_"
        }

        async fn fetch_page(&self, _page: u32) -> SourceResult<CatalogPage> {
            Ok(CatalogPage {
                records: vec![
                    CatalogRecord::new("set-1", "DUPIXENT (dupilumab) injection"),
                    CatalogRecord::new("no-label", "GHOST tablets"),
                ],
                metadata: PageMetadata {
                    current_page: 1,
                    total_pages: 1,
                    ..Default::default()
                },
            })
        }
    }

    struct Labels;

    #[async_trait]
    impl DocumentSource for Labels {
        fn namespace(&self) -> &str {
            "labels_"
        }

        async fn fetch_document(&self, identifier: &str) -> SourceResult<String> {
            match identifier {
                "set-1" => Ok(LABEL.to_string()),
                _ => Err(SourceError::Unavailable(identifier.to_string())),
            }
        }
    }

    /// Completion that takes a while, so callers overlap.
    struct SlowCompletion {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionClient for SlowCompletion {
        async fn complete(&self, _request: &CompletionRequest) -> LlmResult<CompletionResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(CompletionResponse {
                text: "{}".into(),
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            })
        }
    }

    fn mapper_with(
        completion: Arc<dyn CompletionClient>,
        kv: Arc<dyn KvStore>,
    ) -> IndicationMapper {
        IndicationMapper::from_config(
            &IndicationConfig::default(),
            Arc::new(OnePage),
            Arc::new(Labels),
            completion,
            kv,
        )
    }

    #[tokio::test]
    async fn test_resolve_by_identifier() {
        let completion = Arc::new(MockCompletionClient::new(r#"{"drug_name": "DUPIXENT"}"#));
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let record = mapper.resolve_by_identifier("set-1").await.unwrap();

        assert_eq!(record.identifier, "set-1");
        assert_eq!(record.title, "DUPIXENT (dupilumab) injection");
        assert_eq!(
            record.contexts,
            vec!["dupixent 1 indications and usage atopic dermatitis".to_string()]
        );
        let derived = record.derived_data.as_ref().unwrap();
        assert_eq!(derived["text"], r#"{"drug_name": "DUPIXENT"}"#);
        assert_eq!(completion.calls(), 1);

        let stored = mapper.store().get_by_id("set-1").await.unwrap();
        assert_eq!(stored, record);
    }

    #[tokio::test]
    async fn test_second_resolution_hits_store() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let first = mapper.resolve_by_identifier("set-1").await.unwrap();
        let second = mapper.resolve_by_identifier("set-1").await.unwrap();
        let by_title = mapper.resolve_by_title("dupixent (DUPILUMAB) injection").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, by_title);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_title_resolves_through_catalog_then_store() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let first = mapper.resolve_by_title("dupixent").await.unwrap();
        assert_eq!(first.identifier, "set-1");

        // A different title substring reaches the same record without a new call.
        let second = mapper.resolve_by_title("Dupilumab").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(completion.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_identifier_is_not_found() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let err = mapper.resolve_by_identifier("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(completion.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found_without_write() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let kv = Arc::new(MemoryStore::new());
        let mapper = mapper_with(completion.clone(), kv.clone());

        let err = mapper.resolve_by_identifier("no-label").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(completion.calls(), 0);
        assert!(mapper.store().list_all_identifiers().await.is_empty());
        assert!(kv.get("indication:mapping:no-label").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_completion_failure_is_upstream() {
        let mapper = mapper_with(
            Arc::new(MockCompletionClient::failing()),
            Arc::new(MemoryStore::new()),
        );

        let err = mapper.resolve_by_identifier("set-1").await.unwrap_err();
        assert!(matches!(err, MappingError::Upstream(_)));
        assert!(mapper.store().get_by_id("set-1").await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_store_still_resolves() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let mapper = mapper_with(completion.clone(), Arc::new(UnreachableStore));

        assert!(mapper.resolve_by_identifier("set-1").await.is_ok());
        assert!(mapper.resolve_by_identifier("set-1").await.is_ok());
        assert_eq!(completion.calls(), 2);
    }

    #[tokio::test]
    async fn test_blank_lookup_is_not_found() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        assert!(mapper.resolve_by_identifier(" ").await.unwrap_err().is_not_found());
        assert!(mapper.resolve_by_title("").await.unwrap_err().is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_resolutions_share_one_call() {
        let completion = Arc::new(SlowCompletion {
            calls: AtomicUsize::new(0),
        });
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let (a, b, c) = tokio::join!(
            mapper.resolve_by_identifier("set-1"),
            mapper.resolve_by_identifier("set-1"),
            mapper.resolve_by_identifier("set-1"),
        );

        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        assert_eq!(a, c.unwrap());
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
        assert!(lock(&mapper.in_flight).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_title_keys_coalesce_ignoring_case() {
        let completion = Arc::new(SlowCompletion {
            calls: AtomicUsize::new(0),
        });
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let (a, b) = tokio::join!(
            mapper.resolve_by_title("Dupixent"),
            mapper.resolve_by_title("DUPIXENT"),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_resolution_releases_its_entry() {
        let completion = Arc::new(SlowCompletion {
            calls: AtomicUsize::new(0),
        });
        let mapper = Arc::new(mapper_with(completion.clone(), Arc::new(MemoryStore::new())));

        let spawn_resolve = || {
            let mapper = Arc::clone(&mapper);
            tokio::spawn(async move { mapper.resolve_by_identifier("set-1").await })
        };

        // A waiter cancelled while the first caller is still computing.
        let first = spawn_resolve();
        let waiter = spawn_resolve();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(lock(&mapper.in_flight).len(), 1);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());
        assert_eq!(lock(&mapper.in_flight).len(), 1);

        first.await.unwrap().unwrap();
        assert!(lock(&mapper.in_flight).is_empty());
        assert_eq!(completion.calls.load(Ordering::SeqCst), 1);

        // The only caller cancelled mid-computation.
        mapper.store().delete("set-1").await;
        let only = spawn_resolve();
        tokio::time::sleep(Duration::from_secs(1)).await;
        only.abort();
        assert!(only.await.unwrap_err().is_cancelled());
        assert!(lock(&mapper.in_flight).is_empty());

        mapper.resolve_by_identifier("set-1").await.unwrap();
        assert_eq!(completion.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_settled_entry_is_never_replayed() {
        let completion = Arc::new(MockCompletionClient::new("{}"));
        let mapper = mapper_with(completion.clone(), Arc::new(MemoryStore::new()));

        let settled: Slot = Arc::new(OnceCell::new_with(Some(Err(MappingError::Upstream(
            "transient".into(),
        )))));
        lock(&mapper.in_flight).insert("id:set-1".into(), settled);

        let record = mapper.resolve_by_identifier("set-1").await.unwrap();
        assert_eq!(record.identifier, "set-1");
        assert_eq!(completion.calls(), 1);
        assert!(lock(&mapper.in_flight).is_empty());
    }

    #[test]
    fn test_lookup_keys() {
        assert_eq!(Lookup::Identifier("ABC".into()).key(), "id:ABC");
        assert_eq!(Lookup::Title("DuPixent".into()).key(), "title:dupixent");
        assert_eq!(Lookup::Title("x".into()).to_string(), "title \"x\"");
    }
}
