//! Indication Core Library
//!
//! Resolves a DailyMed drug label (by set ID or title) to the conditions it
//! treats, coded as ICD-10 by an external completion service.
//!
//! # Architecture
//!
//! ```text
//!                 Lookup (setid | title)
//!                          │
//!                          ▼
//!              ┌───────────────────────┐   hit
//!              │     MappingStore      │──────────────────────────┐
//!              └───────────┬───────────┘                          │
//!                          │ miss                                 │
//!                          ▼                                      │
//!              CatalogResolver ── PageCache ── DailyMed spls.json │
//!                          │                                      │
//!                          ▼                                      │
//!              DocumentCache ───────────────── DailyMed label XML │
//!                          │                                      │
//!                          ▼                                      │
//!              ContextExtractor ("indication" window)             │
//!                          │                                      │
//!                          ▼                                      │
//!              CompletionClient (ICD-10 mapping)                  │
//!                          │                                      │
//!                          ▼                                      ▼
//!              MappingStore::save ──────────────────────────▶ MappingRecord
//! ```
//!
//! Every cache and the mapping store sit on one injected [`store::KvStore`].
//! A store that is down slows things down but never fails a resolution.
//!
//! # Modules
//!
//! - [`store`]: Key-value capability with memory and SQLite backends
//! - [`source`]: Upstream source traits
//! - [`dailymed`]: DailyMed HTTP client
//! - [`cache`]: Cache-aside page and document caches
//! - [`diagnostics`]: Cache events and counters
//! - [`resolver`]: Paginated catalog search
//! - [`extractor`]: Context windows around a pattern in label markup
//! - [`mapping`]: Expiring mapping store with title index
//! - [`mapper`]: End-to-end orchestration
//! - [`sweeper`]: Periodic purge of expired entries and index reconciliation
//! - [`config`]: Service configuration
//! - [`models`]: Domain types

pub mod cache;
pub mod config;
pub mod dailymed;
pub mod diagnostics;
pub mod extractor;
pub mod mapper;
pub mod mapping;
pub mod models;
pub mod resolver;
pub mod source;
pub mod store;
pub mod sweeper;

// Re-export commonly used types
pub use cache::{DocumentCache, PageCache};
pub use config::{ConfigError, IndicationConfig};
pub use dailymed::DailyMedClient;
pub use diagnostics::{CacheEvent, CacheStats};
pub use extractor::{extract, ContextExtractor, ExtractorConfig};
pub use mapper::{IndicationMapper, Lookup, MappingError, MappingResult};
pub use mapping::MappingStore;
pub use models::{CatalogPage, CatalogRecord, ExtractedContext, MappingRecord, PageMetadata};
pub use resolver::CatalogResolver;
pub use source::{DocumentSource, PageSource, SourceError};
pub use store::{open_store, KvStore, MemoryStore, SqliteStore, StoreError};
pub use sweeper::{spawn_sweeper, sweep_once, SweepReport, SweeperHandle};
