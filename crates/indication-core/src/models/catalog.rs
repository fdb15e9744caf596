//! DailyMed catalog models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One structured product label entry in the DailyMed catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogRecord {
    /// Set ID - unique, stable across label versions
    #[serde(rename = "setid")]
    pub identifier: String,
    /// Label title (drug name, form, manufacturer)
    pub title: String,
    /// Label version within the set
    #[serde(rename = "spl_version")]
    pub version: i64,
    /// Publication date as reported upstream (e.g. "Jan 05, 2024")
    pub published_date: String,
}

impl CatalogRecord {
    pub fn new(identifier: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            title: title.into(),
            version: 1,
            published_date: String::new(),
        }
    }

    /// Case-insensitive substring match against the title.
    pub fn title_contains(&self, query: &str) -> bool {
        self.title.to_lowercase().contains(&query.to_lowercase())
    }

    /// Parse the publication date, accepting DailyMed's display format and ISO dates.
    pub fn published_on(&self) -> Option<NaiveDate> {
        ["%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(self.published_date.trim(), fmt).ok())
    }
}

/// Pagination metadata attached to every catalog page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PageMetadata {
    pub total_pages: u32,
    pub current_page: u32,
    #[serde(default)]
    pub next_page: Option<u32>,
    #[serde(default)]
    pub previous_page: Option<u32>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub elements_per_page: u32,
    #[serde(default)]
    pub db_published_date: Option<String>,
    #[serde(default)]
    pub current_url: Option<String>,
    #[serde(default)]
    pub next_page_url: Option<String>,
    #[serde(default)]
    pub previous_page_url: Option<String>,
}

/// One page of the catalog - the unit of caching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogPage {
    #[serde(rename = "data")]
    pub records: Vec<CatalogRecord>,
    pub metadata: PageMetadata,
}

impl CatalogPage {
    pub fn current_page(&self) -> u32 {
        self.metadata.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.metadata.total_pages
    }
}
