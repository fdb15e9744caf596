//! DailyMed HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, error};

use crate::models::CatalogPage;
use crate::source::{DocumentSource, PageSource, SourceError, SourceResult};

pub const PAGE_NAMESPACE: &str = "dailymed_page_";
pub const LABEL_NAMESPACE: &str = "dailymed_label_";

/// Client for the DailyMed SPL listing and label documents.
#[derive(Debug, Clone)]
pub struct DailyMedClient {
    http: Client,
    base_url: String,
}

impl DailyMedClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}/services/v2/spls.json?page={}", self.base_url, page)
    }

    pub fn label_url(&self, setid: &str) -> String {
        format!("{}/fda/fdaDrugXsl.cfm?setid={}&type=xml", self.base_url, setid)
    }

    async fn get(&self, url: &str) -> SourceResult<Response> {
        let response = self.http.get(url).send().await.map_err(|e| {
            error!(%url, error = %e, "DailyMed request failed");
            SourceError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(%url, status = status.as_u16(), "DailyMed returned an error status");
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl PageSource<CatalogPage> for DailyMedClient {
    fn namespace(&self) -> &str {
        PAGE_NAMESPACE
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<CatalogPage> {
        let url = self.page_url(page);
        debug!(%url, "fetching catalog page");
        let body = self.get(&url).await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DocumentSource for DailyMedClient {
    fn namespace(&self) -> &str {
        LABEL_NAMESPACE
    }

    async fn fetch_document(&self, identifier: &str) -> SourceResult<String> {
        let url = self.label_url(identifier);
        debug!(%url, "fetching label document");
        Ok(self.get(&url).await?.text().await?)
    }
}
