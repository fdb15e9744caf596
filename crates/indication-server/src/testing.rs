//! Fakes and request helpers for router tests.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use indication_core::source::{DocumentSource, PageSource, SourceError, SourceResult};
use indication_core::{CatalogPage, CatalogRecord, PageMetadata};
use tower::ServiceExt; // for `oneshot`

/// One catalog page with a labelled and an unlabelled entry.
pub struct Catalog;

#[async_trait]
impl PageSource<CatalogPage> for Catalog {
    fn namespace(&self) -> &str {
        "route_page_"
    }

    async fn fetch_page(&self, page: u32) -> SourceResult<CatalogPage> {
        Ok(CatalogPage {
            records: vec![
                CatalogRecord::new("set-1", "DUPIXENT injection"),
                CatalogRecord::new("set-2", "UNLABELED tablets"),
            ],
            metadata: PageMetadata {
                current_page: page,
                total_pages: 1,
                ..Default::default()
            },
        })
    }
}

/// Serves a label for `set-1` only.
pub struct Labels;

#[async_trait]
impl DocumentSource for Labels {
    fn namespace(&self) -> &str {
        "route_label_"
    }

    async fn fetch_document(&self, identifier: &str) -> SourceResult<String> {
        if identifier == "set-1" {
            Ok("<doc><p>INDICATIONS</p><p>Asthma</p></doc>".to_string())
        } else {
            Err(SourceError::Unavailable(identifier.to_string()))
        }
    }
}

pub async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}
