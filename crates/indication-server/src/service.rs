//! Process wiring: the mapper, its router and the store sweeper.

use std::sync::Arc;

use axum::Router;
use indication_core::source::{DocumentSource, PageSource};
use indication_core::{
    spawn_sweeper, CatalogPage, IndicationConfig, IndicationMapper, KvStore, SweeperHandle,
};
use indication_llm::CompletionClient;

use crate::routes::router;

/// A wired service. Stop the sweeper on shutdown.
pub struct Service {
    pub router: Router,
    pub sweeper: SweeperHandle,
}

/// Build the pipeline over `store` and start sweeping it every
/// `cache.sweep_interval_secs`. Must run inside a Tokio runtime.
pub fn build_service(
    config: &IndicationConfig,
    pages: Arc<dyn PageSource<CatalogPage>>,
    documents: Arc<dyn DocumentSource>,
    completion: Arc<dyn CompletionClient>,
    store: Arc<dyn KvStore>,
) -> Service {
    let mapper =
        IndicationMapper::from_config(config, pages, documents, completion, Arc::clone(&store));
    let sweeper = spawn_sweeper(store, mapper.store().clone(), config.sweep_interval());
    Service {
        router: router(Arc::new(mapper)),
        sweeper,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use indication_core::MemoryStore;
    use indication_llm::MockCompletionClient;
    use serde_json::json;

    use super::*;
    use crate::testing::{send, Catalog, Labels};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_prunes_expired_mappings_from_listing() {
        let mut config = IndicationConfig::default();
        config.cache.mapping_ttl_secs = 10;
        config.cache.sweep_interval_secs = 60;

        let service = build_service(
            &config,
            Arc::new(Catalog),
            Arc::new(Labels),
            Arc::new(MockCompletionClient::new("{}")),
            Arc::new(MemoryStore::new()),
        );

        let (status, _) = send(&service.router, "GET", "/indication/drug/set-1").await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = send(&service.router, "GET", "/indication").await;
        assert_eq!(body["identifiers"], json!(["set-1"]));

        tokio::time::sleep(Duration::from_secs(61)).await;

        let (_, body) = send(&service.router, "GET", "/indication").await;
        assert_eq!(body["identifiers"], json!([]));
        assert_eq!(service.sweeper.stop().await, 2);
    }
}
