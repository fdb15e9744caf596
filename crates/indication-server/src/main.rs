//! Indication server entry point.
//!
//! Loads configuration (first CLI argument or `INDICATION_CONFIG`, then
//! environment overrides), wires the pipeline, starts the store sweeper and
//! serves HTTP until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use indication_core::config::ConfigError;
use indication_core::{open_store, DailyMedClient, IndicationConfig};
use indication_llm::AnthropicClient;
use indication_server::{build_service, init_logging, ServerError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli_config = std::env::args().nth(1);
    let config = IndicationConfig::from_sources(cli_config.as_deref())?;
    init_logging(&config)?;

    let api_key = config
        .llm
        .api_key
        .clone()
        .ok_or_else(|| ServerError::Config(ConfigError::Invalid("LLM_API_KEY is not set".into())))?;

    let dailymed = Arc::new(DailyMedClient::new(
        config.dailymed_base_url.clone(),
        config.http_timeout(),
    )?);
    let completion = Arc::new(AnthropicClient::new(
        config.llm.api_url.clone(),
        api_key,
        config.llm.model.clone(),
        config.http_timeout(),
    )?);
    let store = open_store(config.store_path.as_deref())?;

    let service = build_service(&config, dailymed.clone(), dailymed, completion, store);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, store = ?config.store_path, "indication server listening");

    let server = axum::serve(listener, service.router);
    let served = tokio::select! {
        result = server => result.context("server error"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            Ok(())
        }
    };

    service.sweeper.stop().await;
    served
}
