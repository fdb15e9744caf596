//! Service configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. Every field has a default, so an empty file (or none) is a
//! valid configuration.

use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::extractor::ExtractorConfig;

const CONFIG_PATH_ENV: &str = "INDICATION_CONFIG";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicationConfig {
    /// DailyMed root, without trailing slash
    pub dailymed_base_url: String,
    /// Transport timeout for outbound HTTP, in seconds
    pub http_timeout_secs: u64,
    /// SQLite file for the store; in-memory when unset
    pub store_path: Option<PathBuf>,
    pub bind_addr: String,
    pub log_level: String,
    pub llm: LlmSettings,
    pub cache: CacheSettings,
    pub extractor: ExtractorConfig,
}

impl Default for IndicationConfig {
    fn default() -> Self {
        Self {
            dailymed_base_url: String::from("https://dailymed.nlm.nih.gov/dailymed"),
            http_timeout_secs: 30,
            store_path: None,
            bind_addr: String::from("127.0.0.1:3000"),
            log_level: String::from("info"),
            llm: LlmSettings::default(),
            cache: CacheSettings::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: indication_llm::DEFAULT_API_URL.to_string(),
            api_key: None,
            model: indication_llm::DEFAULT_MODEL.to_string(),
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}

/// Entry lifetimes and the maintenance sweep period, in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub page_ttl_secs: u64,
    pub document_ttl_secs: u64,
    pub mapping_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            page_ttl_secs: crate::cache::DEFAULT_CACHE_TTL.as_secs(),
            document_ttl_secs: crate::cache::DEFAULT_CACHE_TTL.as_secs(),
            mapping_ttl_secs: crate::mapping::DEFAULT_MAPPING_TTL.as_secs(),
            sweep_interval_secs: crate::sweeper::DEFAULT_SWEEP_INTERVAL.as_secs(),
        }
    }
}

impl IndicationConfig {
    /// Load from `cli_path`, else `$INDICATION_CONFIG`, else defaults; then
    /// apply environment overrides and validate.
    pub fn from_sources(cli_path: Option<&str>) -> ConfigResult<Self> {
        if cli_path.is_some_and(str::is_empty) {
            return Err(ConfigError::Invalid(
                "configuration path must not be empty".into(),
            ));
        }

        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        let mut config = match cli_path.or(env_path.as_deref().filter(|p| !p.is_empty())) {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    /// Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DAILYMED_API_BASE_URL") {
            self.dailymed_base_url = v;
        }
        if let Some(v) = get("LLM_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = get("LLM_API_URL") {
            self.llm.api_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("INDICATION_STORE_PATH") {
            self.store_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("INDICATION_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("INDICATION_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.dailymed_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "dailymed_base_url must not be empty".into(),
            ));
        }

        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "http_timeout_secs must be greater than zero".into(),
            ));
        }

        let ttls = [
            ("cache.page_ttl_secs", self.cache.page_ttl_secs),
            ("cache.document_ttl_secs", self.cache.document_ttl_secs),
            ("cache.mapping_ttl_secs", self.cache.mapping_ttl_secs),
            ("cache.sweep_interval_secs", self.cache.sweep_interval_secs),
        ];
        if let Some((name, _)) = ttls.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!(
                "{name} must be greater than zero"
            )));
        }

        if self.extractor.max_snippets == 0 {
            return Err(ConfigError::Invalid(
                "extractor.max_snippets must be greater than zero".into(),
            ));
        }

        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> ConfigResult<SocketAddr> {
        self.bind_addr
            .parse()
            .map_err(|err| ConfigError::Invalid(format!("invalid bind_addr: {err}")))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.page_ttl_secs)
    }

    pub fn document_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.document_ttl_secs)
    }

    pub fn mapping_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.mapping_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.cache.sweep_interval_secs)
    }
}
