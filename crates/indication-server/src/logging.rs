use std::io;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use indication_core::IndicationConfig;

use crate::error::{Result, ServerError};

/// Install the global JSON subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(config: &IndicationConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_span_list(false)
                .with_target(true)
                .with_level(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(io::stdout),
        )
        .try_init()
        .map_err(|err| ServerError::Logger(err.to_string()))?;

    Ok(())
}

fn build_env_filter(config: &IndicationConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directive = config.log_level.as_str();
    EnvFilter::try_new(directive)
        .map_err(|err| ServerError::Logger(format!("invalid log level '{directive}': {err}")))
}
