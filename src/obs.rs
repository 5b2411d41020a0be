//! Observability and logging.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, LogFormat};

pub const DEFAULT_LOG_FILTER: &str = "rust_people_api=debug,tower_http=debug";

/// Resolves the log filter: `RUST_LOG` first, then `LOG_LEVEL`, then the
/// crate default.
pub fn env_filter(log_level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or(DEFAULT_LOG_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) {
    let (text, json) = match config.log_format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(env_filter(config.log_level.as_deref()))
        .with(text)
        .with(json)
        .init();
}
