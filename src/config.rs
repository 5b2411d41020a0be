use std::time::Duration;
use url::Url;

use crate::db::ConnectRetry;
use crate::enrichment::{EnricherConfig, DEFAULT_ENRICHMENT_TIMEOUT};
use crate::lookup_client::LookupClientConfig;

/// Log output format selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Startup connection tries before giving up (`DB_CONNECT_ATTEMPTS`).
    pub db_connect_attempts: u32,
    pub db_connect_delay: Duration,
    pub port: u16,
    /// Enrichment sources; an absent endpoint disables that source.
    pub age_api: Option<Url>,
    pub gender_api: Option<Url>,
    pub nationality_api: Option<Url>,
    pub enrichment_timeout: Duration,
    /// Budget for one request to the people routes, enforced by the timeout
    /// middleware. Enrichment inside a create/update also stops at it.
    pub request_timeout: Duration,
    /// Per-request reqwest timeout; never shorter than `enrichment_timeout`.
    pub lookup_http_timeout: Duration,
    pub log_format: LogFormat,
    /// Fallback filter used when `RUST_LOG` is unset.
    pub log_level: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: get("DB_URL")
                .or_else(|| get("DATABASE_URL"))
                .ok_or_else(|| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            db_connect_attempts: match get("DB_CONNECT_ATTEMPTS")
                .filter(|v| !v.trim().is_empty())
            {
                None => ConnectRetry::default().attempts,
                Some(raw) => match raw.trim().parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => anyhow::bail!("DB_CONNECT_ATTEMPTS must be a positive integer"),
                },
            },
            db_connect_delay: millis(
                "DB_CONNECT_DELAY_MS",
                get("DB_CONNECT_DELAY_MS"),
                ConnectRetry::default().delay,
            )?,
            port: get("PORT")
                .unwrap_or_else(|| "8086".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            age_api: source_endpoint("AGE_API", get("AGE_API"))?,
            gender_api: source_endpoint("GENDER_API", get("GENDER_API"))?,
            nationality_api: source_endpoint("NATIONALITY_API", get("NATIONALITY_API"))?,
            enrichment_timeout: millis(
                "ENRICHMENT_TIMEOUT_MS",
                get("ENRICHMENT_TIMEOUT_MS"),
                DEFAULT_ENRICHMENT_TIMEOUT,
            )?,
            request_timeout: millis(
                "REQUEST_TIMEOUT_MS",
                get("REQUEST_TIMEOUT_MS"),
                Duration::from_secs(5),
            )?,
            lookup_http_timeout: millis(
                "LOOKUP_HTTP_TIMEOUT_MS",
                get("LOOKUP_HTTP_TIMEOUT_MS"),
                Duration::from_secs(3),
            )?,
            log_format: match get("LOG_FORMAT").as_deref().map(str::trim) {
                None | Some("") | Some("text") => LogFormat::Text,
                Some("json") => LogFormat::Json,
                Some(other) => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
            },
            log_level: get("LOG_LEVEL").filter(|s| !s.trim().is_empty()),
        };

        if config.lookup_http_timeout < config.enrichment_timeout {
            anyhow::bail!(
                "LOOKUP_HTTP_TIMEOUT_MS ({}ms) must not be shorter than ENRICHMENT_TIMEOUT_MS ({}ms)",
                config.lookup_http_timeout.as_millis(),
                config.enrichment_timeout.as_millis()
            );
        }

        Ok(config)
    }

    /// Logs the loaded configuration without sensitive values.
    pub fn log_summary(&self) {
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            self.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!(
            "Database connect: {} attempts, {}ms apart",
            self.db_connect_attempts,
            self.db_connect_delay.as_millis()
        );
        tracing::debug!("Server Port: {}", self.port);

        for (label, env, endpoint) in [
            ("Age API", "AGE_API", &self.age_api),
            ("Gender API", "GENDER_API", &self.gender_api),
            ("Nationality API", "NATIONALITY_API", &self.nationality_api),
        ] {
            match endpoint {
                Some(url) => tracing::info!("{} endpoint: {}", label, url),
                None => tracing::warn!(
                    "{} endpoint not configured ({} environment variable is empty)",
                    label,
                    env
                ),
            }
        }
        tracing::debug!(
            "Enrichment timeout: {}ms, request timeout: {}ms",
            self.enrichment_timeout.as_millis(),
            self.request_timeout.as_millis()
        );
    }

    pub fn connect_retry(&self) -> ConnectRetry {
        ConnectRetry {
            attempts: self.db_connect_attempts,
            delay: self.db_connect_delay,
        }
    }

    pub fn enricher_config(&self) -> EnricherConfig {
        EnricherConfig {
            age_api: self.age_api.clone(),
            gender_api: self.gender_api.clone(),
            nationality_api: self.nationality_api.clone(),
            timeout: self.enrichment_timeout,
            http: LookupClientConfig {
                request_timeout: self.lookup_http_timeout,
                ..LookupClientConfig::default()
            },
        }
    }
}

fn source_endpoint(key: &str, value: Option<String>) -> anyhow::Result<Option<Url>> {
    let Some(raw) = value.filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let url = Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", key, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", key);
    }
    Ok(Some(url))
}

fn millis(key: &str, value: Option<String>, default: Duration) -> anyhow::Result<Duration> {
    match value.filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => {
            let ms: u64 = raw
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a number of milliseconds", key))?;
            if ms == 0 {
                anyhow::bail!("{} must be greater than zero", key);
            }
            Ok(Duration::from_millis(ms))
        }
    }
}
