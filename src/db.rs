use sqlx::{postgres::PgPoolOptions, PgPool};
use std::future::Future;
use std::time::Duration;

/// How many times startup tries to reach PostgreSQL, and how long it waits
/// between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectRetry {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ConnectRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(25)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(120))
            .max_lifetime(Duration::from_secs(300))
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Like [`Database::new`], but keeps trying while the database is still
    /// coming up.
    pub async fn connect_with_retry(
        database_url: &str,
        retry: ConnectRetry,
    ) -> anyhow::Result<Self> {
        retry_connect(retry, || Self::new(database_url)).await
    }

    /// Applies the embedded migrations under `migrations/`.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

async fn retry_connect<T, F, Fut>(retry: ConnectRetry, mut connect: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = retry.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match connect().await {
            Ok(connected) => return Ok(connected),
            Err(e) => {
                tracing::warn!(
                    "Database connection attempt {}/{} failed: {}",
                    attempt,
                    attempts,
                    e
                );
                last_error = Some(e);
                if attempt < attempts {
                    tokio::time::sleep(retry.delay).await;
                }
            }
        }
    }

    let err = last_error.unwrap_or_else(|| anyhow::anyhow!("no connection attempt was made"));
    Err(err.context(format!("Database unreachable after {} attempts", attempts)))
}
