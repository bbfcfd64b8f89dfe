//! Bootstrap utilities for waymark binaries.
//!
//! Tracing setup and storage connections with startup retry.

use std::future::Future;
use std::time::Duration;

use backon::Retryable;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;
use crate::utils::retry::connection_backoff;

/// Initialize tracing with the WAYMARK_LOG environment variable.
///
/// Defaults to "info" level if WAYMARK_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Run `connect` until it succeeds or the connection backoff gives up.
///
/// # Arguments
/// * `target` - Human-readable name for logging (e.g., "sqlite", "postgres")
/// * `connect` - Async function that attempts to establish a connection
pub async fn connect_with_retry<T, E, F, Fut>(target: &str, connect: F) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let connected = connect
        .retry(connection_backoff())
        .notify(|err: &E, dur: Duration| {
            warn!(storage = %target, error = %err, delay = ?dur, "Connection failed, retrying");
        })
        .await?;
    info!(storage = %target, "Connected");
    Ok(connected)
}

/// Open a SQLite pool for the configured file, creating it if missing.
#[cfg(feature = "sqlite")]
pub async fn connect_sqlite(
    storage: &crate::config::StorageConfig,
) -> crate::storage::Result<sqlx::SqlitePool> {
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

    let options = SqliteConnectOptions::new()
        .filename(&storage.path)
        .create_if_missing(true);
    let max_connections = storage.max_connections;

    let pool = connect_with_retry("sqlite", || {
        SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options.clone())
    })
    .await?;
    Ok(pool)
}

/// Open a PostgreSQL pool for the configured URL.
#[cfg(feature = "postgres")]
pub async fn connect_postgres(
    storage: &crate::config::StorageConfig,
) -> crate::storage::Result<sqlx::PgPool> {
    use sqlx::postgres::PgPoolOptions;

    let url = storage.url.as_str();
    let max_connections = storage.max_connections;

    let pool = connect_with_retry("postgres", || {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
    })
    .await?;
    Ok(pool)
}
