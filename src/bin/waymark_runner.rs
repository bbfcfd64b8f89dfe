//! waymark-runner: hosts one subscription
//!
//! Reads events from the SQLite event store at `storage.path`, applies them
//! to a logging projection, and advances the subscription checkpoint in the
//! configured storage backend. Logs a liveness report on a fixed interval.
//!
//! ## Architecture
//! ```text
//! [SQLite events] --read_forward--> [runner] --batch--> [projections]
//!                                      |
//!                                      v
//!                         [checkpoint store + lock]
//! ```
//!
//! ## Configuration
//! - First argument: configuration file (optional)
//! - WAYMARK_CONFIG: configuration file (optional)
//! - WAYMARK__*: overrides, e.g. WAYMARK__SUBSCRIPTION__BATCH_SIZE=100
//! - WAYMARK_LOG: tracing filter (default: info)
//!
//! With `subscription.transactional: true`, an event-type counter projection
//! is co-committed with the checkpoint.

use std::sync::Arc;

use sqlx::Pool;
use tracing::{error, info, warn};

use waymark::config::{Config, StorageType, SubscriptionConfig};
use waymark::monitor::GapMonitor;
use waymark::processing::{
    BatchCheckpointer, BatchProcessor, Checkpointer, HandlerRegistry,
    PooledTransactionalCheckpointer, TransactionalBatchCheckpointer, UnitOfWork,
};
use waymark::projectors::{EventTypeCounts, LoggingProjection, EVENT_TYPE_COUNTS_DDL};
use waymark::runner::SubscriptionRunner;
use waymark::storage::{
    CheckpointStore, EventStore, RelationalBackend, SqlCheckpointStore, SqliteBackend,
    SqliteEventStore, SqliteSubscriptionLock, SubscriptionLock,
};
use waymark::utils::bootstrap::{connect_sqlite, init_tracing};

type Wiring = (
    Arc<dyn Checkpointer>,
    Arc<dyn CheckpointStore>,
    Arc<dyn SubscriptionLock>,
);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    init_tracing();

    let sub = &config.subscription;
    info!(
        subscription = %sub.id,
        scope = %sub.scope,
        batch_size = sub.batch_size,
        transactional = sub.transactional,
        "waymark-runner starting"
    );

    let events_pool = connect_sqlite(&config.storage).await?;
    let events = Arc::new(SqliteEventStore::new(events_pool.clone()));
    events.init().await?;

    let unit_of_work = Arc::new(UnitOfWork::new());
    let mut registry = HandlerRegistry::builder().on_any(LoggingProjection::new(sub.id.clone()));
    if sub.transactional {
        registry = registry.on_any(EventTypeCounts::new(unit_of_work.clone()));
    }
    let processor = Arc::new(BatchProcessor::new(Arc::new(registry.build())));

    let (checkpointer, checkpoints, lock): Wiring = match config.storage.storage_type {
        StorageType::Sqlite => {
            let lock = SqliteSubscriptionLock::new(events_pool.clone());
            lock.init().await?;
            sqlx::raw_sql(EVENT_TYPE_COUNTS_DDL)
                .execute(&events_pool)
                .await?;
            let (checkpointer, checkpoints) = relational::<SqliteBackend>(
                events_pool.clone(),
                sub,
                processor,
                unit_of_work,
            )
            .await?;
            (checkpointer, checkpoints, Arc::new(lock))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            use waymark::storage::{PostgresAdvisoryLock, PostgresBackend};
            use waymark::utils::bootstrap::connect_postgres;

            let pool = connect_postgres(&config.storage).await?;
            sqlx::raw_sql(EVENT_TYPE_COUNTS_DDL).execute(&pool).await?;
            let lock = PostgresAdvisoryLock::new(pool.clone());
            let (checkpointer, checkpoints) =
                relational::<PostgresBackend>(pool, sub, processor, unit_of_work).await?;
            (checkpointer, checkpoints, Arc::new(lock))
        }
        #[cfg(not(feature = "postgres"))]
        StorageType::Postgres => {
            return Err("postgres storage requires the `postgres` feature".into());
        }
    };

    let events: Arc<dyn EventStore> = events;
    let monitor = GapMonitor::new(events.clone(), checkpoints, sub.id.clone(), sub.scope.clone())
        .with_threshold(sub.liveness_threshold);

    let handle = SubscriptionRunner::new(events, checkpointer, sub.batch_options())
        .with_lock(lock)
        .with_retry(config.retry.clone())
        .with_poll(sub.poll_settings())
        .start();

    let mut status = handle.subscribe();
    let mut ticker = tokio::time::interval(sub.report_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = ticker.tick() => match monitor.report().await {
                Ok(report) => info!(
                    subscription = %report.subscription_id,
                    last_position = ?report.last_position.map(|p| p.0),
                    tail_position = ?report.tail_position.map(|p| p.0),
                    gap = report.gap,
                    live = report.live,
                    "Liveness"
                ),
                Err(e) => warn!(error = %e, "Liveness report failed"),
            },
            changed = status.changed() => {
                if changed.is_err() || status.borrow_and_update().state.is_terminal() {
                    break;
                }
            }
        }
    }

    if let Err(e) = handle.stop().await {
        error!(error = %e, "Subscription ended with error");
        return Err(e.into());
    }

    info!("waymark-runner stopped");
    Ok(())
}

/// Checkpointer and standalone checkpoint store for one relational backend.
async fn relational<B: RelationalBackend>(
    pool: Pool<B::Db>,
    sub: &SubscriptionConfig,
    processor: Arc<BatchProcessor>,
    unit_of_work: Arc<UnitOfWork>,
) -> waymark::storage::Result<(Arc<dyn Checkpointer>, Arc<dyn CheckpointStore>)> {
    let store = SqlCheckpointStore::<B>::new(pool.clone());
    store.init().await?;

    let checkpointer: Arc<dyn Checkpointer> = if sub.transactional {
        Arc::new(PooledTransactionalCheckpointer::new(
            pool,
            TransactionalBatchCheckpointer::<B>::new(sub.id.clone(), processor, unit_of_work),
        ))
    } else {
        Arc::new(BatchCheckpointer::new(
            sub.id.clone(),
            processor,
            SqlCheckpointStore::<B>::new(pool),
        ))
    };

    Ok((checkpointer, Arc::new(store)))
}
