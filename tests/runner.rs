//! End-to-end subscription runs against file-backed SQLite.
//!
//! Run with: cargo test --test runner --features sqlite

use std::sync::Arc;
use std::time::Duration;

use sqlx::{Row, SqlitePool};
use tempfile::TempDir;
use tokio::sync::RwLock;

use waymark::model::{BatchProcessingOptions, NewEvent, Position, ResolvedEvent, StreamScope};
use waymark::monitor::GapMonitor;
use waymark::processing::{
    BatchCheckpointer, BatchProcessor, HandlerRegistry, PooledTransactionalCheckpointer,
    TransactionalBatchCheckpointer, UnitOfWork,
};
use waymark::projectors::{CollectorProjection, EventTypeCounts, EVENT_TYPE_COUNTS_DDL};
use waymark::runner::{PollSettings, RunnerError, RunnerHandle, RunnerState, SubscriptionRunner};
use waymark::storage::{
    CheckpointStore, EventStore, ExpectedRevision, SqliteBackend, SqliteCheckpointStore,
    SqliteEventStore, SqliteSubscriptionLock,
};
use waymark::utils::retry::RetryConfig;

const SUBSCRIPTION: &str = "cart-view";

type Collected = Arc<RwLock<Vec<ResolvedEvent>>>;

struct Fixture {
    _dir: TempDir,
    pool: SqlitePool,
    events: Arc<SqliteEventStore>,
    checkpoints: Arc<SqliteCheckpointStore>,
    lock: Arc<SqliteSubscriptionLock>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let uri = format!("sqlite://{}?mode=rwc", dir.path().join("runner.db").display());
    let pool = SqlitePool::connect(&uri).await.unwrap();

    let events = Arc::new(SqliteEventStore::new(pool.clone()));
    events.init().await.unwrap();
    let checkpoints = Arc::new(SqliteCheckpointStore::new(pool.clone()));
    checkpoints.init().await.unwrap();
    let lock = Arc::new(SqliteSubscriptionLock::new(pool.clone()));
    lock.init().await.unwrap();

    Fixture {
        _dir: dir,
        pool,
        events,
        checkpoints,
        lock,
    }
}

async fn append(events: &SqliteEventStore, stream: &str, event_type: &str, count: usize) {
    let batch = (0..count)
        .map(|i| NewEvent::new(event_type, format!("{{\"line\":{i}}}").into_bytes()))
        .collect();
    events
        .append(stream, ExpectedRevision::Any, batch)
        .await
        .unwrap();
}

fn quick(runner: SubscriptionRunner) -> SubscriptionRunner {
    runner
        .with_retry(RetryConfig {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(50),
            max_retries: 3,
            jitter: 0.0,
        })
        .with_poll(PollSettings {
            poll_interval: Duration::from_millis(10),
            max_poll_interval: Duration::from_millis(50),
        })
}

/// Runner feeding a collector, plus a handle to what it collected.
fn collecting_runner(fx: &Fixture, scope: StreamScope) -> (SubscriptionRunner, Collected) {
    let collector = CollectorProjection::new();
    let collected = collector.collected();

    let registry = HandlerRegistry::builder().on_any(collector).build();
    let processor = Arc::new(BatchProcessor::new(Arc::new(registry)));
    let checkpointer = Arc::new(BatchCheckpointer::new(
        SUBSCRIPTION,
        processor,
        fx.checkpoints.clone(),
    ));
    let runner = SubscriptionRunner::new(
        fx.events.clone(),
        checkpointer,
        BatchProcessingOptions::new(4, scope),
    )
    .with_lock(fx.lock.clone());

    (quick(runner), collected)
}

async fn within<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

async fn caught_up(handle: &RunnerHandle, position: u64) {
    within(handle.wait_for(|s| s.last_position == Some(Position(position)))).await;
}

async fn positions(collected: &Collected) -> Vec<u64> {
    collected.read().await.iter().map(|e| e.position.0).collect()
}

#[tokio::test]
async fn test_runner_catches_up_and_goes_live() {
    let fx = fixture().await;
    append(&fx.events, "cart-1", "ItemAdded", 6).await;
    append(&fx.events, "cart-2", "ItemAdded", 5).await;

    let monitor = GapMonitor::new(
        fx.events.clone(),
        fx.checkpoints.clone(),
        SUBSCRIPTION,
        StreamScope::All,
    );
    let before = monitor.report().await.unwrap();
    assert_eq!(before.gap, 11);
    assert!(!before.live);

    let (runner, collected) = collecting_runner(&fx, StreamScope::All);
    let handle = runner.start();
    caught_up(&handle, 10).await;

    assert_eq!(positions(&collected).await, (0..=10).collect::<Vec<_>>());
    let after = monitor.report().await.unwrap();
    assert_eq!(after.gap, 0);
    assert!(after.live);

    within(handle.stop()).await.unwrap();
}

#[tokio::test]
async fn test_restart_resumes_after_last_checkpoint() {
    let fx = fixture().await;
    append(&fx.events, "cart-1", "ItemAdded", 5).await;

    let (runner, first_run) = collecting_runner(&fx, StreamScope::All);
    let handle = runner.start();
    caught_up(&handle, 4).await;
    within(handle.stop()).await.unwrap();
    assert_eq!(positions(&first_run).await.len(), 5);

    append(&fx.events, "cart-1", "ItemAdded", 3).await;

    let (runner, second_run) = collecting_runner(&fx, StreamScope::All);
    let handle = runner.start();
    caught_up(&handle, 7).await;
    within(handle.stop()).await.unwrap();

    assert_eq!(positions(&second_run).await, vec![5, 6, 7]);
}

#[tokio::test]
async fn test_stream_scope_follows_revisions() {
    let fx = fixture().await;
    append(&fx.events, "cart-1", "ItemAdded", 2).await;
    append(&fx.events, "cart-2", "ItemAdded", 3).await;
    append(&fx.events, "cart-1", "CheckedOut", 1).await;

    let (runner, collected) = collecting_runner(&fx, StreamScope::stream("cart-1"));
    let handle = runner.start();
    caught_up(&handle, 2).await;
    within(handle.stop()).await.unwrap();

    let seen = collected.read().await;
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|e| e.stream_id == "cart-1"));
    assert_eq!(seen[2].event_type, "CheckedOut");
    assert_eq!(
        fx.checkpoints.load(SUBSCRIPTION).await.unwrap().position,
        Some(Position(2))
    );
}

#[tokio::test]
async fn test_second_runner_is_locked_out() {
    let fx = fixture().await;

    let (first, _) = collecting_runner(&fx, StreamScope::All);
    let first = first.start();
    within(first.wait_for(|s| s.state == RunnerState::Running)).await;

    let (second, _) = collecting_runner(&fx, StreamScope::All);
    let err = within(second.start().wait()).await.unwrap_err();
    assert!(matches!(err, RunnerError::LockHeld(id) if id == SUBSCRIPTION));

    within(first.stop()).await.unwrap();

    // Released on stop, so a new runner may take over.
    let (third, _) = collecting_runner(&fx, StreamScope::All);
    let third = third.start();
    within(third.wait_for(|s| s.state == RunnerState::Running)).await;
    within(third.stop()).await.unwrap();
}

#[tokio::test]
async fn test_transactional_runner_counts_each_event_once() {
    let fx = fixture().await;
    sqlx::raw_sql(EVENT_TYPE_COUNTS_DDL)
        .execute(&fx.pool)
        .await
        .unwrap();
    append(&fx.events, "cart-1", "ItemAdded", 7).await;
    append(&fx.events, "cart-1", "CheckedOut", 1).await;

    let uow = Arc::new(UnitOfWork::new());
    let registry = HandlerRegistry::builder()
        .on_any(EventTypeCounts::new(uow.clone()))
        .build();
    let processor = Arc::new(BatchProcessor::new(Arc::new(registry)));
    let checkpointer = Arc::new(PooledTransactionalCheckpointer::new(
        fx.pool.clone(),
        TransactionalBatchCheckpointer::<SqliteBackend>::new(SUBSCRIPTION, processor, uow),
    ));
    let runner = SubscriptionRunner::new(
        fx.events.clone(),
        checkpointer,
        BatchProcessingOptions::new(3, StreamScope::All),
    );

    let handle = quick(runner).start();
    caught_up(&handle, 7).await;
    within(handle.stop()).await.unwrap();

    let rows = sqlx::query("SELECT event_type, seen, last_position FROM event_type_counts ORDER BY event_type")
        .fetch_all(&fx.pool)
        .await
        .unwrap();
    let counts: Vec<(String, i64, i64)> = rows
        .iter()
        .map(|r| (r.get("event_type"), r.get("seen"), r.get("last_position")))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("CheckedOut".to_string(), 1, 7),
            ("ItemAdded".to_string(), 7, 6),
        ]
    );
}
