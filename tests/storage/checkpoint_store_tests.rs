//! CheckpointStore interface tests.
//!
//! These tests verify the contract of the CheckpointStore trait.
//! Each storage implementation should run these tests.

use waymark::model::Position;
use waymark::outcome::{FailureReason, StoreResult};
use waymark::storage::CheckpointStore;

fn assert_conflict(result: &StoreResult, expected: Option<Position>, actual: Option<Position>) {
    assert_eq!(
        result.failure(),
        Some(&FailureReason::Conflict { expected, actual }),
        "expected conflict, got {result:?}"
    );
}

// =============================================================================
// CheckpointStore::load tests
// =============================================================================

pub async fn test_load_missing_is_initial<S: CheckpointStore>(store: &S) {
    let checkpoint = store
        .load("test_cp_missing")
        .await
        .expect("load should succeed");
    assert!(checkpoint.is_initial(), "missing checkpoint should be initial");
    assert_eq!(checkpoint.subscription_id, "test_cp_missing");
}

// =============================================================================
// CheckpointStore::store tests
// =============================================================================

pub async fn test_first_store_and_load<S: CheckpointStore>(store: &S) {
    let id = "test_cp_first";

    let result = store.store(id, Position(3), None).await;
    assert!(result.is_success(), "first store failed: {result:?}");

    let checkpoint = store.load(id).await.unwrap();
    assert_eq!(checkpoint.position, Some(Position(3)));
}

pub async fn test_store_zero_position<S: CheckpointStore>(store: &S) {
    let id = "test_cp_zero";

    assert!(store.store(id, Position(0), None).await.is_success());
    assert_eq!(store.load(id).await.unwrap().position, Some(Position(0)));
    assert!(store
        .store(id, Position(1), Some(Position(0)))
        .await
        .is_success());
}

pub async fn test_store_advances_monotonically<S: CheckpointStore>(store: &S) {
    let id = "test_cp_monotonic";
    let mut previous = None;

    for position in [4u64, 9, 10, 31] {
        let result = store.store(id, Position(position), previous).await;
        assert!(result.is_success(), "store {position} failed: {result:?}");

        let loaded = store.load(id).await.unwrap().position;
        assert_eq!(loaded, Some(Position(position)));
        if let Some(before) = previous {
            assert!(loaded > Some(before));
        }
        previous = loaded;
    }
}

pub async fn test_backward_store_rejected<S: CheckpointStore>(store: &S) {
    let id = "test_cp_backward";

    assert!(store.store(id, Position(5), None).await.is_success());

    let result = store.store(id, Position(3), Some(Position(5))).await;
    assert!(
        matches!(result.failure(), Some(FailureReason::ContractViolation(_))),
        "moving back must be rejected: {result:?}"
    );
    assert_eq!(store.load(id).await.unwrap().position, Some(Position(5)));
}

pub async fn test_stale_expected_conflicts<S: CheckpointStore>(store: &S) {
    let id = "test_cp_stale";

    assert!(store.store(id, Position(3), None).await.is_success());
    assert!(store
        .store(id, Position(7), Some(Position(3)))
        .await
        .is_success());

    let result = store.store(id, Position(8), Some(Position(3))).await;
    assert_conflict(&result, Some(Position(3)), Some(Position(7)));
    assert_eq!(store.load(id).await.unwrap().position, Some(Position(7)));
}

pub async fn test_initial_expected_conflicts_when_present<S: CheckpointStore>(store: &S) {
    let id = "test_cp_present";

    assert!(store.store(id, Position(5), None).await.is_success());

    let result = store.store(id, Position(6), None).await;
    assert_conflict(&result, None, Some(Position(5)));
}

pub async fn test_expected_position_on_missing_conflicts<S: CheckpointStore>(store: &S) {
    let id = "test_cp_absent";

    let result = store.store(id, Position(2), Some(Position(1))).await;
    assert_conflict(&result, Some(Position(1)), None);
    assert!(store.load(id).await.unwrap().is_initial());
}

pub async fn test_concurrent_store_single_winner<S: CheckpointStore>(store: &S) {
    let id = "test_cp_race";
    assert!(store.store(id, Position(2), None).await.is_success());

    let (a, b) = futures::join!(
        store.store(id, Position(5), Some(Position(2))),
        store.store(id, Position(6), Some(Position(2))),
    );

    let winners = [&a, &b].iter().filter(|r| r.is_success()).count();
    assert_eq!(winners, 1, "exactly one writer must win: {a:?} / {b:?}");
    let loser = if a.is_success() { &b } else { &a };
    assert!(
        loser.failure().is_some_and(FailureReason::is_conflict),
        "loser must see a conflict: {loser:?}"
    );

    let stored = store.load(id).await.unwrap().position;
    assert!(stored == Some(Position(5)) || stored == Some(Position(6)));
}

// =============================================================================
// CheckpointStore::reset tests
// =============================================================================

pub async fn test_reset_forgets_checkpoint<S: CheckpointStore>(store: &S) {
    let id = "test_cp_reset";

    assert!(store.store(id, Position(12), None).await.is_success());
    store.reset(id).await.expect("reset should succeed");

    assert!(store.load(id).await.unwrap().is_initial());
    assert!(
        store.store(id, Position(0), None).await.is_success(),
        "after reset the subscription starts over"
    );
}

pub async fn test_reset_missing_is_ok<S: CheckpointStore>(store: &S) {
    store
        .reset("test_cp_never_stored")
        .await
        .expect("reset of a missing checkpoint should succeed");
}

// =============================================================================
// Isolation tests
// =============================================================================

pub async fn test_subscription_isolation<S: CheckpointStore>(store: &S) {
    assert!(store
        .store("test_cp_iso_a", Position(10), None)
        .await
        .is_success());
    assert!(store
        .store("test_cp_iso_b", Position(20), None)
        .await
        .is_success());

    assert_eq!(
        store.load("test_cp_iso_a").await.unwrap().position,
        Some(Position(10))
    );
    assert_eq!(
        store.load("test_cp_iso_b").await.unwrap().position,
        Some(Position(20))
    );

    store.reset("test_cp_iso_a").await.unwrap();
    assert_eq!(
        store.load("test_cp_iso_b").await.unwrap().position,
        Some(Position(20))
    );
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all CheckpointStore interface tests against a store implementation.
///
/// Subscription ids are fixed, so each store instance must start empty.
#[macro_export]
macro_rules! run_checkpoint_store_tests {
    ($store:expr) => {
        use $crate::storage::checkpoint_store_tests::*;

        // load tests
        test_load_missing_is_initial($store).await;
        println!("  test_load_missing_is_initial: PASSED");

        // store tests
        test_first_store_and_load($store).await;
        println!("  test_first_store_and_load: PASSED");

        test_store_zero_position($store).await;
        println!("  test_store_zero_position: PASSED");

        test_store_advances_monotonically($store).await;
        println!("  test_store_advances_monotonically: PASSED");

        test_backward_store_rejected($store).await;
        println!("  test_backward_store_rejected: PASSED");

        test_stale_expected_conflicts($store).await;
        println!("  test_stale_expected_conflicts: PASSED");

        test_initial_expected_conflicts_when_present($store).await;
        println!("  test_initial_expected_conflicts_when_present: PASSED");

        test_expected_position_on_missing_conflicts($store).await;
        println!("  test_expected_position_on_missing_conflicts: PASSED");

        test_concurrent_store_single_winner($store).await;
        println!("  test_concurrent_store_single_winner: PASSED");

        // reset tests
        test_reset_forgets_checkpoint($store).await;
        println!("  test_reset_forgets_checkpoint: PASSED");

        test_reset_missing_is_ok($store).await;
        println!("  test_reset_missing_is_ok: PASSED");

        // isolation tests
        test_subscription_isolation($store).await;
        println!("  test_subscription_isolation: PASSED");
    };
}
