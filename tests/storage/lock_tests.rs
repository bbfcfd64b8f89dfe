//! SubscriptionLock interface tests.
//!
//! These tests verify the contract of the SubscriptionLock trait.
//! Each lock implementation should run these tests.

use waymark::storage::{lock_id_for, SubscriptionLock};

pub async fn test_acquire_and_release<L: SubscriptionLock>(lock: &L) {
    let guard = lock
        .try_acquire("test_lock_basic")
        .await
        .expect("try_acquire should succeed")
        .expect("free lock should be granted");
    assert_eq!(guard.subscription_id, "test_lock_basic");
    assert_eq!(guard.lock_id, lock_id_for("test_lock_basic"));

    lock.release(guard).await.expect("release should succeed");
}

pub async fn test_second_acquire_is_refused<L: SubscriptionLock>(lock: &L) {
    let guard = lock.try_acquire("test_lock_held").await.unwrap().unwrap();

    let second = lock.try_acquire("test_lock_held").await.unwrap();
    assert!(second.is_none(), "held lock must not be granted twice");

    lock.release(guard).await.unwrap();
}

pub async fn test_reacquire_after_release<L: SubscriptionLock>(lock: &L) {
    let guard = lock.try_acquire("test_lock_again").await.unwrap().unwrap();
    lock.release(guard).await.unwrap();

    let again = lock.try_acquire("test_lock_again").await.unwrap();
    assert!(again.is_some(), "released lock should be available");
    lock.release(again.unwrap()).await.unwrap();
}

pub async fn test_locks_are_per_subscription<L: SubscriptionLock>(lock: &L) {
    let a = lock.try_acquire("test_lock_a").await.unwrap().unwrap();
    let b = lock.try_acquire("test_lock_b").await.unwrap();
    assert!(b.is_some(), "different subscriptions must not contend");

    lock.release(a).await.unwrap();
    lock.release(b.unwrap()).await.unwrap();
}

/// Run all SubscriptionLock interface tests against a lock implementation.
#[macro_export]
macro_rules! run_lock_tests {
    ($lock:expr) => {
        use $crate::storage::lock_tests::*;

        test_acquire_and_release($lock).await;
        println!("  test_acquire_and_release: PASSED");

        test_second_acquire_is_refused($lock).await;
        println!("  test_second_acquire_is_refused: PASSED");

        test_reacquire_after_release($lock).await;
        println!("  test_reacquire_after_release: PASSED");

        test_locks_are_per_subscription($lock).await;
        println!("  test_locks_are_per_subscription: PASSED");
    };
}
