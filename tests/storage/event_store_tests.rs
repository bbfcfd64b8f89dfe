//! EventStore interface tests.
//!
//! These tests verify the contract of the EventStore trait.
//! Each storage implementation should run these tests.

use uuid::Uuid;

use waymark::model::{NewEvent, Position, StreamScope};
use waymark::storage::{EventStore, ExpectedRevision, StorageError};

/// Stream id unique to one test run.
pub fn unique_stream(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Create multiple events of one type with an index payload.
pub fn make_events(event_type: &str, count: usize) -> Vec<NewEvent> {
    (0..count)
        .map(|i| NewEvent::new(event_type, format!("{{\"i\":{i}}}").into_bytes()))
        .collect()
}

/// Newest global position, if any.
async fn tail<S: EventStore>(store: &S) -> Option<Position> {
    store
        .read_backward(&StreamScope::All, None, 1)
        .await
        .expect("read_backward should succeed")
        .first()
        .map(|e| e.position)
}

// =============================================================================
// EventStore::append tests
// =============================================================================

pub async fn test_append_assigns_revisions<S: EventStore>(store: &S) {
    let stream = unique_stream("test_append");

    let first = store
        .append(&stream, ExpectedRevision::NoStream, make_events("Opened", 3))
        .await
        .expect("append should succeed");
    assert_eq!(first.next_expected_revision, 2);

    let second = store
        .append(&stream, ExpectedRevision::Exact(2), make_events("Updated", 2))
        .await
        .expect("append should succeed");
    assert_eq!(second.next_expected_revision, 4);
    assert!(second.position > first.position);
}

pub async fn test_append_wrong_expected_revision<S: EventStore>(store: &S) {
    let stream = unique_stream("test_append_conflict");

    store
        .append(&stream, ExpectedRevision::NoStream, make_events("Opened", 1))
        .await
        .unwrap();

    let err = store
        .append(&stream, ExpectedRevision::NoStream, make_events("Opened", 1))
        .await
        .expect_err("second NoStream append should fail");
    assert!(
        matches!(err, StorageError::WrongExpectedRevision { actual: Some(0), .. }),
        "unexpected error: {err:?}"
    );

    let err = store
        .append(&stream, ExpectedRevision::Exact(5), make_events("Updated", 1))
        .await
        .expect_err("stale revision should fail");
    assert!(matches!(err, StorageError::WrongExpectedRevision { .. }));
}

// =============================================================================
// EventStore::read_forward tests
// =============================================================================

pub async fn test_read_forward_stream_scope<S: EventStore>(store: &S) {
    let stream = unique_stream("test_forward_stream");
    let other = unique_stream("test_forward_other");

    store
        .append(&stream, ExpectedRevision::NoStream, make_events("A", 3))
        .await
        .unwrap();
    store
        .append(&other, ExpectedRevision::NoStream, make_events("B", 2))
        .await
        .unwrap();
    store
        .append(&stream, ExpectedRevision::Exact(2), make_events("C", 1))
        .await
        .unwrap();

    let scope = StreamScope::stream(stream.clone());
    let events = store.read_forward(&scope, None, 100).await.unwrap();
    let positions: Vec<u64> = events.iter().map(|e| e.position.0).collect();
    assert_eq!(positions, vec![0, 1, 2, 3], "stream scope positions are revisions");
    assert!(events.iter().all(|e| e.stream_id == stream));
    assert_eq!(events[3].event_type, "C");

    let after = store
        .read_forward(&scope, Some(Position(1)), 100)
        .await
        .unwrap();
    assert_eq!(after.len(), 2);
    assert_eq!(after[0].position, Position(2));
}

pub async fn test_read_forward_all_scope<S: EventStore>(store: &S) {
    let before = tail(store).await;
    let stream = unique_stream("test_forward_all");

    store
        .append(&stream, ExpectedRevision::Any, make_events("A", 4))
        .await
        .unwrap();

    let events = store
        .read_forward(&StreamScope::All, before, 100)
        .await
        .unwrap();
    assert_eq!(events.len(), 4);
    for pair in events.windows(2) {
        assert!(pair[1].position > pair[0].position, "positions must ascend");
    }
    assert_eq!(events[0].revision, 0);
    assert_eq!(events[3].revision, 3);
}

pub async fn test_read_forward_respects_max_count<S: EventStore>(store: &S) {
    let stream = unique_stream("test_forward_max");
    store
        .append(&stream, ExpectedRevision::NoStream, make_events("A", 5))
        .await
        .unwrap();

    let scope = StreamScope::stream(stream);
    let events = store.read_forward(&scope, None, 2).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].position, Position(1));
}

pub async fn test_read_forward_past_tail_is_empty<S: EventStore>(store: &S) {
    let stream = unique_stream("test_forward_tail");
    store
        .append(&stream, ExpectedRevision::NoStream, make_events("A", 2))
        .await
        .unwrap();

    let events = store
        .read_forward(&StreamScope::stream(stream), Some(Position(1)), 10)
        .await
        .unwrap();
    assert!(events.is_empty());
}

pub async fn test_read_preserves_payload<S: EventStore>(store: &S) {
    let stream = unique_stream("test_payload");
    store
        .append(
            &stream,
            ExpectedRevision::NoStream,
            vec![NewEvent::new("Shipped", b"{\"box\":7}".to_vec()).with_metadata(b"trace".to_vec())],
        )
        .await
        .unwrap();

    let events = store
        .read_forward(&StreamScope::stream(stream), None, 1)
        .await
        .unwrap();
    assert_eq!(events[0].data, b"{\"box\":7}".to_vec());
    assert_eq!(events[0].metadata, b"trace".to_vec());
}

// =============================================================================
// EventStore::read_backward tests
// =============================================================================

pub async fn test_read_backward_from_tail<S: EventStore>(store: &S) {
    let stream = unique_stream("test_backward");
    store
        .append(&stream, ExpectedRevision::NoStream, make_events("A", 4))
        .await
        .unwrap();

    let scope = StreamScope::stream(stream);
    let newest = store.read_backward(&scope, None, 1).await.unwrap();
    assert_eq!(newest[0].position, Position(3));

    let older = store
        .read_backward(&scope, Some(Position(2)), 10)
        .await
        .unwrap();
    let positions: Vec<u64> = older.iter().map(|e| e.position.0).collect();
    assert_eq!(positions, vec![2, 1, 0]);
}

pub async fn test_read_backward_empty_stream<S: EventStore>(store: &S) {
    let scope = StreamScope::stream(unique_stream("test_backward_empty"));
    assert!(store.read_backward(&scope, None, 1).await.unwrap().is_empty());
}

// =============================================================================
// Stream metadata tests
// =============================================================================

pub async fn test_metadata_roundtrip<S: EventStore>(store: &S) {
    let stream = unique_stream("test_metadata");
    assert!(store.get_stream_metadata(&stream).await.unwrap().is_none());

    let first = store
        .set_stream_metadata(&stream, ExpectedRevision::NoStream, serde_json::json!({"v": 1}))
        .await
        .unwrap();
    let second = store
        .set_stream_metadata(&stream, ExpectedRevision::Exact(first), serde_json::json!({"v": 2}))
        .await
        .unwrap();
    assert!(second > first);

    let metadata = store.get_stream_metadata(&stream).await.unwrap().unwrap();
    assert_eq!(metadata.revision, second);
    assert_eq!(metadata.data, serde_json::json!({"v": 2}));
}

pub async fn test_metadata_stale_revision<S: EventStore>(store: &S) {
    let stream = unique_stream("test_metadata_stale");
    let revision = store
        .set_stream_metadata(&stream, ExpectedRevision::NoStream, serde_json::json!({}))
        .await
        .unwrap();
    store
        .set_stream_metadata(&stream, ExpectedRevision::Exact(revision), serde_json::json!({}))
        .await
        .unwrap();

    let err = store
        .set_stream_metadata(&stream, ExpectedRevision::Exact(revision), serde_json::json!({}))
        .await
        .expect_err("stale metadata revision should fail");
    assert!(matches!(err, StorageError::WrongExpectedRevision { .. }));
}

pub async fn test_metadata_delete<S: EventStore>(store: &S) {
    let stream = unique_stream("test_metadata_delete");
    store
        .set_stream_metadata(&stream, ExpectedRevision::Any, serde_json::json!({"x": true}))
        .await
        .unwrap();

    store.delete_stream_metadata(&stream).await.unwrap();
    assert!(store.get_stream_metadata(&stream).await.unwrap().is_none());

    // Deleting again is fine.
    store.delete_stream_metadata(&stream).await.unwrap();
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all EventStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_event_store_tests {
    ($store:expr) => {
        use $crate::storage::event_store_tests::*;

        // append tests
        test_append_assigns_revisions($store).await;
        println!("  test_append_assigns_revisions: PASSED");

        test_append_wrong_expected_revision($store).await;
        println!("  test_append_wrong_expected_revision: PASSED");

        // read_forward tests
        test_read_forward_stream_scope($store).await;
        println!("  test_read_forward_stream_scope: PASSED");

        test_read_forward_all_scope($store).await;
        println!("  test_read_forward_all_scope: PASSED");

        test_read_forward_respects_max_count($store).await;
        println!("  test_read_forward_respects_max_count: PASSED");

        test_read_forward_past_tail_is_empty($store).await;
        println!("  test_read_forward_past_tail_is_empty: PASSED");

        test_read_preserves_payload($store).await;
        println!("  test_read_preserves_payload: PASSED");

        // read_backward tests
        test_read_backward_from_tail($store).await;
        println!("  test_read_backward_from_tail: PASSED");

        test_read_backward_empty_stream($store).await;
        println!("  test_read_backward_empty_stream: PASSED");

        // metadata tests
        test_metadata_roundtrip($store).await;
        println!("  test_metadata_roundtrip: PASSED");

        test_metadata_stale_revision($store).await;
        println!("  test_metadata_stale_revision: PASSED");

        test_metadata_delete($store).await;
        println!("  test_metadata_delete: PASSED");
    };
}
