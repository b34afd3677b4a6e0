use super::*;
use crate::storage::client::{primary_key, WriteRequest};
use crate::storage::mock::MockStoreClient;

fn item(n: usize) -> WriteRequest {
    WriteRequest::Put(primary_key(format!("D:{}", n), format!("D:{}", n)))
}

fn write_batch(table: &str, count: usize) -> BatchWriteRequest {
    let mut batch = TableBatch::new();
    batch.extend(table, (0..count).map(item));
    batch
}

fn executor(store: &Arc<MockStoreClient>, limits: BatchLimits) -> BatchExecutor {
    BatchExecutor::with_limits(store.clone(), limits)
}

#[test]
fn test_split_spans_tables_in_order() {
    let mut batch = TableBatch::new();
    batch.extend("table1", ["item1", "item2"]);
    batch.extend("table2", ["item3", "item4", "item5"]);

    let chunks = split_into_chunks(batch, 3);

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].get("table1"), Some(&vec!["item1", "item2"]));
    assert_eq!(chunks[0].get("table2"), Some(&vec!["item3"]));
    assert_eq!(chunks[1].get("table1"), None);
    assert_eq!(chunks[1].get("table2"), Some(&vec!["item4", "item5"]));
}

#[test]
fn test_split_chunks_never_exceed_limit_and_cover_every_entry() {
    for limit in 1..=7 {
        for sizes in [[0usize, 0, 0], [1, 0, 9], [5, 5, 5], [13, 2, 0]] {
            let mut batch = TableBatch::new();
            let mut expected = Vec::new();
            for (t, size) in sizes.iter().enumerate() {
                let table = format!("t{}", t);
                for i in 0..*size {
                    batch.push(&table, (t, i));
                    expected.push((table.clone(), (t, i)));
                }
            }

            let chunks = split_into_chunks(batch, limit);

            assert!(chunks.iter().all(|c| c.len() <= limit && !c.is_empty()));
            let seen: Vec<_> = chunks
                .into_iter()
                .flat_map(|c| c.into_tables())
                .flat_map(|(table, entries)| entries.into_iter().map(move |e| (table.clone(), e)))
                .collect();
            assert_eq!(seen, expected, "limit {} sizes {:?}", limit, sizes);
        }
    }
}

#[test]
fn test_split_under_limit_is_single_chunk() {
    let chunks = split_into_chunks(write_batch("fleet", 25), 25);
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), 25);
}

#[test]
fn test_join_preserves_multiplicity() {
    let mut a = TableBatch::new();
    a.extend("table1", [1, 2]);
    let mut b = TableBatch::new();
    b.extend("table1", [2]);
    b.extend("table2", [3]);

    let joined = join_chunks([a, b, TableBatch::new()]);

    assert_eq!(joined.get("table1"), Some(&vec![1, 2, 2]));
    assert_eq!(joined.get("table2"), Some(&vec![3]));
    assert_eq!(joined.len(), 4);
}

#[tokio::test]
async fn test_write_25_items_is_one_call() {
    let store = Arc::new(MockStoreClient::new());
    let executor = executor(&store, BatchLimits::default());

    let unprocessed = executor
        .batch_write_all(write_batch("fleet", 25))
        .await
        .unwrap();

    assert!(unprocessed.is_empty());
    assert_eq!(store.write_calls().await.len(), 1);
}

#[tokio::test]
async fn test_write_26_items_is_two_calls() {
    let store = Arc::new(MockStoreClient::new());
    let executor = executor(&store, BatchLimits::default());

    let unprocessed = executor
        .batch_write_all(write_batch("fleet", 26))
        .await
        .unwrap();

    assert!(unprocessed.is_empty());
    let calls = store.write_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 25);
    assert_eq!(calls[1].len(), 1);
    assert_eq!(store.rows("fleet").await.len(), 26);
}

#[tokio::test]
async fn test_empty_write_issues_no_calls() {
    let store = Arc::new(MockStoreClient::new());
    let executor = executor(&store, BatchLimits::default());

    let unprocessed = executor.batch_write_all(TableBatch::new()).await.unwrap();

    assert!(unprocessed.is_empty());
    assert!(store.write_calls().await.is_empty());
}

#[tokio::test]
async fn test_write_retries_only_unprocessed_subset() {
    let store = Arc::new(MockStoreClient::new());
    store.queue_unprocessed_writes([2]).await;
    let executor = executor(&store, BatchLimits::default());

    let unprocessed = executor
        .batch_write_all(write_batch("fleet", 10))
        .await
        .unwrap();

    assert!(unprocessed.is_empty());
    let calls = store.write_calls().await;
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].len(), 2);
    assert_eq!(calls[1].get("fleet"), Some(&vec![item(8), item(9)]));
    assert_eq!(store.rows("fleet").await.len(), 10);
}

#[tokio::test]
async fn test_write_makes_exactly_three_attempts() {
    let store = Arc::new(MockStoreClient::new());
    store.queue_unprocessed_writes([usize::MAX; 10]).await;
    let executor = executor(&store, BatchLimits::default());

    let unprocessed = executor
        .batch_write_all(write_batch("fleet", 4))
        .await
        .unwrap();

    assert_eq!(unprocessed.len(), 4);
    assert_eq!(store.write_calls().await.len(), 3);
    assert!(store.rows("fleet").await.is_empty());
}

#[tokio::test]
async fn test_write_rejoins_unprocessed_across_chunks() {
    let store = Arc::new(MockStoreClient::new());
    // Three chunks per pass; every chunk loses its last item, every pass.
    store.queue_unprocessed_writes([1; 9]).await;
    let limits = BatchLimits {
        max_write_items: 3,
        ..BatchLimits::default()
    };
    let executor = executor(&store, limits);

    let unprocessed = executor
        .batch_write_all(write_batch("fleet", 9))
        .await
        .unwrap();

    // Pass 1: 3 chunks of 3, each drops 1 -> 3 left.
    // Pass 2: 1 chunk of 3, drops 1 -> 1 left.
    // Pass 3: 1 chunk of 1, drops it -> 1 left.
    assert_eq!(store.write_calls().await.len(), 5);
    assert_eq!(unprocessed.len(), 1);
    assert_eq!(store.rows("fleet").await.len(), 8);
}

#[tokio::test]
async fn test_write_backend_error_propagates() {
    let store = Arc::new(MockStoreClient::new());
    store.set_fail_all(true).await;
    let executor = executor(&store, BatchLimits::default());

    let result = executor.batch_write_all(write_batch("fleet", 1)).await;

    assert!(matches!(result, Err(crate::storage::StorageError::Backend(_))));
}

#[tokio::test]
async fn test_get_merges_chunks_and_retries() {
    let store = Arc::new(MockStoreClient::new());
    executor(&store, BatchLimits::default())
        .batch_write_all(write_batch("fleet", 5))
        .await
        .unwrap();

    store.queue_unprocessed_gets([1]).await;
    let limits = BatchLimits {
        max_get_keys: 2,
        ..BatchLimits::default()
    };
    let executor = executor(&store, limits);

    let mut request = TableBatch::new();
    request.extend(
        "fleet",
        (0..5).map(|n| primary_key(format!("D:{}", n), format!("D:{}", n))),
    );
    let result = executor.batch_get_all(request).await.unwrap();

    assert!(result.is_complete());
    assert_eq!(result.rows("fleet").len(), 5);
    // 3 chunks on the first pass, then one retry for the dropped key.
    let calls = store.get_calls().await;
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[3].len(), 1);
}

#[tokio::test]
async fn test_get_surfaces_unprocessed_after_three_attempts() {
    let store = Arc::new(MockStoreClient::new());
    store.queue_unprocessed_gets([usize::MAX; 3]).await;
    let executor = executor(&store, BatchLimits::default());

    let mut request = TableBatch::new();
    request.push("fleet", primary_key("D:0", "D:0"));
    let result = executor.batch_get_all(request).await.unwrap();

    assert!(!result.is_complete());
    assert_eq!(result.unprocessed.len(), 1);
    assert_eq!(store.get_calls().await.len(), 3);
}
