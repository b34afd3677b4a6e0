use super::*;
use crate::storage::client::{primary_key, AttrValue};

const TABLE: &str = "fleet";

fn row(pk: &str, sk: &str) -> Item {
    primary_key(pk, sk)
}

fn indexed_row(pk: &str, hash: &str, sort: &str) -> Item {
    let mut item = primary_key(pk, pk);
    item.insert(SI1_HASH.to_string(), AttrValue::S(hash.to_string()));
    item.insert(SI1_SORT.to_string(), AttrValue::S(sort.to_string()));
    item
}

fn writes(items: Vec<Item>) -> BatchWriteRequest {
    let mut batch = TableBatch::new();
    batch.extend(TABLE, items.into_iter().map(WriteRequest::Put));
    batch
}

#[tokio::test]
async fn test_query_returns_partition_rows_in_sort_order() {
    let store = MockStoreClient::new();
    store.insert_row(TABLE, row("DT:1", "G:b")).await.unwrap();
    store.insert_row(TABLE, row("DT:1", "DT:1")).await.unwrap();
    store.insert_row(TABLE, row("DT:1", "G:a")).await.unwrap();
    store.insert_row(TABLE, row("DT:2", "DT:2")).await.unwrap();

    let page = store.query(Query::partition(TABLE, "DT:1")).await.unwrap();

    let sks: Vec<_> = page
        .items
        .iter()
        .map(|i| i.get(SK).and_then(|v| v.as_s()).unwrap().to_string())
        .collect();
    assert_eq!(sks, vec!["DT:1", "G:a", "G:b"]);
    assert!(page.last_evaluated_key.is_none());
}

#[tokio::test]
async fn test_query_sort_conditions() {
    let store = MockStoreClient::new();
    store.insert_row(TABLE, row("DT:1", "DT:1")).await.unwrap();
    store.insert_row(TABLE, row("DT:1", "G:a")).await.unwrap();
    store.insert_row(TABLE, row("DT:1", "G:a:D:t1")).await.unwrap();

    let exact = store
        .query(Query::partition(TABLE, "DT:1").sort_equals("G:a"))
        .await
        .unwrap();
    assert_eq!(exact.items.len(), 1);

    let prefix = store
        .query(Query::partition(TABLE, "DT:1").sort_begins_with("G:a"))
        .await
        .unwrap();
    assert_eq!(prefix.items.len(), 2);
}

#[tokio::test]
async fn test_index_query_pages_with_limit() {
    let store = MockStoreClient::new();
    for name in ["a", "b", "c"] {
        let pk = format!("DT:{}", name);
        store
            .insert_row(TABLE, indexed_row(&pk, "type:DT", &pk))
            .await
            .unwrap();
    }
    // Not projected into the index.
    store.insert_row(TABLE, row("DT:z", "G:x")).await.unwrap();

    let first = store
        .query(Query::index_partition(TABLE, "type:DT").limit(Some(2)))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    let cursor = first.last_evaluated_key.clone();
    assert!(cursor.is_some());

    let second = store
        .query(
            Query::index_partition(TABLE, "type:DT")
                .limit(Some(2))
                .start_from(cursor),
        )
        .await
        .unwrap();
    assert_eq!(second.items.len(), 1);
    assert!(second.last_evaluated_key.is_none());
    assert_eq!(second.items[0].get(PK).and_then(|v| v.as_s()), Some("DT:c"));
}

#[tokio::test]
async fn test_batch_write_rejects_oversized_batch() {
    let store = MockStoreClient::new();
    let items = (0..26).map(|i| row("D:x", &format!("S:{}", i))).collect();

    let result = store.batch_write(writes(items)).await;

    assert!(matches!(result, Err(StorageError::Backend(_))));
}

#[tokio::test]
async fn test_batch_write_reports_scripted_unprocessed_tail() {
    let store = MockStoreClient::new();
    store.queue_unprocessed_writes([2]).await;
    let items = (0..5).map(|i| row("D:x", &format!("S:{}", i))).collect();

    let output = store.batch_write(writes(items)).await.unwrap();

    assert_eq!(output.unprocessed.len(), 2);
    assert_eq!(store.rows(TABLE).await.len(), 3);
    assert_eq!(store.write_calls().await.len(), 1);
}

#[tokio::test]
async fn test_batch_write_delete() {
    let store = MockStoreClient::new();
    store.insert_row(TABLE, row("D:x", "D:x")).await.unwrap();

    let mut batch = TableBatch::new();
    batch.push(TABLE, WriteRequest::Delete(row("D:x", "D:x")));
    store.batch_write(batch).await.unwrap();

    assert!(store.rows(TABLE).await.is_empty());
}

#[tokio::test]
async fn test_delete_item_existing_and_missing() {
    let store = MockStoreClient::new();
    store.insert_row(TABLE, row("D:x", "D:x")).await.unwrap();
    store.insert_row(TABLE, row("D:x", "DT:1")).await.unwrap();

    store.delete_item(TABLE, row("D:x", "D:x")).await.unwrap();
    store.delete_item(TABLE, row("D:missing", "D:missing")).await.unwrap();
    store.delete_item("other-table", row("D:x", "DT:1")).await.unwrap();

    let rows = store.rows(TABLE).await;
    assert_eq!(rows, vec![row("D:x", "DT:1")]);
}

#[tokio::test]
async fn test_batch_get_returns_found_rows_only() {
    let store = MockStoreClient::new();
    store.insert_row(TABLE, row("D:a", "D:a")).await.unwrap();

    let mut batch = TableBatch::new();
    batch.push(TABLE, row("D:a", "D:a"));
    batch.push(TABLE, row("D:missing", "D:missing"));
    let output = store.batch_get(batch).await.unwrap();

    assert_eq!(output.responses.get(TABLE).map(Vec::len), Some(1));
    assert!(output.unprocessed.is_empty());
}

#[tokio::test]
async fn test_fail_all() {
    let store = MockStoreClient::new();
    store.set_fail_all(true).await;

    let result = store.query(Query::partition(TABLE, "D:a")).await;

    assert!(matches!(result, Err(StorageError::Backend(_))));
}
