//! In-memory StoreClient for testing and local runs.
//!
//! Behaves like a single-table DynamoDB deployment with the `si1` list
//! index: rows are keyed by `(pk, sk)`, queries return rows ordered by the
//! sort attribute, and batch calls enforce the store's per-call limits.
//!
//! Partial failures can be scripted: each queued count makes the next batch
//! call report that many trailing entries as unprocessed.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::batch::{MAX_BATCH_GET_KEYS, MAX_BATCH_WRITE_ITEMS};
use crate::storage::client::{
    key_of, BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, Item, Key,
    Query, QueryPage, SortCondition, StoreClient, TableBatch, WriteRequest, PK, SI1_HASH,
    SI1_INDEX, SI1_SORT, SK,
};
use crate::storage::{Result, StorageError};

type RowKey = (String, String);

fn string_attr<'a>(item: &'a Item, name: &str) -> Option<&'a str> {
    item.get(name).and_then(|v| v.as_s())
}

fn row_key(item: &Item) -> Result<RowKey> {
    match (string_attr(item, PK), string_attr(item, SK)) {
        (Some(pk), Some(sk)) => Ok((pk.to_string(), sk.to_string())),
        _ => Err(StorageError::Backend(
            "ValidationException: row is missing pk/sk".to_string(),
        )),
    }
}

/// Flatten a batch into `(table, entry)` pairs, in batch order.
fn flatten<T>(batch: TableBatch<T>) -> Vec<(String, T)> {
    batch
        .into_tables()
        .into_iter()
        .flat_map(|(table, entries)| entries.into_iter().map(move |e| (table.clone(), e)))
        .collect()
}

/// Split off the trailing `count` entries as unprocessed.
fn split_unprocessed<T>(entries: Vec<(String, T)>, count: usize) -> (Vec<(String, T)>, TableBatch<T>) {
    let mut processed = entries;
    let keep = processed.len() - count.min(processed.len());
    let tail = processed.split_off(keep);

    let mut unprocessed = TableBatch::new();
    for (table, entry) in tail {
        unprocessed.push(&table, entry);
    }
    (processed, unprocessed)
}

/// In-memory store client.
#[derive(Default)]
pub struct MockStoreClient {
    tables: RwLock<HashMap<String, BTreeMap<RowKey, Item>>>,
    unprocessed_writes: RwLock<VecDeque<usize>>,
    unprocessed_gets: RwLock<VecDeque<usize>>,
    fail_all: RwLock<bool>,
    write_calls: RwLock<Vec<BatchWriteRequest>>,
    get_calls: RwLock<Vec<BatchGetRequest>>,
}

impl MockStoreClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a backend error.
    pub async fn set_fail_all(&self, fail: bool) {
        *self.fail_all.write().await = fail;
    }

    /// Queue unprocessed counts for upcoming `batch_write` calls.
    pub async fn queue_unprocessed_writes(&self, counts: impl IntoIterator<Item = usize>) {
        self.unprocessed_writes.write().await.extend(counts);
    }

    /// Queue unprocessed counts for upcoming `batch_get` calls.
    pub async fn queue_unprocessed_gets(&self, counts: impl IntoIterator<Item = usize>) {
        self.unprocessed_gets.write().await.extend(counts);
    }

    /// Every `batch_write` request received, in order.
    pub async fn write_calls(&self) -> Vec<BatchWriteRequest> {
        self.write_calls.read().await.clone()
    }

    /// Every `batch_get` request received, in order.
    pub async fn get_calls(&self) -> Vec<BatchGetRequest> {
        self.get_calls.read().await.clone()
    }

    /// Insert a row directly, bypassing batch limits and failure scripts.
    pub async fn insert_row(&self, table: &str, item: Item) -> Result<()> {
        let key = row_key(&item)?;
        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    /// All rows in a table, ordered by `(pk, sk)`.
    pub async fn rows(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    async fn check_fail(&self) -> Result<()> {
        if *self.fail_all.read().await {
            return Err(StorageError::Backend("mock store failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreClient for MockStoreClient {
    async fn query(&self, query: Query) -> Result<QueryPage> {
        self.check_fail().await?;

        let sort_attribute = match query.index_name.as_deref() {
            None => SK,
            Some(SI1_INDEX) => SI1_SORT,
            Some(other) => {
                return Err(StorageError::Backend(format!(
                    "ValidationException: unknown index '{}'",
                    other
                )))
            }
        };

        let tables = self.tables.read().await;
        let Some(rows) = tables.get(&query.table_name) else {
            return Ok(QueryPage::default());
        };

        let mut matched: Vec<(String, &RowKey, &Item)> = rows
            .iter()
            .filter(|(_, item)| {
                string_attr(item, &query.partition_attribute) == Some(query.partition_value.as_str())
            })
            .filter_map(|(key, item)| {
                let sort_value = string_attr(item, sort_attribute)?;
                let keep = match &query.sort {
                    None => true,
                    Some(SortCondition::Equals { value, .. }) => sort_value == value,
                    Some(SortCondition::BeginsWith { value, .. }) => {
                        sort_value.starts_with(value.as_str())
                    }
                };
                keep.then(|| (sort_value.to_string(), key, item))
            })
            .collect();
        matched.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        if let Some(start) = &query.exclusive_start_key {
            let start_key = row_key(start)?;
            let start_sort = string_attr(start, sort_attribute)
                .unwrap_or(start_key.1.as_str())
                .to_string();
            matched.retain(|(sort, key, _)| (sort, *key) > (&start_sort, &start_key));
        }

        let limit = query.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let has_more = matched.len() > limit;
        matched.truncate(limit);

        let last_evaluated_key = if has_more {
            matched.last().map(|(_, _, item)| {
                let mut key = key_of(item);
                if query.index_name.is_some() {
                    for attribute in [SI1_HASH, SI1_SORT] {
                        if let Some(value) = item.get(attribute) {
                            key.insert(attribute.to_string(), value.clone());
                        }
                    }
                }
                key
            })
        } else {
            None
        };

        Ok(QueryPage {
            items: matched.into_iter().map(|(_, _, item)| item.clone()).collect(),
            last_evaluated_key,
        })
    }

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        self.check_fail().await?;
        if request.len() > MAX_BATCH_WRITE_ITEMS {
            return Err(StorageError::Backend(format!(
                "ValidationException: {} items exceeds batch write limit of {}",
                request.len(),
                MAX_BATCH_WRITE_ITEMS
            )));
        }
        self.write_calls.write().await.push(request.clone());

        let count = self.unprocessed_writes.write().await.pop_front().unwrap_or(0);
        let (processed, unprocessed) = split_unprocessed(flatten(request), count);

        let mut tables = self.tables.write().await;
        for (table, write) in processed {
            let rows = tables.entry(table).or_default();
            match write {
                WriteRequest::Put(item) => {
                    rows.insert(row_key(&item)?, item);
                }
                WriteRequest::Delete(key) => {
                    rows.remove(&row_key(&key)?);
                }
            }
        }

        Ok(BatchWriteOutput { unprocessed })
    }

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        self.check_fail().await?;
        if request.len() > MAX_BATCH_GET_KEYS {
            return Err(StorageError::Backend(format!(
                "ValidationException: {} keys exceeds batch get limit of {}",
                request.len(),
                MAX_BATCH_GET_KEYS
            )));
        }
        self.get_calls.write().await.push(request.clone());

        let count = self.unprocessed_gets.write().await.pop_front().unwrap_or(0);
        let (processed, unprocessed) = split_unprocessed(flatten(request), count);

        let tables = self.tables.read().await;
        let mut responses: BTreeMap<String, Vec<Item>> = BTreeMap::new();
        for (table, key) in processed {
            let found = tables
                .get(&table)
                .and_then(|rows| rows.get(&row_key(&key).ok()?))
                .cloned();
            if let Some(item) = found {
                responses.entry(table).or_default().push(item);
            }
        }

        Ok(BatchGetOutput {
            responses,
            unprocessed,
        })
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        self.check_fail().await?;
        self.insert_row(table_name, item).await
    }

    async fn delete_item(&self, table_name: &str, key: Key) -> Result<()> {
        self.check_fail().await?;
        let key = row_key(&key)?;
        if let Some(rows) = self.tables.write().await.get_mut(table_name) {
            rows.remove(&key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
