//! StoreClient trait and the row types shared by every backend.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Result;

/// Table partition key attribute.
pub const PK: &str = "pk";
/// Table sort key attribute.
pub const SK: &str = "sk";
/// Secondary index partition attribute.
pub const SI1_HASH: &str = "si1Hash";
/// Secondary index sort attribute.
pub const SI1_SORT: &str = "si1Sort";
/// Secondary index used by list operations.
pub const SI1_INDEX: &str = "si1Hash-si1Sort-index";

/// A single attribute value.
///
/// Serializes in the same externally-tagged shape DynamoDB uses on the wire
/// (`{"S": "..."}`), which keeps continuation tokens readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    S(String),
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null,
    L(Vec<AttrValue>),
    M(HashMap<String, AttrValue>),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
}

impl AttrValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttrValue::N(n) => Some(n),
            _ => None,
        }
    }
}

/// A row: attribute name to value.
pub type Item = HashMap<String, AttrValue>;

/// A primary key (`pk` + `sk`) in row form.
pub type Key = Item;

/// Build the primary key for a row.
pub fn primary_key(pk: impl Into<String>, sk: impl Into<String>) -> Key {
    let mut key = Key::with_capacity(2);
    key.insert(PK.to_string(), AttrValue::S(pk.into()));
    key.insert(SK.to_string(), AttrValue::S(sk.into()));
    key
}

/// Extract the primary key from a full row.
pub fn key_of(item: &Item) -> Key {
    item.iter()
        .filter(|(name, _)| name.as_str() == PK || name.as_str() == SK)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Sort key condition on a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SortCondition {
    Equals { attribute: String, value: String },
    BeginsWith { attribute: String, value: String },
}

/// A single-partition query, optionally against a secondary index.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table_name: String,
    pub index_name: Option<String>,
    pub partition_attribute: String,
    pub partition_value: String,
    pub sort: Option<SortCondition>,
    pub limit: Option<u32>,
    pub exclusive_start_key: Option<Key>,
}

impl Query {
    /// Query the table partition `pk = value`.
    pub fn partition(table_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            index_name: None,
            partition_attribute: PK.to_string(),
            partition_value: value.into(),
            sort: None,
            limit: None,
            exclusive_start_key: None,
        }
    }

    /// Query the list index partition `si1Hash = value`.
    pub fn index_partition(table_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            index_name: Some(SI1_INDEX.to_string()),
            partition_attribute: SI1_HASH.to_string(),
            ..Self::partition(table_name, value)
        }
    }

    fn sort_attribute(&self) -> &'static str {
        if self.index_name.is_some() {
            SI1_SORT
        } else {
            SK
        }
    }

    pub fn sort_equals(mut self, value: impl Into<String>) -> Self {
        self.sort = Some(SortCondition::Equals {
            attribute: self.sort_attribute().to_string(),
            value: value.into(),
        });
        self
    }

    pub fn sort_begins_with(mut self, value: impl Into<String>) -> Self {
        self.sort = Some(SortCondition::BeginsWith {
            attribute: self.sort_attribute().to_string(),
            value: value.into(),
        });
        self
    }

    pub fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    pub fn start_from(mut self, key: Option<Key>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub items: Vec<Item>,
    pub last_evaluated_key: Option<Key>,
}

/// A single write inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(Item),
    Delete(Key),
}

/// Requests grouped by table name.
///
/// Tables iterate in name order and entries keep insertion order, so
/// chunking is deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch<T> {
    tables: BTreeMap<String, Vec<T>>,
}

impl<T> Default for TableBatch<T> {
    fn default() -> Self {
        Self {
            tables: BTreeMap::new(),
        }
    }
}

impl<T> TableBatch<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, table: &str, entry: T) {
        self.tables.entry(table.to_string()).or_default().push(entry);
    }

    pub fn extend(&mut self, table: &str, entries: impl IntoIterator<Item = T>) {
        let mut entries = entries.into_iter().peekable();
        if entries.peek().is_some() {
            self.tables.entry(table.to_string()).or_default().extend(entries);
        }
    }

    /// Total entries across all tables.
    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, table: &str) -> Option<&Vec<T>> {
        self.tables.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<T>)> {
        self.tables.iter()
    }

    pub fn into_tables(self) -> BTreeMap<String, Vec<T>> {
        self.tables
    }
}

impl<T> FromIterator<(String, Vec<T>)> for TableBatch<T> {
    fn from_iter<I: IntoIterator<Item = (String, Vec<T>)>>(iter: I) -> Self {
        let mut batch = Self::new();
        for (table, entries) in iter {
            batch.extend(&table, entries);
        }
        batch
    }
}

pub type BatchWriteRequest = TableBatch<WriteRequest>;
pub type BatchGetRequest = TableBatch<Key>;

/// Result of one `batch_write` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchWriteOutput {
    pub unprocessed: BatchWriteRequest,
}

/// Result of one `batch_get` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetOutput {
    pub responses: BTreeMap<String, Vec<Item>>,
    pub unprocessed: BatchGetRequest,
}

/// Interface to a partitioned key-value store.
///
/// Implementations:
/// - `DynamoStoreClient`: AWS DynamoDB
/// - `MockStoreClient`: in-memory store for testing
///
/// A single call maps to a single round trip. Batch calls may report
/// part of the request as unprocessed; retrying is the caller's job
/// (see `BatchExecutor`).
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Query one partition, optionally narrowed by a sort key condition.
    async fn query(&self, query: Query) -> Result<QueryPage>;

    /// Write a batch of puts and deletes.
    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput>;

    /// Read a batch of rows by primary key.
    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput>;

    /// Put a single row, replacing any existing row with the same key.
    async fn put_item(&self, table_name: &str, item: Item) -> Result<()>;

    /// Delete a single row. Deleting a missing row succeeds.
    async fn delete_item(&self, table_name: &str, key: Key) -> Result<()>;
}
