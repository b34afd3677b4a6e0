//! Batch write/read executor.
//!
//! Hides the store's per-call batch ceilings and partial-failure behavior
//! behind calls that look like unbounded batches:
//!
//! 1. split the request into chunks at or under the per-call limit
//! 2. issue the chunks one at a time
//! 3. rejoin whatever the store reported as unprocessed and resubmit only
//!    that subset
//! 4. stop after `max_attempts` passes and hand the remainder back
//!
//! The remainder is never swallowed. Callers must treat a non-empty
//! remainder as a failed operation.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::client::{BatchGetRequest, BatchWriteRequest, Item, StoreClient, TableBatch};
use super::Result;

/// Maximum items per batch write call.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;
/// Maximum keys per batch get call.
pub const MAX_BATCH_GET_KEYS: usize = 100;
/// Total attempts per batch call, including the first.
pub const MAX_BATCH_ATTEMPTS: u32 = 3;

/// Store-imposed batch limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_write_items: usize,
    pub max_get_keys: usize,
    pub max_attempts: u32,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_write_items: MAX_BATCH_WRITE_ITEMS,
            max_get_keys: MAX_BATCH_GET_KEYS,
            max_attempts: MAX_BATCH_ATTEMPTS,
        }
    }
}

/// Split a batch into ordered chunks of at most `limit` entries.
///
/// Tables are walked in order and entries keep their order, so a chunk may
/// finish one table and start the next. Every entry lands in exactly one
/// chunk.
pub fn split_into_chunks<T>(batch: TableBatch<T>, limit: usize) -> Vec<TableBatch<T>> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = TableBatch::new();
    let mut current_len = 0;

    for (table, entries) in batch.into_tables() {
        for entry in entries {
            if current_len == limit {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(&table, entry);
            current_len += 1;
        }
    }

    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

/// Rejoin chunks into one batch, keeping every entry (duplicates included).
pub fn join_chunks<T>(chunks: impl IntoIterator<Item = TableBatch<T>>) -> TableBatch<T> {
    let mut joined = TableBatch::new();
    for chunk in chunks {
        for (table, entries) in chunk.into_tables() {
            joined.extend(&table, entries);
        }
    }
    joined
}

/// Accumulated result of [`BatchExecutor::batch_get_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchGetResult {
    /// Rows read, grouped by table.
    pub responses: BTreeMap<String, Vec<Item>>,
    /// Keys still unread after the final attempt.
    pub unprocessed: BatchGetRequest,
}

impl BatchGetResult {
    pub fn is_complete(&self) -> bool {
        self.unprocessed.is_empty()
    }

    /// Rows read from `table`, in arrival order.
    pub fn rows(&self, table: &str) -> &[Item] {
        self.responses.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Executes batch requests against a [`StoreClient`] within store limits.
pub struct BatchExecutor {
    client: Arc<dyn StoreClient>,
    limits: BatchLimits,
}

impl BatchExecutor {
    /// Create an executor with the default store limits.
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self::with_limits(client, BatchLimits::default())
    }

    pub fn with_limits(client: Arc<dyn StoreClient>, limits: BatchLimits) -> Self {
        Self { client, limits }
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Write every item in `request`.
    ///
    /// Returns the items still unprocessed after the final attempt; an empty
    /// batch means everything was written. Backend errors abort immediately,
    /// leaving earlier chunks written.
    pub async fn batch_write_all(&self, request: BatchWriteRequest) -> Result<BatchWriteRequest> {
        let mut pending = request;
        let mut attempt = 1;

        loop {
            if pending.is_empty() {
                return Ok(pending);
            }

            let chunks = split_into_chunks(pending, self.limits.max_write_items);
            let chunk_count = chunks.len();
            let mut unprocessed = Vec::new();

            for (index, chunk) in chunks.into_iter().enumerate() {
                debug!(
                    attempt,
                    chunk = index + 1,
                    chunks = chunk_count,
                    items = chunk.len(),
                    "Issuing batch write"
                );
                let output = self.client.batch_write(chunk).await?;
                if !output.unprocessed.is_empty() {
                    unprocessed.push(output.unprocessed);
                }
            }

            let remaining = join_chunks(unprocessed);
            if remaining.is_empty() {
                return Ok(remaining);
            }

            if attempt >= self.limits.max_attempts {
                warn!(
                    attempts = attempt,
                    unprocessed = remaining.len(),
                    "Batch write gave up with unprocessed items"
                );
                return Ok(remaining);
            }

            warn!(
                attempt,
                unprocessed = remaining.len(),
                "Batch write partially processed, retrying remainder"
            );
            attempt += 1;
            pending = remaining;
        }
    }

    /// Read every key in `request`.
    ///
    /// Rows from all chunks and attempts are merged per table. Keys the store
    /// never processed are returned in [`BatchGetResult::unprocessed`].
    pub async fn batch_get_all(&self, request: BatchGetRequest) -> Result<BatchGetResult> {
        let mut result = BatchGetResult::default();
        let mut pending = request;
        let mut attempt = 1;

        loop {
            if pending.is_empty() {
                return Ok(result);
            }

            let chunks = split_into_chunks(pending, self.limits.max_get_keys);
            let chunk_count = chunks.len();
            let mut unprocessed = Vec::new();

            for (index, chunk) in chunks.into_iter().enumerate() {
                debug!(
                    attempt,
                    chunk = index + 1,
                    chunks = chunk_count,
                    keys = chunk.len(),
                    "Issuing batch get"
                );
                let output = self.client.batch_get(chunk).await?;
                for (table, rows) in output.responses {
                    result.responses.entry(table).or_default().extend(rows);
                }
                if !output.unprocessed.is_empty() {
                    unprocessed.push(output.unprocessed);
                }
            }

            let remaining = join_chunks(unprocessed);
            if remaining.is_empty() {
                return Ok(result);
            }

            if attempt >= self.limits.max_attempts {
                warn!(
                    attempts = attempt,
                    unprocessed = remaining.len(),
                    "Batch get gave up with unprocessed keys"
                );
                result.unprocessed = remaining;
                return Ok(result);
            }

            warn!(
                attempt,
                unprocessed = remaining.len(),
                "Batch get partially processed, retrying remainder"
            );
            attempt += 1;
            pending = remaining;
        }
    }
}

#[cfg(test)]
mod tests;
