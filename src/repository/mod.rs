//! Entity repositories.
//!
//! Each repository explodes its aggregate into rows on save and rebuilds it
//! from one partition query on read. All of them share a [`Table`] handle:
//! the batch executor plus the name of the single table.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::storage::client::{key_of, Item, Key, Query, QueryPage, WriteRequest, PK, SK};
use crate::storage::keys::KeyPath;
use crate::storage::row::RowReader;
use crate::storage::{
    BatchExecutor, BatchGetRequest, BatchWriteRequest, PageRequest, Result, StorageError,
};

mod deployments;
mod devices;
mod groups;
mod templates;

pub use deployments::DeploymentTaskRepository;
pub use devices::DeviceRepository;
pub use groups::GroupRepository;
pub use templates::TemplateRepository;

/// Handle to the fleet table.
#[derive(Clone)]
pub struct Table {
    executor: Arc<BatchExecutor>,
    name: String,
}

impl Table {
    pub fn new(executor: Arc<BatchExecutor>, name: impl Into<String>) -> Self {
        Self {
            executor,
            name: name.into(),
        }
    }

    /// Query on the table partition `pk = value`.
    pub(crate) fn partition(&self, pk: impl Into<String>) -> Query {
        Query::partition(&self.name, pk)
    }

    /// Query on the list index partition `si1Hash = value`.
    pub(crate) fn index(&self, hash: impl Into<String>) -> Query {
        Query::index_partition(&self.name, hash)
    }

    /// Run a query to completion, following every page.
    pub(crate) async fn query_all(&self, query: Query) -> Result<Vec<Item>> {
        let mut query = query;
        let mut rows = Vec::new();
        loop {
            let page = self.executor.client().query(query.clone()).await?;
            rows.extend(page.items);
            match page.last_evaluated_key {
                Some(key) => query = query.start_from(Some(key)),
                None => return Ok(rows),
            }
        }
    }

    /// Run one page of a list query.
    pub(crate) async fn query_page(&self, query: Query, page: &PageRequest) -> Result<QueryPage> {
        let query = query.limit(page.limit()?).start_from(page.start_key()?);
        self.executor.client().query(query).await
    }

    /// Write rows through the batch executor.
    ///
    /// Any remainder the executor could not write fails the whole call.
    pub(crate) async fn write(&self, writes: Vec<WriteRequest>) -> Result<()> {
        let writes = dedupe_writes(writes);
        if writes.is_empty() {
            return Ok(());
        }

        let total = writes.len();
        let mut request = BatchWriteRequest::new();
        request.extend(&self.name, writes);

        let unprocessed = self.executor.batch_write_all(request).await?;
        if !unprocessed.is_empty() {
            warn!(
                table = %self.name,
                total,
                unprocessed = unprocessed.len(),
                "Batch write left rows unprocessed"
            );
            return Err(StorageError::SaveFailed {
                unprocessed: unprocessed.len(),
            });
        }
        Ok(())
    }

    pub(crate) async fn put_rows(&self, rows: Vec<Item>) -> Result<()> {
        self.write(rows.into_iter().map(WriteRequest::Put).collect())
            .await
    }

    /// Delete exactly the given rows.
    pub(crate) async fn delete_rows<'a>(&self, rows: impl IntoIterator<Item = &'a Item>) -> Result<()> {
        self.write(
            rows.into_iter()
                .map(|row| WriteRequest::Delete(key_of(row)))
                .collect(),
        )
        .await
    }

    /// Fetch rows by primary key through the batch executor.
    ///
    /// Keys the executor could not fetch fail the whole call; keys with no
    /// row are simply absent from the result.
    pub(crate) async fn get_rows(&self, keys: Vec<Key>) -> Result<Vec<Item>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = BatchGetRequest::new();
        request.extend(&self.name, keys);

        let mut result = self.executor.batch_get_all(request).await?;
        if !result.is_complete() {
            warn!(
                table = %self.name,
                unprocessed = result.unprocessed.len(),
                "Batch get left keys unprocessed"
            );
            return Err(StorageError::FetchFailed {
                unprocessed: result.unprocessed.len(),
            });
        }
        Ok(result.responses.remove(&self.name).unwrap_or_default())
    }

    pub(crate) async fn put_row(&self, row: Item) -> Result<()> {
        self.executor.client().put_item(&self.name, row).await
    }
}

/// Drop earlier writes to a key written again later in the same request.
///
/// The store rejects a batch that touches one key twice.
fn dedupe_writes(writes: Vec<WriteRequest>) -> Vec<WriteRequest> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut deduped: Vec<WriteRequest> = Vec::with_capacity(writes.len());

    for write in writes {
        let row = match &write {
            WriteRequest::Put(item) | WriteRequest::Delete(item) => item,
        };
        let reader = RowReader::new(row);
        let key = (
            reader.s(PK).unwrap_or_default().to_string(),
            reader.s(SK).unwrap_or_default().to_string(),
        );
        match positions.get(&key) {
            Some(&index) => deduped[index] = write,
            None => {
                positions.insert(key, deduped.len());
                deduped.push(write);
            }
        }
    }
    deduped
}

/// Parse a row's sort key into a tag/value path.
///
/// `None` for rows with no sort key or one that does not decode; the
/// assemblers treat those as unrecognized.
pub(crate) fn sort_path(row: &RowReader<'_>) -> Option<KeyPath> {
    let sk = row.sk()?;
    match KeyPath::parse(sk) {
        Ok(path) => path,
        Err(e) => {
            warn!(sk, error = %e, "Undecodable sort key");
            None
        }
    }
}

/// Bundle of every repository over one table.
#[derive(Clone)]
pub struct Repositories {
    pub templates: TemplateRepository,
    pub groups: GroupRepository,
    pub devices: DeviceRepository,
    pub deployments: DeploymentTaskRepository,
}

impl Repositories {
    pub fn new(executor: Arc<BatchExecutor>, table_name: impl Into<String>) -> Self {
        let table = Table::new(executor, table_name);
        Self {
            templates: TemplateRepository::new(table.clone()),
            groups: GroupRepository::new(table.clone()),
            devices: DeviceRepository::new(table.clone()),
            deployments: DeploymentTaskRepository::new(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::client::primary_key;
    use crate::storage::row::RowBuilder;
    use crate::storage::MockStoreClient;

    fn table(mock: &Arc<MockStoreClient>) -> Table {
        Table::new(Arc::new(BatchExecutor::new(mock.clone())), "fleet")
    }

    #[test]
    fn test_dedupe_keeps_last_write_in_first_position() {
        let writes = vec![
            WriteRequest::Put(RowBuilder::new("D:a", "D:a").s("v", "1").build()),
            WriteRequest::Put(RowBuilder::new("D:b", "D:b").build()),
            WriteRequest::Put(RowBuilder::new("D:a", "D:a").s("v", "2").build()),
        ];

        let deduped = dedupe_writes(writes);

        assert_eq!(deduped.len(), 2);
        match &deduped[0] {
            WriteRequest::Put(item) => assert_eq!(RowReader::new(item).s("v"), Some("2")),
            other => panic!("unexpected write {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_query_all_follows_pages() {
        let mock = Arc::new(MockStoreClient::new());
        let table = table(&mock);
        for i in 0..5 {
            let name = format!("t{}", i);
            mock.insert_row(
                "fleet",
                RowBuilder::new(format!("T:{}", name), format!("T:{}", name))
                    .index("type:T", format!("T:{}", name))
                    .build(),
            )
            .await
            .unwrap();
        }

        let rows = table
            .query_all(table.index("type:T").limit(Some(2)))
            .await
            .unwrap();

        assert_eq!(rows.len(), 5);
    }

    #[tokio::test]
    async fn test_write_fails_with_unprocessed_remainder() {
        let mock = Arc::new(MockStoreClient::new());
        let table = table(&mock);
        mock.queue_unprocessed_writes([1, 1, 1]).await;

        let result = table
            .put_rows(vec![
                RowBuilder::new("D:a", "D:a").build(),
                RowBuilder::new("D:b", "D:b").build(),
            ])
            .await;

        assert!(matches!(result, Err(StorageError::SaveFailed { unprocessed: 1 })));
    }

    #[tokio::test]
    async fn test_get_rows_fails_with_unprocessed_remainder() {
        let mock = Arc::new(MockStoreClient::new());
        let table = table(&mock);
        mock.queue_unprocessed_gets([1, 1, 1]).await;

        let result = table.get_rows(vec![primary_key("D:a", "D:a")]).await;

        assert!(matches!(result, Err(StorageError::FetchFailed { unprocessed: 1 })));
    }

    #[tokio::test]
    async fn test_empty_write_issues_no_calls() {
        let mock = Arc::new(MockStoreClient::new());
        let table = table(&mock);

        table.put_rows(Vec::new()).await.unwrap();

        assert!(mock.write_calls().await.is_empty());
    }
}
