//! DynamoDB StoreClient implementation.
//!
//! Table schema (single table):
//! - `pk` (String): partition key
//! - `sk` (String): sort key
//! - GSI `si1Hash-si1Sort-index`: `si1Hash` (String) / `si1Sort` (String)

mod convert;

use std::collections::BTreeMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use tracing::{debug, info};

use crate::storage::client::{
    BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, Item, Key, Query,
    QueryPage, SortCondition, StoreClient,
};
use crate::storage::{Result, StorageError};

use convert::{
    item_from_sdk, item_to_sdk, keys_from_sdk, keys_to_sdk, writes_from_sdk, writes_to_sdk,
};

fn backend_error<E>(operation: &str, error: E) -> StorageError
where
    E: std::error::Error,
{
    StorageError::Backend(format!(
        "DynamoDB {} failed: {}",
        operation,
        DisplayErrorContext(&error)
    ))
}

/// DynamoDB implementation of StoreClient.
pub struct DynamoStoreClient {
    client: Client,
}

impl DynamoStoreClient {
    /// Create a client from the default AWS environment.
    ///
    /// `endpoint_url` overrides the service endpoint (e.g. DynamoDB Local).
    pub async fn new(endpoint_url: Option<&str>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        info!(endpoint = ?endpoint_url, "Connected to DynamoDB");
        Self { client }
    }
}

#[async_trait]
impl StoreClient for DynamoStoreClient {
    async fn query(&self, query: Query) -> Result<QueryPage> {
        let mut request = self
            .client
            .query()
            .table_name(&query.table_name)
            .set_index_name(query.index_name.clone())
            .expression_attribute_names("#pk", &query.partition_attribute)
            .expression_attribute_values(":pk", AttributeValue::S(query.partition_value.clone()));

        let condition = match &query.sort {
            None => "#pk = :pk",
            Some(SortCondition::Equals { attribute, value }) => {
                request = request
                    .expression_attribute_names("#sk", attribute)
                    .expression_attribute_values(":sk", AttributeValue::S(value.clone()));
                "#pk = :pk AND #sk = :sk"
            }
            Some(SortCondition::BeginsWith { attribute, value }) => {
                request = request
                    .expression_attribute_names("#sk", attribute)
                    .expression_attribute_values(":sk", AttributeValue::S(value.clone()));
                "#pk = :pk AND begins_with(#sk, :sk)"
            }
        };

        let output = request
            .key_condition_expression(condition)
            .set_limit(query.limit.map(|l| l as i32))
            .set_exclusive_start_key(query.exclusive_start_key.map(item_to_sdk))
            .send()
            .await
            .map_err(|e| backend_error("query", e))?;

        let items: Vec<Item> = output
            .items
            .unwrap_or_default()
            .into_iter()
            .map(item_from_sdk)
            .collect();

        debug!(
            table = %query.table_name,
            partition = %query.partition_value,
            rows = items.len(),
            "Queried DynamoDB partition"
        );

        Ok(QueryPage {
            items,
            last_evaluated_key: output.last_evaluated_key.map(item_from_sdk),
        })
    }

    async fn batch_write(&self, request: BatchWriteRequest) -> Result<BatchWriteOutput> {
        let output = self
            .client
            .batch_write_item()
            .set_request_items(Some(writes_to_sdk(request)?))
            .send()
            .await
            .map_err(|e| backend_error("batch_write_item", e))?;

        Ok(BatchWriteOutput {
            unprocessed: writes_from_sdk(output.unprocessed_items),
        })
    }

    async fn batch_get(&self, request: BatchGetRequest) -> Result<BatchGetOutput> {
        let output = self
            .client
            .batch_get_item()
            .set_request_items(Some(keys_to_sdk(request)?))
            .send()
            .await
            .map_err(|e| backend_error("batch_get_item", e))?;

        let responses: BTreeMap<String, Vec<Item>> = output
            .responses
            .unwrap_or_default()
            .into_iter()
            .map(|(table, rows)| (table, rows.into_iter().map(item_from_sdk).collect()))
            .collect();

        Ok(BatchGetOutput {
            responses,
            unprocessed: keys_from_sdk(output.unprocessed_keys),
        })
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(item_to_sdk(item)))
            .send()
            .await
            .map_err(|e| backend_error("put_item", e))?;
        Ok(())
    }

    async fn delete_item(&self, table_name: &str, key: Key) -> Result<()> {
        self.client
            .delete_item()
            .table_name(table_name)
            .set_key(Some(item_to_sdk(key)))
            .send()
            .await
            .map_err(|e| backend_error("delete_item", e))?;
        Ok(())
    }
}
