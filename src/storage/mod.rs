//! Single-table storage engine.
//!
//! Every aggregate family (templates, groups, devices, deployment tasks)
//! persists as rows in one partitioned table. This module provides the
//! shared pieces the repositories are built from:
//!
//! - [`keys`]: composite partition/sort key codec
//! - [`client`]: the [`StoreClient`] boundary and row types
//! - [`batch`]: chunked, retrying batch write/read executor
//! - [`row`]: typed attribute access for building and reading rows
//! - [`pagination`]: opaque continuation tokens for list operations
//!
//! Backends:
//! - `DynamoStoreClient`: AWS DynamoDB (feature `dynamo`)
//! - `MockStoreClient`: in-memory store for tests and local runs

use std::sync::Arc;

use tracing::info;

use crate::config::{StorageConfig, StorageType};

pub mod batch;
pub mod client;
#[cfg(feature = "dynamo")]
pub mod dynamo;
pub mod keys;
pub mod mock;
pub mod pagination;
pub mod row;

pub use batch::{BatchExecutor, BatchGetResult, BatchLimits};
pub use client::{
    AttrValue, BatchGetOutput, BatchGetRequest, BatchWriteOutput, BatchWriteRequest, Item, Key,
    Query, QueryPage, SortCondition, StoreClient, TableBatch, WriteRequest,
};
#[cfg(feature = "dynamo")]
pub use dynamo::DynamoStoreClient;
pub use keys::Tag;
pub use mock::MockStoreClient;
pub use pagination::{Page, PageRequest};

/// Errors raised by the storage engine.
///
/// "Not found" is deliberately absent: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Key encoding error: {0}")]
    Encoding(String),

    #[error("Save failed: {unprocessed} items unprocessed after retries")]
    SaveFailed { unprocessed: usize },

    #[error("Fetch failed: {unprocessed} keys unprocessed after retries")]
    FetchFailed { unprocessed: usize },

    #[error("Invalid continuation token: {0}")]
    InvalidToken(String),

    #[error("Invalid page size: {0}")]
    InvalidPageSize(u32),

    #[error("Missing attribute '{attribute}' on row {sk}")]
    MissingAttribute { attribute: String, sk: String },

    #[error("Invalid attribute '{attribute}': {reason}")]
    InvalidAttribute { attribute: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Initialize the store client and batch executor from configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<BatchExecutor>, Box<dyn std::error::Error>> {
    config.validate()?;
    let limits = config.batch.limits();

    let client: Arc<dyn StoreClient> = match config.storage_type {
        #[cfg(feature = "dynamo")]
        StorageType::Dynamo => {
            info!(
                table = %config.dynamo.table_name,
                endpoint = ?config.dynamo.endpoint_url,
                "Storage: DynamoDB"
            );
            Arc::new(DynamoStoreClient::new(config.dynamo.endpoint_url.as_deref()).await)
        }
        #[cfg(not(feature = "dynamo"))]
        StorageType::Dynamo => {
            tracing::error!("DynamoDB storage requested but 'dynamo' feature is not enabled");
            return Err("DynamoDB feature not enabled".into());
        }
        StorageType::Memory => {
            info!("Storage: in-memory");
            Arc::new(MockStoreClient::new())
        }
    };

    Ok(Arc::new(BatchExecutor::with_limits(client, limits)))
}
