//! Storage configuration types.

use serde::Deserialize;

use super::ConfigError;
use crate::storage::batch::{
    BatchLimits, MAX_BATCH_ATTEMPTS, MAX_BATCH_GET_KEYS, MAX_BATCH_WRITE_ITEMS,
};

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Dynamo,
    Memory,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// DynamoDB-specific configuration. The table name is also used by the
    /// in-memory store.
    pub dynamo: DynamoConfig,
    /// Batch executor limits.
    pub batch: BatchConfig,
}

impl StorageConfig {
    /// Check that batch limits fit within what the store accepts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dynamo.table_name.is_empty() {
            return Err(ConfigError::Invalid("storage.dynamo.table_name is empty".into()));
        }
        self.batch.validate()
    }
}

/// DynamoDB-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamoConfig {
    /// Single table holding every entity.
    pub table_name: String,
    /// Endpoint override, e.g. `http://localhost:8000` for DynamoDB Local.
    pub endpoint_url: Option<String>,
}

impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table_name: "fleet-store".to_string(),
            endpoint_url: None,
        }
    }
}

/// Batch executor limits.
///
/// Lowering the limits below the store maximums spreads load over more,
/// smaller calls. Raising them above the maximums is rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Items per batch write call. Default: 25
    pub max_write_items: usize,
    /// Keys per batch get call. Default: 100
    pub max_get_keys: usize,
    /// Total attempts per batch, including the first. Default: 3
    pub max_attempts: u32,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_write_items: MAX_BATCH_WRITE_ITEMS,
            max_get_keys: MAX_BATCH_GET_KEYS,
            max_attempts: MAX_BATCH_ATTEMPTS,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_write_items == 0 || self.max_write_items > MAX_BATCH_WRITE_ITEMS {
            return Err(ConfigError::Invalid(format!(
                "storage.batch.max_write_items must be 1..={}, got {}",
                MAX_BATCH_WRITE_ITEMS, self.max_write_items
            )));
        }
        if self.max_get_keys == 0 || self.max_get_keys > MAX_BATCH_GET_KEYS {
            return Err(ConfigError::Invalid(format!(
                "storage.batch.max_get_keys must be 1..={}, got {}",
                MAX_BATCH_GET_KEYS, self.max_get_keys
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "storage.batch.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn limits(&self) -> BatchLimits {
        BatchLimits {
            max_write_items: self.max_write_items,
            max_get_keys: self.max_get_keys,
            max_attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let storage = StorageConfig::default();
        assert_eq!(storage.storage_type, StorageType::Dynamo);
        assert_eq!(storage.dynamo.table_name, "fleet-store");
        assert!(storage.dynamo.endpoint_url.is_none());
        assert_eq!(storage.batch.limits(), BatchLimits::default());
        assert!(storage.validate().is_ok());
    }

    #[test]
    fn test_batch_limits_above_store_maximum_rejected() {
        let batch = BatchConfig {
            max_write_items: 26,
            ..BatchConfig::default()
        };
        assert!(matches!(batch.validate(), Err(ConfigError::Invalid(_))));

        let batch = BatchConfig {
            max_get_keys: 0,
            ..BatchConfig::default()
        };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let batch = BatchConfig {
            max_attempts: 0,
            ..BatchConfig::default()
        };
        assert!(batch.validate().is_err());
    }

    #[test]
    fn test_empty_table_name_rejected() {
        let mut storage = StorageConfig::default();
        storage.dynamo.table_name.clear();
        assert!(storage.validate().is_err());
    }
}
