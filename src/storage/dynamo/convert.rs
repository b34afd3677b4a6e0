//! Conversion between storage rows and DynamoDB SDK types.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::{
    AttributeValue, DeleteRequest, KeysAndAttributes, PutRequest, WriteRequest as SdkWriteRequest,
};
use tracing::warn;

use crate::storage::client::{AttrValue, Item, Key, TableBatch, WriteRequest};
use crate::storage::{Result, StorageError};

pub(super) fn to_sdk(value: AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s),
        AttrValue::N(n) => AttributeValue::N(n),
        AttrValue::Bool(b) => AttributeValue::Bool(b),
        AttrValue::Null => AttributeValue::Null(true),
        AttrValue::L(list) => AttributeValue::L(list.into_iter().map(to_sdk).collect()),
        AttrValue::M(map) => AttributeValue::M(item_to_sdk(map)),
        AttrValue::Ss(set) => AttributeValue::Ss(set),
        AttrValue::Ns(set) => AttributeValue::Ns(set),
    }
}

pub(super) fn from_sdk(value: AttributeValue) -> AttrValue {
    match value {
        AttributeValue::S(s) => AttrValue::S(s),
        AttributeValue::N(n) => AttrValue::N(n),
        AttributeValue::Bool(b) => AttrValue::Bool(b),
        AttributeValue::Null(_) => AttrValue::Null,
        AttributeValue::L(list) => AttrValue::L(list.into_iter().map(from_sdk).collect()),
        AttributeValue::M(map) => AttrValue::M(item_from_sdk(map)),
        AttributeValue::Ss(set) => AttrValue::Ss(set),
        AttributeValue::Ns(set) => AttrValue::Ns(set),
        other => {
            warn!(value = ?other, "Unsupported DynamoDB attribute type, reading as NULL");
            AttrValue::Null
        }
    }
}

pub(super) fn item_to_sdk(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter().map(|(k, v)| (k, to_sdk(v))).collect()
}

pub(super) fn item_from_sdk(item: HashMap<String, AttributeValue>) -> Item {
    item.into_iter().map(|(k, v)| (k, from_sdk(v))).collect()
}

fn build_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(format!("DynamoDB request build failed: {}", e))
}

pub(super) fn write_to_sdk(write: WriteRequest) -> Result<SdkWriteRequest> {
    let request = match write {
        WriteRequest::Put(item) => SdkWriteRequest::builder()
            .put_request(
                PutRequest::builder()
                    .set_item(Some(item_to_sdk(item)))
                    .build()
                    .map_err(build_error)?,
            )
            .build(),
        WriteRequest::Delete(key) => SdkWriteRequest::builder()
            .delete_request(
                DeleteRequest::builder()
                    .set_key(Some(item_to_sdk(key)))
                    .build()
                    .map_err(build_error)?,
            )
            .build(),
    };
    Ok(request)
}

pub(super) fn write_from_sdk(write: SdkWriteRequest) -> Option<WriteRequest> {
    if let Some(put) = write.put_request {
        return Some(WriteRequest::Put(item_from_sdk(put.item)));
    }
    write
        .delete_request
        .map(|delete| WriteRequest::Delete(item_from_sdk(delete.key)))
}

pub(super) fn writes_to_sdk(
    batch: TableBatch<WriteRequest>,
) -> Result<HashMap<String, Vec<SdkWriteRequest>>> {
    batch
        .into_tables()
        .into_iter()
        .map(|(table, writes)| {
            let writes = writes
                .into_iter()
                .map(write_to_sdk)
                .collect::<Result<Vec<_>>>()?;
            Ok((table, writes))
        })
        .collect()
}

pub(super) fn writes_from_sdk(
    unprocessed: Option<HashMap<String, Vec<SdkWriteRequest>>>,
) -> TableBatch<WriteRequest> {
    unprocessed
        .unwrap_or_default()
        .into_iter()
        .map(|(table, writes)| {
            let writes = writes.into_iter().filter_map(write_from_sdk).collect();
            (table, writes)
        })
        .collect()
}

pub(super) fn keys_to_sdk(batch: TableBatch<Key>) -> Result<HashMap<String, KeysAndAttributes>> {
    batch
        .into_tables()
        .into_iter()
        .map(|(table, keys)| {
            let keys = KeysAndAttributes::builder()
                .set_keys(Some(keys.into_iter().map(item_to_sdk).collect()))
                .build()
                .map_err(build_error)?;
            Ok((table, keys))
        })
        .collect()
}

pub(super) fn keys_from_sdk(
    unprocessed: Option<HashMap<String, KeysAndAttributes>>,
) -> TableBatch<Key> {
    unprocessed
        .unwrap_or_default()
        .into_iter()
        .map(|(table, keys)| {
            let keys = keys.keys.into_iter().map(item_from_sdk).collect();
            (table, keys)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::client::primary_key;

    #[test]
    fn test_attribute_roundtrip() {
        let mut nested = HashMap::new();
        nested.insert("k".to_string(), AttrValue::N("1".to_string()));
        let value = AttrValue::L(vec![
            AttrValue::S("a".to_string()),
            AttrValue::Bool(false),
            AttrValue::Null,
            AttrValue::M(nested),
            AttrValue::Ss(vec!["x".to_string()]),
        ]);

        assert_eq!(from_sdk(to_sdk(value.clone())), value);
    }

    #[test]
    fn test_write_request_roundtrip() {
        let put = WriteRequest::Put(primary_key("D:a", "D:a"));
        let delete = WriteRequest::Delete(primary_key("D:b", "D:b"));

        let sdk_put = write_to_sdk(put.clone()).unwrap();
        let sdk_delete = write_to_sdk(delete.clone()).unwrap();

        assert_eq!(write_from_sdk(sdk_put), Some(put));
        assert_eq!(write_from_sdk(sdk_delete), Some(delete));
    }

    #[test]
    fn test_unprocessed_keys_regroup_by_table() {
        let mut batch = TableBatch::new();
        batch.push("fleet", primary_key("D:a", "D:a"));
        batch.push("fleet", primary_key("D:b", "D:b"));

        let sdk = keys_to_sdk(batch.clone()).unwrap();
        assert_eq!(keys_from_sdk(Some(sdk)), batch);
        assert!(keys_from_sdk(None).is_empty());
    }
}
