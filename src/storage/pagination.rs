//! Continuation tokens for paged list operations.
//!
//! A token is the store's last-evaluated key, serialized to JSON and then
//! base64-encoded, so it can travel through an API as one opaque string.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::client::Key;
use super::{Result, StorageError};

/// Encode a last-evaluated key as a continuation token.
pub fn encode_token(key: &Key) -> Result<String> {
    let json = serde_json::to_vec(key)
        .map_err(|e| StorageError::InvalidToken(format!("serialize failed: {}", e)))?;
    Ok(STANDARD.encode(json))
}

/// Decode a continuation token back into a start key.
pub fn decode_token(token: &str) -> Result<Key> {
    let json = STANDARD
        .decode(token)
        .map_err(|e| StorageError::InvalidToken(format!("not base64: {}", e)))?;
    serde_json::from_slice(&json)
        .map_err(|e| StorageError::InvalidToken(format!("not a key: {}", e)))
}

/// Paging parameters for a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Maximum results to return.
    pub count: Option<u32>,
    /// Token from a previous page.
    pub next_token: Option<String>,
}

impl PageRequest {
    pub fn first(count: u32) -> Self {
        Self {
            count: Some(count),
            next_token: None,
        }
    }

    pub fn next(count: Option<u32>, next_token: impl Into<String>) -> Self {
        Self {
            count,
            next_token: Some(next_token.into()),
        }
    }

    /// The query limit. A zero count is rejected rather than read as an
    /// empty, finished listing.
    pub(crate) fn limit(&self) -> Result<Option<u32>> {
        match self.count {
            Some(0) => Err(StorageError::InvalidPageSize(0)),
            count => Ok(count),
        }
    }

    pub(crate) fn start_key(&self) -> Result<Option<Key>> {
        self.next_token.as_deref().map(decode_token).transpose()
    }
}

/// One page of list results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of items on this page.
    pub count: usize,
    /// Present when more results remain.
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub(crate) fn new(items: Vec<T>, last_evaluated_key: Option<&Key>) -> Result<Self> {
        Ok(Self {
            count: items.len(),
            items,
            next_token: last_evaluated_key.map(encode_token).transpose()?,
        })
    }
}
