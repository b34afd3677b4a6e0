use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned deployment template.
///
/// Saving a template writes its current row and an immutable row for the
/// version being saved, so older versions stay readable after an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    pub version: u32,
    pub description: Option<String>,
    /// Deployment document pushed to groups built from this template.
    pub document: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            version,
            description: None,
            document: None,
            created_at: now,
            updated_at: now,
        }
    }
}
