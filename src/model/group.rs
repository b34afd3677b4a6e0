use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A device group provisioned from a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    /// Backend-assigned id. Also keys the id-to-name lookup row.
    pub group_id: String,
    pub template_name: String,
    pub template_version: u32,
    pub arn: Option<String>,
    /// Every template version ever applied, ordered by template then version.
    /// Only populated by single-group reads.
    #[serde(default)]
    pub template_history: Vec<AppliedTemplate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// New group with a freshly generated id.
    pub fn new(name: impl Into<String>, template_name: impl Into<String>, template_version: u32) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            group_id: Uuid::new_v4().to_string(),
            template_name: template_name.into(),
            template_version,
            arn: None,
            template_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One template version applied to a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedTemplate {
    pub template_name: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
