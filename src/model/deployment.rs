use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::string_enum;

string_enum! {
    /// Lifecycle of a deployment task.
    ///
    /// Workflows read this before starting work on a task and write
    /// `InProgress` to claim it. Nothing in the store enforces the claim.
    TaskStatus {
        Waiting => "WAITING",
        InProgress => "IN_PROGRESS",
        Success => "SUCCESS",
        Failure => "FAILURE",
    }
}

impl TaskStatus {
    /// True once the task can no longer change.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

string_enum! {
    /// Status of a deployment to one group or one device.
    DeploymentStatus {
        Pending => "PENDING",
        InProgress => "IN_PROGRESS",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Canceled => "CANCELED",
    }
}

/// A request to roll a template version out to a set of groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentTask {
    pub task_id: String,
    pub template_name: String,
    pub template_version: u32,
    pub status: TaskStatus,
    pub status_message: Option<String>,
    /// Ordered by group name. Empty on summary reads.
    #[serde(default)]
    pub groups: Vec<GroupDeployment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeploymentTask {
    /// New waiting task with a freshly generated id.
    pub fn new(template_name: impl Into<String>, template_version: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4().to_string(),
            template_name: template_name.into(),
            template_version,
            status: TaskStatus::Waiting,
            status_message: None,
            groups: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// The part of a task targeting one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDeployment {
    pub group_name: String,
    /// Backend deployment id, once submitted.
    pub deployment_id: Option<String>,
    pub status: DeploymentStatus,
    /// Ordered by thing name.
    pub devices: Vec<DeviceDeployment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupDeployment {
    pub fn new(group_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            group_name: group_name.into(),
            deployment_id: None,
            status: DeploymentStatus::Pending,
            devices: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDeployment {
    pub thing_name: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceDeployment {
    pub fn new(thing_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thing_name: thing_name.into(),
            status: DeploymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}
