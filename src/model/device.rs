use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{string_enum, DeploymentStatus};

string_enum! {
    /// Role of a device within its group.
    DeviceType {
        Core => "CORE",
        Device => "DEVICE",
    }
}

/// A provisioned thing and the group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub thing_name: String,
    pub group_name: String,
    pub device_type: DeviceType,
    pub thing_arn: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    pub fn new(thing_name: impl Into<String>, group_name: impl Into<String>, device_type: DeviceType) -> Self {
        let now = Utc::now();
        Self {
            thing_name: thing_name.into(),
            group_name: group_name.into(),
            device_type,
            thing_arn: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One deployment task that touched a device, as seen from the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDeploymentHistory {
    pub task_id: String,
    pub group_name: String,
    pub status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
