//! Device rows.
//!
//! Partition `D:{thing}` holds:
//! - `D:{thing}`: the device, listed under `G:{group}` on the index
//! - `DT:{taskId}`: one history row per deployment task that targeted it

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::model::{DeploymentStatus, Device, DeviceDeploymentHistory, DeviceType};
use crate::repository::sort_path;
use crate::storage::client::Item;
use crate::storage::keys::{encode, KeyPath, Tag, DELIMITER};
use crate::storage::row::{attr, RowBuilder, RowReader, Timestamps};
use crate::storage::{Result, StorageError};

const GROUP_NAME: &str = "groupName";
const DEVICE_TYPE: &str = "deviceType";
const THING_ARN: &str = "thingArn";
const STATUS: &str = "status";

pub(crate) fn device_key(thing_name: &str) -> String {
    encode(Tag::Device, &[thing_name.into()])
}

pub(crate) fn history_key(task_id: &str) -> String {
    encode(Tag::DeploymentTask, &[task_id.into()])
}

/// Sort-key prefix of every history row.
pub(super) fn history_prefix() -> String {
    format!("{}{}", Tag::DeploymentTask, DELIMITER)
}

/// Sort-key prefix of device rows on the list index.
pub(super) fn device_prefix() -> String {
    format!("{}{}", Tag::Device, DELIMITER)
}

/// Index partition listing the devices of a group.
pub(super) fn group_listing_key(group_name: &str) -> String {
    encode(Tag::Group, &[group_name.into()])
}

/// Sort-key shapes found in a device partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum DeviceRow {
    Device { thing_name: String },
    History { task_id: String },
    Unrecognized,
}

impl DeviceRow {
    pub(super) fn classify(path: Option<&KeyPath>) -> Self {
        match path.map(KeyPath::pairs) {
            Some([(Tag::Device, thing_name)]) => Self::Device {
                thing_name: thing_name.clone(),
            },
            Some([(Tag::DeploymentTask, task_id)]) => Self::History {
                task_id: task_id.clone(),
            },
            _ => Self::Unrecognized,
        }
    }
}

pub(super) fn explode(device: &Device) -> Item {
    let pk = device_key(&device.thing_name);
    RowBuilder::new(&pk, &pk)
        .index(group_listing_key(&device.group_name), &pk)
        .s(GROUP_NAME, &device.group_name)
        .s(DEVICE_TYPE, device.device_type.as_str())
        .opt_s(THING_ARN, device.thing_arn.as_deref())
        .timestamp(attr::CREATED_AT, &device.created_at)
        .timestamp(attr::UPDATED_AT, &device.updated_at)
        .build()
}

/// History row recording that `task_id` deployed to a device.
pub(crate) fn history_row(
    thing_name: &str,
    task_id: &str,
    group_name: &str,
    status: DeploymentStatus,
    created_at: &DateTime<Utc>,
    updated_at: &DateTime<Utc>,
) -> Item {
    RowBuilder::new(device_key(thing_name), history_key(task_id))
        .s(GROUP_NAME, group_name)
        .s(STATUS, status.as_str())
        .timestamp(attr::CREATED_AT, created_at)
        .timestamp(attr::UPDATED_AT, updated_at)
        .build()
}

pub(super) fn device_from_row(thing_name: String, row: &RowReader<'_>) -> Result<Device> {
    let group_name = row.required_s(GROUP_NAME)?.to_string();
    let device_type: DeviceType = row.parsed(DEVICE_TYPE)?.ok_or_else(|| {
        StorageError::MissingAttribute {
            attribute: DEVICE_TYPE.to_string(),
            sk: row.sk().unwrap_or_default().to_string(),
        }
    })?;
    let (created_at, updated_at) = Timestamps::of_row(row)?.resolve();
    Ok(Device {
        thing_name,
        group_name,
        device_type,
        thing_arn: row.s(THING_ARN).map(str::to_string),
        created_at,
        updated_at,
    })
}

fn history_from_row(task_id: String, row: &RowReader<'_>) -> Result<DeviceDeploymentHistory> {
    let group_name = row.required_s(GROUP_NAME)?.to_string();
    let status = row
        .parsed(STATUS)?
        .unwrap_or(DeploymentStatus::Pending);
    let (created_at, updated_at) = Timestamps::of_row(row)?.resolve();
    Ok(DeviceDeploymentHistory {
        task_id,
        group_name,
        status,
        created_at,
        updated_at,
    })
}

/// Read a device from a row of unknown shape, as returned by the list
/// index or a batch get.
pub(super) fn device_from_listing(row: &RowReader<'_>) -> Option<Device> {
    let parsed = match DeviceRow::classify(sort_path(row).as_ref()) {
        DeviceRow::Device { thing_name } => device_from_row(thing_name, row),
        _ => {
            warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized device row");
            return None;
        }
    };
    parsed
        .map_err(|e| warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed device row"))
        .ok()
}

/// A device partition folded from its rows.
#[derive(Debug, Default)]
pub(super) struct DeviceAssembly {
    device: Option<Device>,
    history: BTreeMap<String, DeviceDeploymentHistory>,
}

impl DeviceAssembly {
    pub(super) fn from_rows(rows: &[Item]) -> Self {
        let mut assembly = Self::default();
        for item in rows {
            let row = RowReader::new(item);
            if let Err(e) = assembly.fold(&row) {
                warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed device row");
            }
        }
        assembly
    }

    fn fold(&mut self, row: &RowReader<'_>) -> Result<()> {
        match DeviceRow::classify(sort_path(row).as_ref()) {
            DeviceRow::Device { thing_name } => {
                self.device = Some(device_from_row(thing_name, row)?);
            }
            DeviceRow::History { task_id } => {
                let entry = history_from_row(task_id.clone(), row)?;
                self.history.insert(task_id, entry);
            }
            DeviceRow::Unrecognized => {
                warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized device row");
            }
        }
        Ok(())
    }

    pub(super) fn into_device(self) -> Option<Device> {
        self.device
    }

    /// History entries ordered by task id.
    pub(super) fn into_history(self) -> Vec<DeviceDeploymentHistory> {
        self.history.into_values().collect()
    }
}
