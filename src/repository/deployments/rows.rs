//! Deployment task rows.
//!
//! Partition `DT:{taskId}` holds:
//! - `DT:{taskId}`: the task summary, listed under `type:DT` on the index
//! - `G:{group}`: one row per group deployment
//! - `G:{group}:D:{thing}`: one row per device deployment
//!
//! Saving a task also writes a `DT:{taskId}` history row into each targeted
//! device's partition.

use std::collections::BTreeMap;

use tracing::warn;

use crate::model::{DeploymentStatus, DeploymentTask, DeviceDeployment, GroupDeployment, TaskStatus};
use crate::repository::devices::rows::{device_key, history_key, history_row};
use crate::repository::sort_path;
use crate::storage::client::{primary_key, Item, Key};
use crate::storage::keys::{encode, encode_prefix, KeyPath, Tag};
use crate::storage::row::{attr, RowBuilder, RowReader, Timestamps};
use crate::storage::{Result, StorageError};

const TEMPLATE_NAME: &str = "templateName";
const TEMPLATE_VERSION: &str = "templateVersion";
const STATUS: &str = "status";
const STATUS_MESSAGE: &str = "statusMessage";
const DEPLOYMENT_ID: &str = "deploymentId";

pub(super) fn task_key(task_id: &str) -> String {
    encode(Tag::DeploymentTask, &[task_id.into()])
}

fn group_key(group_name: &str) -> String {
    encode(Tag::Group, &[group_name.into()])
}

fn device_deployment_key(group_name: &str, thing_name: &str) -> String {
    encode(
        Tag::Group,
        &[group_name.into(), Tag::Device.into(), thing_name.into()],
    )
}

/// Sort-key prefix covering a group deployment and its device rows.
///
/// Also matches groups whose name extends `group_name`.
pub(super) fn group_prefix(group_name: &str) -> String {
    encode_prefix(Tag::Group, &[group_name.into()])
}

/// Index partition listing every task.
pub(super) fn listing_key() -> String {
    encode(Tag::Type, &[Tag::DeploymentTask.into()])
}

/// Sort-key shapes found in a task partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TaskRow {
    Summary { task_id: String },
    Group { group_name: String },
    Device { group_name: String, thing_name: String },
    Unrecognized,
}

impl TaskRow {
    pub(super) fn classify(path: Option<&KeyPath>) -> Self {
        match path.map(KeyPath::pairs) {
            Some([(Tag::DeploymentTask, task_id)]) => Self::Summary {
                task_id: task_id.clone(),
            },
            Some([(Tag::Group, group_name)]) => Self::Group {
                group_name: group_name.clone(),
            },
            Some([(Tag::Group, group_name), (Tag::Device, thing_name)]) => Self::Device {
                group_name: group_name.clone(),
                thing_name: thing_name.clone(),
            },
            _ => Self::Unrecognized,
        }
    }
}

pub(super) fn summary_row(task: &DeploymentTask) -> Item {
    let pk = task_key(&task.task_id);
    RowBuilder::new(&pk, &pk)
        .index(listing_key(), &pk)
        .s(TEMPLATE_NAME, &task.template_name)
        .n(TEMPLATE_VERSION, task.template_version)
        .s(STATUS, task.status.as_str())
        .opt_s(STATUS_MESSAGE, task.status_message.as_deref())
        .timestamp(attr::CREATED_AT, &task.created_at)
        .timestamp(attr::UPDATED_AT, &task.updated_at)
        .build()
}

/// Explode a task into its summary, group and device rows, followed by the
/// history rows for each targeted device.
pub(super) fn explode(task: &DeploymentTask) -> Vec<Item> {
    let pk = task_key(&task.task_id);
    let mut items = vec![summary_row(task)];
    let mut history = Vec::new();

    for group in &task.groups {
        items.push(
            RowBuilder::new(&pk, group_key(&group.group_name))
                .opt_s(DEPLOYMENT_ID, group.deployment_id.as_deref())
                .s(STATUS, group.status.as_str())
                .timestamp(attr::CREATED_AT, &group.created_at)
                .timestamp(attr::UPDATED_AT, &group.updated_at)
                .build(),
        );

        for device in &group.devices {
            items.push(
                RowBuilder::new(&pk, device_deployment_key(&group.group_name, &device.thing_name))
                    .s(STATUS, device.status.as_str())
                    .timestamp(attr::CREATED_AT, &device.created_at)
                    .timestamp(attr::UPDATED_AT, &device.updated_at)
                    .build(),
            );
            history.push(history_row(
                &device.thing_name,
                &task.task_id,
                &group.group_name,
                device.status,
                &device.created_at,
                &device.updated_at,
            ));
        }
    }

    items.extend(history);
    items
}

/// Keys of the device history rows a task partition points at.
pub(super) fn history_keys(task_id: &str, items: &[Item]) -> Vec<Key> {
    items
        .iter()
        .filter_map(|item| match TaskRow::classify(sort_path(&RowReader::new(item)).as_ref()) {
            TaskRow::Device { thing_name, .. } => {
                Some(primary_key(device_key(&thing_name), history_key(task_id)))
            }
            _ => None,
        })
        .collect()
}

pub(super) fn summary_from_row(task_id: String, row: &RowReader<'_>) -> Result<DeploymentTask> {
    let template_name = row.required_s(TEMPLATE_NAME)?.to_string();
    let template_version = row.required_n(TEMPLATE_VERSION)?;
    let status: TaskStatus = row.parsed(STATUS)?.ok_or_else(|| StorageError::MissingAttribute {
        attribute: STATUS.to_string(),
        sk: row.sk().unwrap_or_default().to_string(),
    })?;
    let (created_at, updated_at) = Timestamps::of_row(row)?.resolve();
    Ok(DeploymentTask {
        task_id,
        template_name,
        template_version,
        status,
        status_message: row.s(STATUS_MESSAGE).map(str::to_string),
        groups: Vec::new(),
        created_at,
        updated_at,
    })
}

/// Read a task summary from a listing row of unknown shape.
pub(super) fn summary_from_listing(row: &RowReader<'_>) -> Option<DeploymentTask> {
    let parsed = match TaskRow::classify(sort_path(row).as_ref()) {
        TaskRow::Summary { task_id } => summary_from_row(task_id, row),
        _ => {
            warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized task listing row");
            return None;
        }
    };
    parsed
        .map_err(|e| warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed task row"))
        .ok()
}

#[derive(Debug, Default)]
struct DeviceDraft {
    status: Option<DeploymentStatus>,
    timestamps: Timestamps,
}

#[derive(Debug, Default)]
struct GroupDraft {
    deployment_id: Option<String>,
    status: Option<DeploymentStatus>,
    timestamps: Timestamps,
    devices: BTreeMap<String, DeviceDraft>,
}

impl GroupDraft {
    fn finish(self, group_name: String) -> GroupDeployment {
        let (created_at, updated_at) = self.timestamps.resolve();
        let devices = self
            .devices
            .into_iter()
            .map(|(thing_name, draft)| {
                let (created_at, updated_at) = draft.timestamps.resolve();
                DeviceDeployment {
                    thing_name,
                    status: draft.status.unwrap_or(DeploymentStatus::Pending),
                    created_at,
                    updated_at,
                }
            })
            .collect();

        GroupDeployment {
            group_name,
            deployment_id: self.deployment_id,
            status: self.status.unwrap_or(DeploymentStatus::Pending),
            devices,
            created_at,
            updated_at,
        }
    }
}

/// A task partition, or a slice of one, folded from its rows.
///
/// Group deployments are created on first sight from either their own row
/// or one of their device rows. A group's dates span its own row and all of
/// its device rows.
#[derive(Debug, Default)]
pub(super) struct TaskAssembly {
    summary: Option<DeploymentTask>,
    groups: BTreeMap<String, GroupDraft>,
}

impl TaskAssembly {
    pub(super) fn from_rows(rows: &[Item]) -> Self {
        let mut assembly = Self::default();
        for item in rows {
            let row = RowReader::new(item);
            if let Err(e) = assembly.fold(&row) {
                warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed task row");
            }
        }
        assembly
    }

    fn fold(&mut self, row: &RowReader<'_>) -> Result<()> {
        match TaskRow::classify(sort_path(row).as_ref()) {
            TaskRow::Summary { task_id } => {
                self.summary = Some(summary_from_row(task_id, row)?);
            }
            TaskRow::Group { group_name } => {
                let status: Option<DeploymentStatus> = row.parsed(STATUS)?;
                let timestamps = Timestamps::of_row(row)?;

                let group = self.groups.entry(group_name).or_default();
                if let Some(deployment_id) = row.s(DEPLOYMENT_ID) {
                    group.deployment_id = Some(deployment_id.to_string());
                }
                if status.is_some() {
                    group.status = status;
                }
                group.timestamps.merge(timestamps);
            }
            TaskRow::Device {
                group_name,
                thing_name,
            } => {
                let status: Option<DeploymentStatus> = row.parsed(STATUS)?;
                let timestamps = Timestamps::of_row(row)?;

                let group = self.groups.entry(group_name).or_default();
                group.timestamps.merge(timestamps);
                let device = group.devices.entry(thing_name).or_default();
                if status.is_some() {
                    device.status = status;
                }
                device.timestamps.merge(timestamps);
            }
            TaskRow::Unrecognized => {
                warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized task row");
            }
        }
        Ok(())
    }

    /// Group deployments ordered by group name.
    pub(super) fn into_groups(self) -> Vec<GroupDeployment> {
        self.groups
            .into_iter()
            .map(|(group_name, draft)| draft.finish(group_name))
            .collect()
    }

    /// The full task, or `None` without a summary row.
    pub(super) fn into_task(mut self) -> Option<DeploymentTask> {
        let summary = self.summary.take()?;
        Some(DeploymentTask {
            groups: self.into_groups(),
            ..summary
        })
    }
}
