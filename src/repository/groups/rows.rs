//! Group rows.
//!
//! Partition `G:{name}` holds:
//! - `G:{name}`: the current group, listed under `T:{template}` on the index
//! - `T:{template}:V:{version}`: one row per template version applied
//!
//! Partition `GI:{groupId}` holds a single `G:{name}` row mapping the
//! backend id back to the group name.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::model::{AppliedTemplate, Group};
use crate::repository::sort_path;
use crate::storage::client::{primary_key, Item, Key};
use crate::storage::keys::{encode, KeyPath, Tag};
use crate::storage::row::{attr, RowBuilder, RowReader, Timestamps};
use crate::storage::Result;

pub(super) const GROUP_ID: &str = "groupId";
const TEMPLATE_NAME: &str = "templateName";
const TEMPLATE_VERSION: &str = "templateVersion";
const ARN: &str = "arn";

pub(super) fn group_key(name: &str) -> String {
    encode(Tag::Group, &[name.into()])
}

pub(super) fn group_id_key(group_id: &str) -> String {
    encode(Tag::GroupId, &[group_id.into()])
}

fn applied_key(template_name: &str, version: u32) -> String {
    encode(
        Tag::Template,
        &[template_name.into(), Tag::TemplateVersion.into(), version.into()],
    )
}

/// Index partition listing the groups built from a template.
pub(super) fn template_listing_key(template_name: &str) -> String {
    encode(Tag::Template, &[template_name.into()])
}

/// Primary key of the id mapping row.
pub(super) fn mapping_key(group_id: &str, name: &str) -> Key {
    primary_key(group_id_key(group_id), group_key(name))
}

/// Sort-key shapes found in group and group-id partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum GroupRow {
    Current { name: String },
    AppliedTemplate { template_name: String, version: u32 },
    Unrecognized,
}

impl GroupRow {
    pub(super) fn classify(path: Option<&KeyPath>) -> Self {
        let Some(path) = path else {
            return Self::Unrecognized;
        };
        match path.pairs() {
            [(Tag::Group, name)] => Self::Current { name: name.clone() },
            [(Tag::Template, template_name), (Tag::TemplateVersion, version)] => {
                match version.parse() {
                    Ok(version) => Self::AppliedTemplate {
                        template_name: template_name.clone(),
                        version,
                    },
                    Err(_) => Self::Unrecognized,
                }
            }
            _ => Self::Unrecognized,
        }
    }
}

/// Explode a group into its current row, the row for the template version
/// it now carries, and its id mapping row.
///
/// `applied_since` is when that template version was first applied.
pub(super) fn explode(group: &Group, applied_since: &DateTime<Utc>) -> Vec<Item> {
    let pk = group_key(&group.name);

    let current = RowBuilder::new(&pk, &pk)
        .index(template_listing_key(&group.template_name), &pk)
        .s(GROUP_ID, &group.group_id)
        .s(TEMPLATE_NAME, &group.template_name)
        .n(TEMPLATE_VERSION, group.template_version)
        .opt_s(ARN, group.arn.as_deref())
        .timestamp(attr::CREATED_AT, &group.created_at)
        .timestamp(attr::UPDATED_AT, &group.updated_at)
        .build();

    let applied = RowBuilder::new(&pk, applied_key(&group.template_name, group.template_version))
        .timestamp(attr::CREATED_AT, applied_since)
        .timestamp(attr::UPDATED_AT, &group.updated_at)
        .build();

    let mapping = RowBuilder::new(group_id_key(&group.group_id), &pk)
        .timestamp(attr::CREATED_AT, &group.created_at)
        .build();

    vec![current, applied, mapping]
}

/// Keys of the stored rows a save has to see: each group's current row and
/// the row for the template version it carries.
pub(super) fn stored_keys(groups: &[Group]) -> Vec<Key> {
    let keys: BTreeSet<(String, String)> = groups
        .iter()
        .flat_map(|group| {
            let pk = group_key(&group.name);
            let applied = applied_key(&group.template_name, group.template_version);
            [(pk.clone(), pk.clone()), (pk, applied)]
        })
        .collect();
    keys.into_iter()
        .map(|(pk, sk)| primary_key(pk, sk))
        .collect()
}

/// State already stored for groups about to be saved.
#[derive(Debug, Default)]
pub(super) struct StoredGroups {
    group_ids: HashMap<String, String>,
    applied_since: HashMap<(String, String), DateTime<Utc>>,
}

impl StoredGroups {
    pub(super) fn from_rows(rows: &[Item]) -> Self {
        let mut stored = Self::default();
        for item in rows {
            let row = RowReader::new(item);
            let (Some(pk), Some(sk)) = (row.pk(), row.sk()) else {
                continue;
            };
            match GroupRow::classify(sort_path(&row).as_ref()) {
                GroupRow::Current { .. } => {
                    if let Some(group_id) = row.s(GROUP_ID) {
                        stored.group_ids.insert(pk.to_string(), group_id.to_string());
                    }
                }
                GroupRow::AppliedTemplate { .. } => match row.timestamp(attr::CREATED_AT) {
                    Ok(Some(created_at)) => {
                        stored
                            .applied_since
                            .insert((pk.to_string(), sk.to_string()), created_at);
                    }
                    Ok(None) => {}
                    Err(e) => warn!(sk, error = %e, "Ignoring malformed applied template row"),
                },
                GroupRow::Unrecognized => {}
            }
        }
        stored
    }

    /// When the group's current template version was first applied. A
    /// version not applied before starts at the group's update time.
    pub(super) fn applied_since(&self, group: &Group) -> DateTime<Utc> {
        let key = (
            group_key(&group.name),
            applied_key(&group.template_name, group.template_version),
        );
        self.applied_since
            .get(&key)
            .copied()
            .unwrap_or(group.updated_at)
    }

    /// The stored id of a group now saved under a different id.
    pub(super) fn replaced_group_id(&self, group: &Group) -> Option<&str> {
        self.group_ids
            .get(&group_key(&group.name))
            .map(String::as_str)
            .filter(|stored| *stored != group.group_id)
    }
}

/// Read a group from its current row. The template history stays empty.
pub(super) fn group_from_row(name: String, row: &RowReader<'_>) -> Result<Group> {
    let group_id = row.required_s(GROUP_ID)?.to_string();
    let template_name = row.required_s(TEMPLATE_NAME)?.to_string();
    let template_version = row.required_n(TEMPLATE_VERSION)?;
    let (created_at, updated_at) = Timestamps::of_row(row)?.resolve();
    Ok(Group {
        name,
        group_id,
        template_name,
        template_version,
        arn: row.s(ARN).map(str::to_string),
        template_history: Vec::new(),
        created_at,
        updated_at,
    })
}

/// Read a group from a current row of unknown shape, as returned by the
/// list index or a batch get.
pub(super) fn group_from_listing(row: &RowReader<'_>) -> Option<Group> {
    let parsed = match GroupRow::classify(sort_path(row).as_ref()) {
        GroupRow::Current { name } => group_from_row(name, row),
        _ => {
            warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized group row");
            return None;
        }
    };
    parsed
        .map_err(|e| warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed group row"))
        .ok()
}

/// A group partition folded from its rows.
#[derive(Debug, Default)]
pub(super) struct GroupAssembly {
    current: Option<Group>,
    history: BTreeMap<(String, u32), Timestamps>,
    timestamps: Timestamps,
}

impl GroupAssembly {
    pub(super) fn from_rows(rows: &[Item]) -> Self {
        let mut assembly = Self::default();
        for item in rows {
            let row = RowReader::new(item);
            if let Err(e) = assembly.fold(&row) {
                warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed group row");
            }
        }
        assembly
    }

    fn fold(&mut self, row: &RowReader<'_>) -> Result<()> {
        match GroupRow::classify(sort_path(row).as_ref()) {
            GroupRow::Current { name } => {
                let group = group_from_row(name, row)?;
                self.timestamps.merge(Timestamps::of_row(row)?);
                self.current = Some(group);
            }
            GroupRow::AppliedTemplate {
                template_name,
                version,
            } => {
                let timestamps = Timestamps::of_row(row)?;
                self.timestamps.merge(timestamps);
                self.history
                    .entry((template_name, version))
                    .or_default()
                    .merge(timestamps);
            }
            GroupRow::Unrecognized => {
                warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized group row");
            }
        }
        Ok(())
    }

    /// The group with its template history, or `None` without a current row.
    pub(super) fn into_group(self) -> Option<Group> {
        let group = self.current?;
        let (created_at, updated_at) = self.timestamps.resolve();
        let template_history = self
            .history
            .into_iter()
            .map(|((template_name, version), timestamps)| {
                let (created_at, updated_at) = timestamps.resolve();
                AppliedTemplate {
                    template_name,
                    version,
                    created_at,
                    updated_at,
                }
            })
            .collect();

        Some(Group {
            template_history,
            created_at,
            updated_at,
            ..group
        })
    }
}

/// Group name recorded in an id mapping partition.
pub(super) fn mapped_name(rows: &[Item]) -> Option<String> {
    rows.iter().find_map(|item| {
        match GroupRow::classify(sort_path(&RowReader::new(item)).as_ref()) {
            GroupRow::Current { name } => Some(name),
            _ => None,
        }
    })
}
