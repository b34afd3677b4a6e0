//! Template rows.
//!
//! Partition `T:{name}` holds:
//! - `T:{name}`: the current template, listed under `type:T` on the index
//! - `T:{name}:V:{version}`: one immutable row per saved version

use std::collections::BTreeMap;

use tracing::warn;

use crate::model::Template;
use crate::repository::sort_path;
use crate::storage::client::Item;
use crate::storage::keys::{encode, encode_prefix, KeyPath, Tag, DELIMITER};
use crate::storage::row::{attr, RowBuilder, RowReader, Timestamps};
use crate::storage::Result;

const VERSION: &str = "version";
const DESCRIPTION: &str = "description";
const DOCUMENT: &str = "document";

pub(super) fn template_key(name: &str) -> String {
    encode(Tag::Template, &[name.into()])
}

pub(super) fn version_key(name: &str, version: u32) -> String {
    encode(
        Tag::Template,
        &[name.into(), Tag::TemplateVersion.into(), version.into()],
    )
}

/// Sort-key prefix shared by every version row of a template.
pub(super) fn versions_prefix(name: &str) -> String {
    let mut prefix = encode_prefix(Tag::Template, &[name.into(), Tag::TemplateVersion.into()]);
    prefix.push(DELIMITER);
    prefix
}

/// Index partition listing every template.
pub(super) fn listing_key() -> String {
    encode(Tag::Type, &[Tag::Template.into()])
}

/// Sort-key shapes found in a template partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum TemplateRow {
    Current { name: String },
    Version { name: String, version: u32 },
    Unrecognized,
}

impl TemplateRow {
    pub(super) fn classify(path: Option<&KeyPath>) -> Self {
        let Some(path) = path else {
            return Self::Unrecognized;
        };
        match path.pairs() {
            [(Tag::Template, name)] => Self::Current { name: name.clone() },
            [(Tag::Template, name), (Tag::TemplateVersion, version)] => match version.parse() {
                Ok(version) => Self::Version {
                    name: name.clone(),
                    version,
                },
                Err(_) => Self::Unrecognized,
            },
            _ => Self::Unrecognized,
        }
    }
}

/// Explode a template into its current row and the row for its version.
pub(super) fn explode(template: &Template) -> Vec<Item> {
    let pk = template_key(&template.name);
    let current = RowBuilder::new(&pk, &pk).index(listing_key(), &pk);
    let version = RowBuilder::new(&pk, version_key(&template.name, template.version));
    vec![fill(current, template), fill(version, template)]
}

fn fill(row: RowBuilder, template: &Template) -> Item {
    row.n(VERSION, template.version)
        .opt_s(DESCRIPTION, template.description.as_deref())
        .opt_s(DOCUMENT, template.document.as_deref())
        .timestamp(attr::CREATED_AT, &template.created_at)
        .timestamp(attr::UPDATED_AT, &template.updated_at)
        .build()
}

/// Read a template from one current or version row.
pub(super) fn template_from_row(name: String, row: &RowReader<'_>) -> Result<Template> {
    let version = row.required_n(VERSION)?;
    let (created_at, updated_at) = Timestamps::of_row(row)?.resolve();
    Ok(Template {
        name,
        version,
        description: row.s(DESCRIPTION).map(str::to_string),
        document: row.s(DOCUMENT).map(str::to_string),
        created_at,
        updated_at,
    })
}

/// A template partition folded from its rows.
#[derive(Debug, Default)]
pub(super) struct TemplateAssembly {
    current: Option<Template>,
    versions: BTreeMap<u32, Template>,
    timestamps: Timestamps,
}

impl TemplateAssembly {
    pub(super) fn from_rows(rows: &[Item]) -> Self {
        let mut assembly = Self::default();
        for item in rows {
            let row = RowReader::new(item);
            if let Err(e) = assembly.fold(&row) {
                warn!(sk = row.sk().unwrap_or_default(), error = %e, "Skipping malformed template row");
            }
        }
        assembly
    }

    fn fold(&mut self, row: &RowReader<'_>) -> Result<()> {
        match TemplateRow::classify(sort_path(row).as_ref()) {
            TemplateRow::Current { name } => {
                let template = template_from_row(name, row)?;
                self.timestamps.merge(Timestamps::of_row(row)?);
                self.current = Some(template);
            }
            TemplateRow::Version { name, version } => {
                let mut template = template_from_row(name, row)?;
                template.version = version;
                self.timestamps.merge(Timestamps::of_row(row)?);
                self.versions.insert(version, template);
            }
            TemplateRow::Unrecognized => {
                warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized template row");
            }
        }
        Ok(())
    }

    /// The current template, dated from its first to its latest row.
    pub(super) fn into_current(self) -> Option<Template> {
        let template = self.current?;
        let (created_at, updated_at) = self.timestamps.resolve();
        Some(Template {
            created_at,
            updated_at,
            ..template
        })
    }

    /// Every version row, oldest version first.
    pub(super) fn into_versions(self) -> Vec<Template> {
        self.versions.into_values().collect()
    }
}
