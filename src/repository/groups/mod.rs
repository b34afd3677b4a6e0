//! Group repository.

mod rows;

use std::collections::BTreeSet;

use tracing::debug;

use crate::model::Group;
use crate::repository::Table;
use crate::storage::client::{primary_key, WriteRequest};
use crate::storage::row::RowReader;
use crate::storage::{Page, PageRequest, Result};

use rows::{GroupAssembly, StoredGroups};

/// Repository for device groups.
#[derive(Clone)]
pub struct GroupRepository {
    table: Table,
}

impl GroupRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// A group with its full template history.
    pub async fn get(&self, name: &str) -> Result<Option<Group>> {
        let items = self
            .table
            .query_all(self.table.partition(rows::group_key(name)))
            .await?;
        Ok(GroupAssembly::from_rows(&items).into_group())
    }

    /// Look a group up by its backend id.
    ///
    /// A mapping left behind by an earlier id of a re-saved group resolves
    /// to `None`.
    pub async fn get_by_id(&self, group_id: &str) -> Result<Option<Group>> {
        let items = self
            .table
            .query_all(self.table.partition(rows::group_id_key(group_id)))
            .await?;
        let Some(name) = rows::mapped_name(&items) else {
            return Ok(None);
        };

        Ok(self
            .get(&name)
            .await?
            .filter(|group| group.group_id == group_id))
    }

    /// Fetch current rows for many groups in batch, ordered by name.
    ///
    /// Unknown names are absent from the result. Template history is not
    /// loaded.
    pub async fn get_many<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Group>> {
        let names: BTreeSet<&str> = names.iter().map(AsRef::as_ref).collect();
        let keys = names
            .iter()
            .map(|name| {
                let key = rows::group_key(name);
                primary_key(key.clone(), key)
            })
            .collect();

        let items = self.table.get_rows(keys).await?;
        let mut groups: Vec<Group> = items
            .iter()
            .filter_map(|item| rows::group_from_listing(&RowReader::new(item)))
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    /// One page of the groups currently built from `template_name`.
    pub async fn list_by_template(
        &self,
        template_name: &str,
        page: &PageRequest,
    ) -> Result<Page<Group>> {
        let query = self
            .table
            .index(rows::template_listing_key(template_name));
        let result = self.table.query_page(query, page).await?;

        let groups = result
            .items
            .iter()
            .filter_map(|item| rows::group_from_listing(&RowReader::new(item)))
            .collect();
        Page::new(groups, result.last_evaluated_key.as_ref())
    }

    /// Save a group.
    ///
    /// Keeps the time its template version was first applied, and drops the
    /// id mapping row of an id the group no longer carries.
    pub async fn save(&self, group: &Group) -> Result<()> {
        self.write_groups(std::slice::from_ref(group)).await?;
        debug!(name = %group.name, group_id = %group.group_id, "Saved group");
        Ok(())
    }

    /// Save many groups through one batched read and one batched write.
    pub async fn save_many(&self, groups: &[Group]) -> Result<()> {
        self.write_groups(groups).await?;
        debug!(groups = groups.len(), "Saved groups");
        Ok(())
    }

    async fn write_groups(&self, groups: &[Group]) -> Result<()> {
        if groups.is_empty() {
            return Ok(());
        }

        let stored = StoredGroups::from_rows(&self.table.get_rows(rows::stored_keys(groups)).await?);

        let mut writes = Vec::new();
        for group in groups {
            let applied_since = stored.applied_since(group);
            writes.extend(
                rows::explode(group, &applied_since)
                    .into_iter()
                    .map(WriteRequest::Put),
            );
            if let Some(replaced) = stored.replaced_group_id(group) {
                debug!(name = %group.name, replaced, "Dropping replaced group id mapping");
                writes.push(WriteRequest::Delete(rows::mapping_key(replaced, &group.name)));
            }
        }
        self.table.write(writes).await
    }

    /// Delete a group's partition and its id mapping row.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let mut items = self
            .table
            .query_all(self.table.partition(rows::group_key(name)))
            .await?;

        let group_id = items
            .iter()
            .find_map(|item| RowReader::new(item).s(rows::GROUP_ID).map(str::to_string));
        if let Some(group_id) = &group_id {
            items.push(rows::mapping_key(group_id, name));
        }

        self.table.delete_rows(&items).await?;
        debug!(name, group_id = ?group_id, "Deleted group");
        Ok(())
    }
}
