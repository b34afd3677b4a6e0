//! Template repository.

mod rows;

use tracing::{debug, warn};

use crate::model::Template;
use crate::repository::{sort_path, Table};
use crate::storage::row::RowReader;
use crate::storage::{Page, PageRequest, Result};

use rows::{TemplateAssembly, TemplateRow};

/// Repository for versioned templates.
#[derive(Clone)]
pub struct TemplateRepository {
    table: Table,
}

impl TemplateRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// Current version of a template.
    ///
    /// Its `created_at` is the earliest across all of its rows, so it
    /// reflects when version 1 was saved.
    pub async fn get(&self, name: &str) -> Result<Option<Template>> {
        let items = self
            .table
            .query_all(self.table.partition(rows::template_key(name)))
            .await?;
        Ok(TemplateAssembly::from_rows(&items).into_current())
    }

    pub async fn get_version(&self, name: &str, version: u32) -> Result<Option<Template>> {
        let query = self
            .table
            .partition(rows::template_key(name))
            .sort_equals(rows::version_key(name, version));
        let items = self.table.query_all(query).await?;
        Ok(TemplateAssembly::from_rows(&items)
            .into_versions()
            .into_iter()
            .find(|template| template.version == version))
    }

    /// Every saved version, oldest first.
    pub async fn list_versions(&self, name: &str) -> Result<Vec<Template>> {
        let query = self
            .table
            .partition(rows::template_key(name))
            .sort_begins_with(rows::versions_prefix(name));
        let items = self.table.query_all(query).await?;
        Ok(TemplateAssembly::from_rows(&items).into_versions())
    }

    /// One page of current templates, ordered by name.
    pub async fn list(&self, page: &PageRequest) -> Result<Page<Template>> {
        let result = self
            .table
            .query_page(self.table.index(rows::listing_key()), page)
            .await?;

        let mut templates = Vec::with_capacity(result.items.len());
        for item in &result.items {
            let row = RowReader::new(item);
            let parsed = match TemplateRow::classify(sort_path(&row).as_ref()) {
                TemplateRow::Current { name } => rows::template_from_row(name, &row),
                _ => {
                    warn!(sk = row.sk().unwrap_or_default(), "Skipping unrecognized template listing row");
                    continue;
                }
            };
            match parsed {
                Ok(template) => templates.push(template),
                Err(e) => warn!(error = %e, "Skipping malformed template listing row"),
            }
        }

        Page::new(templates, result.last_evaluated_key.as_ref())
    }

    /// Save a template as its current row plus its version row.
    pub async fn save(&self, template: &Template) -> Result<()> {
        self.table.put_rows(rows::explode(template)).await?;
        debug!(name = %template.name, version = template.version, "Saved template");
        Ok(())
    }

    /// Delete a template and every one of its versions.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let items = self
            .table
            .query_all(self.table.partition(rows::template_key(name)))
            .await?;
        self.table.delete_rows(&items).await?;
        debug!(name, rows = items.len(), "Deleted template");
        Ok(())
    }
}
