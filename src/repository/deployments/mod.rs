//! Deployment task repository.

mod rows;

use chrono::Utc;
use tracing::debug;

use crate::model::{DeploymentTask, GroupDeployment, TaskStatus};
use crate::repository::Table;
use crate::storage::row::RowReader;
use crate::storage::{Page, PageRequest, Result};

use rows::TaskAssembly;

/// Repository for deployment tasks.
#[derive(Clone)]
pub struct DeploymentTaskRepository {
    table: Table,
}

impl DeploymentTaskRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    /// A task with all of its group and device deployments.
    pub async fn get(&self, task_id: &str) -> Result<Option<DeploymentTask>> {
        let items = self
            .table
            .query_all(self.table.partition(rows::task_key(task_id)))
            .await?;
        Ok(TaskAssembly::from_rows(&items).into_task())
    }

    /// The task summary row alone; `groups` is empty.
    pub async fn get_summary(&self, task_id: &str) -> Result<Option<DeploymentTask>> {
        let key = rows::task_key(task_id);
        let query = self.table.partition(key.clone()).sort_equals(key);
        let items = self.table.query_all(query).await?;
        Ok(TaskAssembly::from_rows(&items).into_task())
    }

    /// One group's deployment within a task, with its devices.
    pub async fn get_group_deployment(
        &self,
        task_id: &str,
        group_name: &str,
    ) -> Result<Option<GroupDeployment>> {
        let query = self
            .table
            .partition(rows::task_key(task_id))
            .sort_begins_with(rows::group_prefix(group_name));
        let items = self.table.query_all(query).await?;

        Ok(TaskAssembly::from_rows(&items)
            .into_groups()
            .into_iter()
            .find(|group| group.group_name == group_name))
    }

    /// One page of task summaries, ordered by task id.
    pub async fn list(&self, page: &PageRequest) -> Result<Page<DeploymentTask>> {
        let result = self
            .table
            .query_page(self.table.index(rows::listing_key()), page)
            .await?;

        let tasks = result
            .items
            .iter()
            .filter_map(|item| rows::summary_from_listing(&RowReader::new(item)))
            .collect();
        Page::new(tasks, result.last_evaluated_key.as_ref())
    }

    /// Save a task with every deployment row and device history row.
    pub async fn save(&self, task: &DeploymentTask) -> Result<()> {
        let items = rows::explode(task);
        let count = items.len();
        self.table.put_rows(items).await?;
        debug!(task_id = %task.task_id, rows = count, "Saved deployment task");
        Ok(())
    }

    /// Rewrite only the summary row with a new status.
    ///
    /// This is the write workflows use to claim a task. It is a plain
    /// overwrite; two callers racing on the same task both succeed.
    /// Returns the updated summary, or `None` if the task does not exist.
    pub async fn save_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        message: Option<&str>,
    ) -> Result<Option<DeploymentTask>> {
        let Some(mut task) = self.get_summary(task_id).await? else {
            return Ok(None);
        };

        task.status = status;
        task.status_message = message.map(str::to_string);
        task.updated_at = Utc::now();

        self.table.put_row(rows::summary_row(&task)).await?;
        debug!(task_id, status = %status, "Saved deployment task status");
        Ok(Some(task))
    }

    /// Delete a task partition and the device history rows it wrote.
    pub async fn delete(&self, task_id: &str) -> Result<()> {
        let items = self
            .table
            .query_all(self.table.partition(rows::task_key(task_id)))
            .await?;
        let history = rows::history_keys(task_id, &items);

        self.table.delete_rows(items.iter().chain(&history)).await?;
        debug!(
            task_id,
            rows = items.len(),
            history = history.len(),
            "Deleted deployment task"
        );
        Ok(())
    }
}
