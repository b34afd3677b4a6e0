//! Device repository.

pub(super) mod rows;

use std::collections::BTreeSet;

use tracing::debug;

use crate::model::{Device, DeviceDeploymentHistory};
use crate::repository::Table;
use crate::storage::client::{primary_key, Item};
use crate::storage::keys::{has_prefix, Tag};
use crate::storage::row::RowReader;
use crate::storage::{Page, PageRequest, Result};

use rows::DeviceAssembly;

/// Repository for provisioned devices.
#[derive(Clone)]
pub struct DeviceRepository {
    table: Table,
}

impl DeviceRepository {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub async fn get(&self, thing_name: &str) -> Result<Option<Device>> {
        let key = rows::device_key(thing_name);
        let query = self.table.partition(key.clone()).sort_equals(key);
        let items = self.table.query_all(query).await?;
        Ok(DeviceAssembly::from_rows(&items).into_device())
    }

    /// Fetch many devices in batch, ordered by thing name.
    ///
    /// Unknown things are absent from the result. Keys the store leaves
    /// unprocessed after retries fail the call with `FetchFailed`.
    pub async fn get_many<S: AsRef<str>>(&self, thing_names: &[S]) -> Result<Vec<Device>> {
        let names: BTreeSet<&str> = thing_names.iter().map(AsRef::as_ref).collect();
        let keys = names
            .iter()
            .map(|name| {
                let key = rows::device_key(name);
                primary_key(key.clone(), key)
            })
            .collect();

        let items = self.table.get_rows(keys).await?;
        let mut devices: Vec<Device> = items
            .iter()
            .filter_map(|item| rows::device_from_listing(&RowReader::new(item)))
            .collect();
        devices.sort_by(|a, b| a.thing_name.cmp(&b.thing_name));
        Ok(devices)
    }

    /// One page of the devices in a group, ordered by thing name.
    pub async fn list_by_group(&self, group_name: &str, page: &PageRequest) -> Result<Page<Device>> {
        let query = self
            .table
            .index(rows::group_listing_key(group_name))
            .sort_begins_with(rows::device_prefix());
        let result = self.table.query_page(query, page).await?;

        let devices = result
            .items
            .iter()
            .map(RowReader::new)
            .filter(|row| row.sk().is_some_and(|sk| has_prefix(sk, Tag::Device)))
            .filter_map(|row| rows::device_from_listing(&row))
            .collect();
        Page::new(devices, result.last_evaluated_key.as_ref())
    }

    pub async fn save(&self, device: &Device) -> Result<()> {
        self.save_many(std::slice::from_ref(device)).await
    }

    /// Save many devices through one batched write.
    pub async fn save_many(&self, devices: &[Device]) -> Result<()> {
        let items: Vec<Item> = devices.iter().map(rows::explode).collect();
        self.table.put_rows(items).await?;
        debug!(devices = devices.len(), "Saved devices");
        Ok(())
    }

    /// Deployment tasks that targeted a device, ordered by task id.
    pub async fn list_deployment_history(
        &self,
        thing_name: &str,
    ) -> Result<Vec<DeviceDeploymentHistory>> {
        let query = self
            .table
            .partition(rows::device_key(thing_name))
            .sort_begins_with(rows::history_prefix());
        let items = self.table.query_all(query).await?;
        Ok(DeviceAssembly::from_rows(&items).into_history())
    }

    /// Delete a device and its deployment history.
    pub async fn delete(&self, thing_name: &str) -> Result<()> {
        let items = self
            .table
            .query_all(self.table.partition(rows::device_key(thing_name)))
            .await?;
        self.table.delete_rows(&items).await?;
        debug!(thing_name, rows = items.len(), "Deleted device");
        Ok(())
    }
}
