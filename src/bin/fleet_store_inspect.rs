//! fleet-store-inspect: read-only view of the fleet table
//!
//! Prints one aggregate, or a page of a listing, as JSON.
//!
//! ## Usage
//! ```text
//! fleet-store-inspect template <name>
//! fleet-store-inspect templates [count] [token]
//! fleet-store-inspect group <name>
//! fleet-store-inspect device <thing>
//! fleet-store-inspect history <thing>
//! fleet-store-inspect task <task-id>
//! fleet-store-inspect tasks [count] [token]
//! ```
//!
//! ## Configuration
//! - FLEET_STORE_CONFIG: path to a YAML config file (optional)
//! - FLEET_STORE__STORAGE__DYNAMO__TABLE_NAME etc.: per-field overrides
//! - FLEET_STORE_LOG: tracing filter (default: info)

use serde::Serialize;
use tracing::info;

use fleet_store::config::Config;
use fleet_store::repository::Repositories;
use fleet_store::storage::{init_storage, PageRequest};
use fleet_store::utils::bootstrap::init_tracing;

const USAGE: &str = "usage: fleet-store-inspect <template|templates|group|device|history|task|tasks> [args]";

fn print<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn page_request(args: &[String]) -> Result<PageRequest, Box<dyn std::error::Error>> {
    Ok(PageRequest {
        count: args.first().map(|c| c.parse()).transpose()?,
        next_token: args.get(1).cloned(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, rest) = args.split_first().ok_or(USAGE)?;
    let target = || rest.first().map(String::as_str).ok_or(USAGE);

    let config = Config::load(None)?;
    let executor = init_storage(&config.storage).await?;
    let repos = Repositories::new(executor, config.storage.dynamo.table_name.clone());

    info!(command = %command, table = %config.storage.dynamo.table_name, "fleet-store-inspect");

    match command.as_str() {
        "template" => print(&repos.templates.get(target()?).await?),
        "templates" => print(&repos.templates.list(&page_request(rest)?).await?),
        "group" => print(&repos.groups.get(target()?).await?),
        "device" => print(&repos.devices.get(target()?).await?),
        "history" => print(&repos.devices.list_deployment_history(target()?).await?),
        "task" => print(&repos.deployments.get(target()?).await?),
        "tasks" => print(&repos.deployments.list(&page_request(rest)?).await?),
        _ => Err(USAGE.into()),
    }
}
