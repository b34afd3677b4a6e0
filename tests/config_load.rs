//! Configuration loading from files and environment.

use std::io::Write;

use serial_test::serial;

use fleet_store::config::{Config, ConfigError, StorageType, CONFIG_ENV_VAR};
use fleet_store::storage::init_storage;

const TABLE_ENV: &str = "FLEET_STORE__STORAGE__DYNAMO__TABLE_NAME";

fn write_config(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_from_explicit_path() {
    let file = write_config(
        r#"
storage:
  type: memory
  dynamo:
    table_name: fleet-dev
  batch:
    max_write_items: 5
"#,
    );

    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();

    assert_eq!(config.storage.storage_type, StorageType::Memory);
    assert_eq!(config.storage.dynamo.table_name, "fleet-dev");
    assert_eq!(config.storage.batch.limits().max_write_items, 5);
    assert_eq!(config.storage.batch.limits().max_attempts, 3);
}

#[test]
#[serial]
fn test_env_overrides_file() {
    let file = write_config("storage:\n  type: memory\n  dynamo:\n    table_name: from-file\n");
    std::env::set_var(CONFIG_ENV_VAR, file.path());
    std::env::set_var(TABLE_ENV, "from-env");

    let config = Config::load(None);

    std::env::remove_var(CONFIG_ENV_VAR);
    std::env::remove_var(TABLE_ENV);

    assert_eq!(config.unwrap().storage.dynamo.table_name, "from-env");
}

#[test]
#[serial]
fn test_load_rejects_oversized_batch() {
    let file = write_config("storage:\n  batch:\n    max_get_keys: 500\n");

    let result = Config::load(Some(file.path().to_str().unwrap()));

    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[tokio::test]
#[serial]
async fn test_storage_from_loaded_config() {
    let file = write_config("storage:\n  type: memory\n  batch:\n    max_write_items: 2\n");
    let config = Config::load(Some(file.path().to_str().unwrap())).unwrap();

    let executor = init_storage(&config.storage).await.unwrap();

    assert_eq!(executor.limits().max_write_items, 2);
}
