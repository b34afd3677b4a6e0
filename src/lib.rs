//! fleet-store - single-table persistence for IoT fleet provisioning
//!
//! Templates, device groups, devices and deployment tasks are stored as
//! rows in one partitioned key-value table. Repositories explode each
//! aggregate into rows on save and rebuild it from a partition query on
//! read, with batched, retried writes and reads underneath.

pub mod config;
pub mod model;
pub mod repository;
pub mod storage;
pub mod utils;
