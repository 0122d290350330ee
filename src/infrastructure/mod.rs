pub mod config;
pub mod csv_export;
pub mod error;
pub mod kv_store;
pub mod planner_repository;
pub mod storage;
