//! Cloudsave Server Library
//!
//! Save-data synchronization engine with pluggable storage providers.
//! The HTTP server binary is in main.rs.
//!
//! # Modules
//!
//! - `sync`: conflict detection, resolution, merging and the sync manager
//! - `providers`: the `SyncProvider` contract and its local, SQLite and S3 stores
//! - `storage`: S3-compatible client used by the S3 provider
//! - `routes`, `state`: HTTP surface over the sync manager

pub mod config;
pub mod db;
pub mod error;
pub mod providers;
pub mod routes;
pub mod state;
pub mod storage;
pub mod sync;
