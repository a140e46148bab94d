//! Local persistence for fieldsync

mod connection;
mod local_store;
mod migrations;

pub use connection::Database;
pub use local_store::{LibSqlLocalStore, LocalStore, StorageKind};
