//! fieldsync-core - Core library for fieldsync
//!
//! This crate contains the field models, the local offline queue, the remote
//! store adapters and the synchronizer used by the fieldsync interfaces.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod state;
pub mod sync;
pub mod util;

pub use config::{RemoteConfig, SyncSettings};
pub use error::{Error, Result};
pub use models::{Field, FieldDetails, FieldDraft, LocalId, OwnerId, RemoteId};
pub use state::SyncState;
pub use sync::{FlushReport, FlushStatus, Synchronizer, WriteOutcome};
