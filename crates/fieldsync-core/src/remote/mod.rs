//! Remote store contract and implementations

mod memory;
mod rows;
mod supabase;

use std::fmt;

use thiserror::Error;

use crate::models::{AuditEvent, Farm, FarmId, Field, FieldCrop, NewFarm, OwnerId, RemoteId};

pub use memory::{MemoryRemoteStore, RemoteOp};
pub use supabase::SupabaseRemoteStore;

/// Broad cause of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// Unreachable host, connection reset, throttling
    Network,
    /// No answer within the configured bound
    Timeout,
    /// Payload rejected (4xx)
    Validation,
    /// Missing or expired credentials
    Auth,
    /// Backend failure (5xx)
    Server,
    /// Target row does not exist
    NotFound,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Validation => "validation",
            Self::Auth => "auth",
            Self::Server => "server",
            Self::NotFound => "not found",
        };
        f.write_str(label)
    }
}

/// Structured remote error; the original message is kept for logging
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Remote {kind} error: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub code: Option<String>,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    /// Only validation failures warrant a retry with a reduced payload.
    pub const fn is_validation(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::Validation)
    }

    /// The remote store will keep rejecting this request as-is.
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self.kind,
            RemoteErrorKind::Validation | RemoteErrorKind::NotFound
        )
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Which columns an insert carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertShape {
    /// Every domain column
    Full,
    /// Name, owner and farm only
    Minimal,
}

/// Trait for the system of record (async)
///
/// Rows are keyed by remote id and scoped by owner. Records returned by the
/// store are acknowledged: `is_synced` is set and `is_deleted` is clear.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Insert a field and return the persisted row
    async fn insert_field(&self, field: &Field, shape: InsertShape) -> RemoteResult<Field>;

    /// All fields owned by `owner`
    async fn list_fields(&self, owner: &OwnerId) -> RemoteResult<Vec<Field>>;

    /// A single field by remote id
    async fn get_field(&self, id: &RemoteId) -> RemoteResult<Option<Field>>;

    /// Replace a field's domain columns; fails with `NotFound` when the row is gone
    async fn update_field(&self, field: &Field) -> RemoteResult<Field>;

    /// Delete a field; succeeds when the row does not exist
    async fn delete_field(&self, id: &RemoteId) -> RemoteResult<()>;

    /// Farms owned by `owner`, oldest first
    async fn list_farms(&self, owner: &OwnerId) -> RemoteResult<Vec<Farm>>;

    /// A single farm by id
    async fn get_farm(&self, id: &FarmId) -> RemoteResult<Option<Farm>>;

    /// Create a farm
    async fn insert_farm(&self, farm: &NewFarm) -> RemoteResult<Farm>;

    /// Insert a crop; `crop.field_id` must be set
    async fn insert_crop(&self, crop: &FieldCrop) -> RemoteResult<FieldCrop>;

    /// Crops recorded on a field
    async fn list_crops(&self, field_id: &RemoteId) -> RemoteResult<Vec<FieldCrop>>;

    /// Append an audit event
    async fn record_audit(&self, event: &AuditEvent) -> RemoteResult<()>;

    /// Audit events recorded for `owner`
    async fn list_audit(&self, owner: &OwnerId) -> RemoteResult<Vec<AuditEvent>>;
}
