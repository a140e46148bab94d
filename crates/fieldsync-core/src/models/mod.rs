//! Data models for fieldsync

mod audit;
mod crop;
mod farm;
mod field;
mod history;
mod ids;

pub use audit::{AuditEvent, AuditKind};
pub use crop::{CropDraft, FieldCrop, DEFAULT_CROP_STATUS};
pub use farm::{Farm, NewFarm, DEFAULT_FARM_NAME};
pub use field::{
    Boundary, BoundaryKind, Coordinate, Field, FieldDetails, FieldDraft, DEFAULT_FIELD_NAME,
    DEFAULT_SIZE_UNIT,
};
pub use history::{HistoryEntry, HistoryKind};
pub use ids::{FarmId, LocalId, OwnerId, RemoteId};
