//! Audit events recorded remotely for later review

use serde::{Deserialize, Serialize};

use super::ids::{FarmId, OwnerId};
use crate::util::now_millis;

/// Kind of audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A field's farm reference was redirected to a farm the owner holds
    FarmCorrection,
    /// A default farm was provisioned for the owner
    FarmAutocreation,
    /// The remote store rejected a field insert
    InsertError,
    /// A write referenced a farm owned by someone else
    OwnershipMismatch,
}

impl AuditKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FarmCorrection => "farm_correction",
            Self::FarmAutocreation => "farm_autocreation",
            Self::InsertError => "insert_error",
            Self::OwnershipMismatch => "ownership_mismatch",
        }
    }
}

/// An audit record. Never enforced, only logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub owner_id: OwnerId,
    pub kind: AuditKind,
    #[serde(default)]
    pub farm_id: Option<FarmId>,
    /// Farm owner seen during an ownership mismatch
    #[serde(default)]
    pub actual_owner_id: Option<OwnerId>,
    #[serde(default)]
    pub details: serde_json::Value,
    pub created_at: i64,
}

impl AuditEvent {
    pub fn new(owner_id: OwnerId, kind: AuditKind, details: serde_json::Value) -> Self {
        Self {
            owner_id,
            kind,
            farm_id: None,
            actual_owner_id: None,
            details,
            created_at: now_millis(),
        }
    }

    /// A write by `attempted` referenced `farm_id`, which belongs to `actual`.
    pub fn ownership_mismatch(attempted: OwnerId, farm_id: FarmId, actual: OwnerId) -> Self {
        Self {
            farm_id: Some(farm_id),
            actual_owner_id: Some(actual),
            ..Self::new(attempted, AuditKind::OwnershipMismatch, serde_json::Value::Null)
        }
    }

    #[must_use]
    pub fn with_farm(mut self, farm_id: FarmId) -> Self {
        self.farm_id = Some(farm_id);
        self
    }
}
