//! Local sync journal

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::LocalId;
use crate::util::now_millis;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Confirmed by the remote store on first write
    Created,
    /// Remote update confirmed
    Updated,
    /// Remote delete confirmed
    Deleted,
    /// Stored locally pending sync
    Queued,
    /// Queued change replayed during a flush
    Synced,
    /// Purged locally without contacting the remote store
    Removed,
    /// Remote copy was newer than the queued change (last writer wins)
    Conflict,
    /// Queued change abandoned after a permanent rejection
    Dropped,
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Queued => "queued",
            Self::Synced => "synced",
            Self::Removed => "removed",
            Self::Conflict => "conflict",
            Self::Dropped => "dropped",
        };
        f.pad(label)
    }
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Unix ms
    pub at: i64,
    #[serde(default)]
    pub local_id: Option<LocalId>,
    pub kind: HistoryKind,
    #[serde(default)]
    pub detail: Option<String>,
}

impl HistoryEntry {
    pub fn new(kind: HistoryKind, local_id: Option<LocalId>, detail: Option<String>) -> Self {
        Self {
            at: now_millis(),
            local_id,
            kind,
            detail,
        }
    }
}
