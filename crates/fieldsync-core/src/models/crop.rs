//! Field crop model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::{LocalId, OwnerId, RemoteId};
use crate::util::{normalize_text_option, now_millis};

/// Status recorded for a newly planted crop.
pub const DEFAULT_CROP_STATUS: &str = "active";

/// Input for recording a crop on a field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CropDraft {
    pub crop_name: String,
    pub variety: Option<String>,
    pub planting_date: Option<NaiveDate>,
    pub expected_harvest_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl CropDraft {
    pub fn named(crop_name: impl Into<String>) -> Self {
        Self {
            crop_name: crop_name.into(),
            ..Self::default()
        }
    }
}

/// A crop planted on a field
///
/// Crops captured offline reference their parent through `field_local_id`;
/// `field_id` is filled in once the parent field has a remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCrop {
    #[serde(default)]
    pub id: Option<RemoteId>,
    pub local_id: LocalId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub field_id: Option<RemoteId>,
    #[serde(default)]
    pub field_local_id: Option<LocalId>,
    pub crop_name: String,
    #[serde(default)]
    pub variety: Option<String>,
    #[serde(default)]
    pub planting_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_harvest_date: Option<NaiveDate>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_synced: bool,
    pub created_at: i64,
}

fn default_status() -> String {
    DEFAULT_CROP_STATUS.to_string()
}

impl FieldCrop {
    /// Build an unsynced crop for a field identified by its local and remote ids.
    pub fn from_draft(
        owner_id: OwnerId,
        field_local_id: Option<LocalId>,
        field_id: Option<RemoteId>,
        draft: CropDraft,
    ) -> Self {
        Self {
            id: None,
            local_id: LocalId::new(),
            owner_id,
            field_id,
            field_local_id,
            crop_name: normalize_text_option(Some(draft.crop_name))
                .unwrap_or_else(|| "Unknown crop".to_string()),
            variety: normalize_text_option(draft.variety),
            planting_date: draft.planting_date,
            expected_harvest_date: draft.expected_harvest_date,
            status: default_status(),
            notes: normalize_text_option(draft.notes),
            is_synced: false,
            created_at: now_millis(),
        }
    }

    /// Whether this crop belongs to the field named by either id.
    pub fn belongs_to(&self, field_local_id: &LocalId, field_id: Option<&RemoteId>) -> bool {
        self.field_local_id.as_ref() == Some(field_local_id)
            || matches!((self.field_id.as_ref(), field_id), (Some(a), Some(b)) if a == b)
    }
}
