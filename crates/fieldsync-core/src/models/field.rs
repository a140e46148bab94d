//! Field model

use serde::{Deserialize, Serialize};

use super::ids::{FarmId, LocalId, OwnerId, RemoteId};
use crate::util::{normalize_text_option, now_millis};

/// Name used when a field is created without one.
pub const DEFAULT_FIELD_NAME: &str = "Untitled Field";
/// Area unit used when none is given.
pub const DEFAULT_SIZE_UNIT: &str = "hectares";

/// A point of a field boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    fn is_valid(self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Shape of a boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryKind {
    #[default]
    Polygon,
}

/// Field boundary drawn by the farmer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    #[serde(rename = "type", default)]
    pub kind: BoundaryKind,
    pub coordinates: Vec<Coordinate>,
}

impl Boundary {
    pub fn polygon(coordinates: Vec<Coordinate>) -> Self {
        Self {
            kind: BoundaryKind::Polygon,
            coordinates,
        }
    }

    /// A usable polygon has at least three valid points.
    pub fn is_valid(&self) -> bool {
        self.coordinates.len() >= 3 && self.coordinates.iter().all(|point| point.is_valid())
    }
}

/// Domain payload of a field, passed through the synchronizer untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDetails {
    pub name: String,
    #[serde(default)]
    pub size: f64,
    #[serde(default = "default_size_unit")]
    pub size_unit: String,
    #[serde(default)]
    pub boundary: Option<Boundary>,
    #[serde(default)]
    pub location_description: Option<String>,
    #[serde(default)]
    pub soil_type: Option<String>,
    #[serde(default)]
    pub irrigation_type: Option<String>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub shared_with: Vec<String>,
}

fn default_size_unit() -> String {
    DEFAULT_SIZE_UNIT.to_string()
}

impl Default for FieldDetails {
    fn default() -> Self {
        Self {
            name: DEFAULT_FIELD_NAME.to_string(),
            size: 0.0,
            size_unit: default_size_unit(),
            boundary: None,
            location_description: None,
            soil_type: None,
            irrigation_type: None,
            is_shared: false,
            shared_with: Vec::new(),
        }
    }
}

impl FieldDetails {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Normalize user input: trim text, apply defaults and drop unusable geometry.
    #[must_use]
    pub fn sanitized(self) -> Self {
        let name = normalize_text_option(Some(self.name))
            .unwrap_or_else(|| DEFAULT_FIELD_NAME.to_string());
        let size = if self.size.is_finite() && self.size > 0.0 {
            self.size
        } else {
            0.0
        };
        let size_unit = normalize_text_option(Some(self.size_unit)).unwrap_or_else(default_size_unit);
        let boundary = self.boundary.filter(Boundary::is_valid);

        let mut shared_with: Vec<String> = Vec::with_capacity(self.shared_with.len());
        for user in self.shared_with {
            if let Some(user) = normalize_text_option(Some(user)) {
                if !shared_with.contains(&user) {
                    shared_with.push(user);
                }
            }
        }

        Self {
            name,
            size,
            size_unit,
            boundary,
            location_description: normalize_text_option(self.location_description),
            soil_type: normalize_text_option(self.soil_type),
            irrigation_type: normalize_text_option(self.irrigation_type),
            is_shared: self.is_shared || !shared_with.is_empty(),
            shared_with,
        }
    }
}

/// Input for creating a field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDraft {
    pub owner_id: OwnerId,
    pub farm_id: Option<FarmId>,
    pub details: FieldDetails,
}

impl FieldDraft {
    pub fn new(owner_id: OwnerId, details: FieldDetails) -> Self {
        Self {
            owner_id,
            farm_id: None,
            details,
        }
    }

    #[must_use]
    pub fn with_farm(mut self, farm_id: FarmId) -> Self {
        self.farm_id = Some(farm_id);
        self
    }

    /// Sanitize the payload and mint the local record with a fresh `local_id`.
    pub fn into_field(self) -> Field {
        let now = now_millis();
        Field {
            id: None,
            local_id: LocalId::new(),
            owner_id: self.owner_id,
            farm_id: self.farm_id,
            details: self.details.sanitized(),
            is_synced: false,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A farm field, the record kept in sync between the device and the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Remote identifier, absent until the remote store acknowledged an insert
    #[serde(default)]
    pub id: Option<RemoteId>,
    /// Client identifier, immutable for the record's lifetime
    pub local_id: LocalId,
    /// Owning user
    pub owner_id: OwnerId,
    /// Parent farm, possibly a local placeholder
    #[serde(default)]
    pub farm_id: Option<FarmId>,
    #[serde(flatten)]
    pub details: FieldDetails,
    /// Remote store acknowledged this version
    #[serde(default)]
    pub is_synced: bool,
    /// Tombstone awaiting remote delete confirmation
    #[serde(default)]
    pub is_deleted: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation (Unix ms)
    pub updated_at: i64,
}

impl Field {
    /// Tombstone for a remote record that has no local copy.
    pub fn tombstone(owner_id: OwnerId, id: RemoteId) -> Self {
        let now = now_millis();
        Self {
            id: Some(id),
            local_id: LocalId::new(),
            owner_id,
            farm_id: None,
            details: FieldDetails::default(),
            is_synced: false,
            is_deleted: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `reference` names this record by remote id or local id.
    pub fn matches_ref(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.id.as_ref().is_some_and(|id| id.as_str() == reference)
            || self.local_id.as_str() == reference
    }

    /// Whether this record shares an identity with `other`.
    pub fn same_record(&self, other: &Self) -> bool {
        self.local_id == other.local_id
            || matches!((&self.id, &other.id), (Some(a), Some(b)) if a == b)
    }

    /// Never acknowledged by the remote store.
    pub const fn is_local_only(&self) -> bool {
        self.id.is_none()
    }

    /// Mark this record as a pending delete.
    pub fn mark_deleted(&mut self) {
        self.is_deleted = true;
        self.is_synced = false;
        self.updated_at = now_millis();
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }
}
