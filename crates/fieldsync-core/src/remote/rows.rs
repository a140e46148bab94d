//! PostgREST row shapes for the Supabase tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    AuditEvent, AuditKind, Boundary, Farm, FarmId, Field, FieldCrop, FieldDetails, LocalId,
    NewFarm, OwnerId, RemoteId, DEFAULT_CROP_STATUS, DEFAULT_SIZE_UNIT,
};
use crate::util::now_millis;

fn to_timestamp(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

fn to_millis(value: Option<DateTime<Utc>>) -> i64 {
    value.map_or_else(now_millis, |value| value.timestamp_millis())
}

/// Row of the `fields` table
#[derive(Debug, Deserialize)]
pub struct FieldRow {
    id: String,
    user_id: String,
    #[serde(default)]
    farm_id: Option<String>,
    name: String,
    #[serde(default)]
    size: Option<f64>,
    #[serde(default)]
    size_unit: Option<String>,
    #[serde(default)]
    boundary: Option<Boundary>,
    #[serde(default)]
    location_description: Option<String>,
    #[serde(default)]
    soil_type: Option<String>,
    #[serde(default)]
    irrigation_type: Option<String>,
    #[serde(default)]
    is_shared: Option<bool>,
    #[serde(default)]
    shared_with: Option<Vec<String>>,
    #[serde(default)]
    offline_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
}

impl From<FieldRow> for Field {
    fn from(row: FieldRow) -> Self {
        // Rows inserted without an offline id correlate through their remote uuid.
        let local_id = row
            .offline_id
            .as_deref()
            .or(Some(row.id.as_str()))
            .and_then(|value| value.parse::<LocalId>().ok())
            .unwrap_or_default();

        Self {
            id: Some(RemoteId::new(row.id)),
            local_id,
            owner_id: OwnerId::new(row.user_id),
            farm_id: row.farm_id.map(FarmId::new),
            details: FieldDetails {
                name: row.name,
                size: row.size.unwrap_or_default(),
                size_unit: row
                    .size_unit
                    .unwrap_or_else(|| DEFAULT_SIZE_UNIT.to_string()),
                boundary: row.boundary,
                location_description: row.location_description,
                soil_type: row.soil_type,
                irrigation_type: row.irrigation_type,
                is_shared: row.is_shared.unwrap_or_default(),
                shared_with: row.shared_with.unwrap_or_default(),
            },
            is_synced: true,
            is_deleted: false,
            created_at: to_millis(row.created_at),
            updated_at: to_millis(row.updated_at),
        }
    }
}

/// Insert payload with the columns every backend version accepts
#[derive(Debug, Serialize)]
pub struct MinimalFieldInsert<'a> {
    name: &'a str,
    user_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    farm_id: Option<&'a str>,
}

impl<'a> MinimalFieldInsert<'a> {
    pub fn from_field(field: &'a Field) -> Self {
        Self {
            name: &field.details.name,
            user_id: field.owner_id.as_str(),
            farm_id: field.farm_id.as_ref().map(FarmId::as_str),
        }
    }
}

/// Insert payload with every domain column plus the offline correlation id
#[derive(Debug, Serialize)]
pub struct FullFieldInsert<'a> {
    #[serde(flatten)]
    minimal: MinimalFieldInsert<'a>,
    size: f64,
    size_unit: &'a str,
    boundary: Option<&'a Boundary>,
    location_description: Option<&'a str>,
    soil_type: Option<&'a str>,
    irrigation_type: Option<&'a str>,
    is_shared: bool,
    shared_with: &'a [String],
    offline_id: String,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl<'a> FullFieldInsert<'a> {
    pub fn from_field(field: &'a Field) -> Self {
        let details = &field.details;
        Self {
            minimal: MinimalFieldInsert::from_field(field),
            size: details.size,
            size_unit: &details.size_unit,
            boundary: details.boundary.as_ref(),
            location_description: details.location_description.as_deref(),
            soil_type: details.soil_type.as_deref(),
            irrigation_type: details.irrigation_type.as_deref(),
            is_shared: details.is_shared,
            shared_with: &details.shared_with,
            offline_id: field.local_id.as_str(),
            created_at: to_timestamp(field.created_at),
            updated_at: to_timestamp(field.updated_at),
        }
    }
}

/// Update payload; local-only bookkeeping columns are never sent
#[derive(Debug, Serialize)]
pub struct FieldPatch<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    farm_id: Option<&'a str>,
    name: &'a str,
    size: f64,
    size_unit: &'a str,
    boundary: Option<&'a Boundary>,
    location_description: Option<&'a str>,
    soil_type: Option<&'a str>,
    irrigation_type: Option<&'a str>,
    is_shared: bool,
    shared_with: &'a [String],
    updated_at: Option<DateTime<Utc>>,
}

impl<'a> FieldPatch<'a> {
    pub fn from_field(field: &'a Field) -> Self {
        let details = &field.details;
        Self {
            farm_id: field
                .farm_id
                .as_ref()
                .filter(|farm| !farm.is_local_placeholder())
                .map(FarmId::as_str),
            name: &details.name,
            size: details.size,
            size_unit: &details.size_unit,
            boundary: details.boundary.as_ref(),
            location_description: details.location_description.as_deref(),
            soil_type: details.soil_type.as_deref(),
            irrigation_type: details.irrigation_type.as_deref(),
            is_shared: details.is_shared,
            shared_with: &details.shared_with,
            updated_at: to_timestamp(field.updated_at),
        }
    }
}

/// Row of the `farms` table
#[derive(Debug, Deserialize)]
pub struct FarmRow {
    id: String,
    user_id: String,
    name: String,
    #[serde(default)]
    size_unit: Option<String>,
}

impl From<FarmRow> for Farm {
    fn from(row: FarmRow) -> Self {
        Self {
            id: FarmId::new(row.id),
            owner_id: OwnerId::new(row.user_id),
            name: row.name,
            size_unit: row.size_unit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FarmInsert<'a> {
    name: &'a str,
    user_id: &'a str,
    size_unit: Option<&'a str>,
}

impl<'a> FarmInsert<'a> {
    pub fn from_new(farm: &'a NewFarm) -> Self {
        Self {
            name: &farm.name,
            user_id: farm.owner_id.as_str(),
            size_unit: farm.size_unit.as_deref(),
        }
    }
}

/// Row of the `field_crops` table
#[derive(Debug, Deserialize)]
pub struct CropRow {
    id: String,
    field_id: String,
    #[serde(default)]
    user_id: Option<String>,
    crop_name: String,
    #[serde(default)]
    variety: Option<String>,
    #[serde(default)]
    planting_date: Option<NaiveDate>,
    #[serde(default)]
    expected_harvest_date: Option<NaiveDate>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<CropRow> for FieldCrop {
    fn from(row: CropRow) -> Self {
        Self {
            local_id: row.id.parse().unwrap_or_default(),
            id: Some(RemoteId::new(row.id)),
            owner_id: OwnerId::new(row.user_id.unwrap_or_default()),
            field_id: Some(RemoteId::new(row.field_id)),
            field_local_id: None,
            crop_name: row.crop_name,
            variety: row.variety,
            planting_date: row.planting_date,
            expected_harvest_date: row.expected_harvest_date,
            status: row
                .status
                .unwrap_or_else(|| DEFAULT_CROP_STATUS.to_string()),
            notes: row.notes,
            is_synced: true,
            created_at: to_millis(row.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CropInsert<'a> {
    field_id: &'a str,
    user_id: &'a str,
    crop_name: &'a str,
    variety: Option<&'a str>,
    planting_date: Option<NaiveDate>,
    expected_harvest_date: Option<NaiveDate>,
    status: &'a str,
    notes: Option<&'a str>,
}

impl<'a> CropInsert<'a> {
    /// `None` when the crop has no remote parent yet.
    pub fn from_crop(crop: &'a FieldCrop) -> Option<Self> {
        Some(Self {
            field_id: crop.field_id.as_ref()?.as_str(),
            user_id: crop.owner_id.as_str(),
            crop_name: &crop.crop_name,
            variety: crop.variety.as_deref(),
            planting_date: crop.planting_date,
            expected_harvest_date: crop.expected_harvest_date,
            status: &crop.status,
            notes: crop.notes.as_deref(),
        })
    }
}

/// Row of the `field_errors` table
#[derive(Debug, Serialize, Deserialize)]
pub struct FieldErrorRow {
    user_id: String,
    error_type: AuditKind,
    #[serde(default)]
    farm_id: Option<String>,
    #[serde(default)]
    details: serde_json::Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl From<&AuditEvent> for FieldErrorRow {
    fn from(event: &AuditEvent) -> Self {
        Self {
            user_id: event.owner_id.to_string(),
            error_type: event.kind,
            farm_id: event.farm_id.as_ref().map(ToString::to_string),
            details: event.details.clone(),
            created_at: to_timestamp(event.created_at),
        }
    }
}

impl From<FieldErrorRow> for AuditEvent {
    fn from(row: FieldErrorRow) -> Self {
        Self {
            owner_id: OwnerId::new(row.user_id),
            kind: row.error_type,
            farm_id: row.farm_id.map(FarmId::new),
            actual_owner_id: None,
            details: row.details,
            created_at: to_millis(row.created_at),
        }
    }
}

/// Row of the `ownership_mismatches` table
#[derive(Debug, Serialize, Deserialize)]
pub struct OwnershipMismatchRow {
    attempted_user: String,
    farm_id: String,
    owner_id: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl OwnershipMismatchRow {
    /// `None` unless the event carries both the farm and its actual owner.
    pub fn from_event(event: &AuditEvent) -> Option<Self> {
        Some(Self {
            attempted_user: event.owner_id.to_string(),
            farm_id: event.farm_id.as_ref()?.to_string(),
            owner_id: event.actual_owner_id.as_ref()?.to_string(),
            created_at: to_timestamp(event.created_at),
        })
    }
}

impl From<OwnershipMismatchRow> for AuditEvent {
    fn from(row: OwnershipMismatchRow) -> Self {
        Self {
            owner_id: OwnerId::new(row.attempted_user),
            kind: AuditKind::OwnershipMismatch,
            farm_id: Some(FarmId::new(row.farm_id)),
            actual_owner_id: Some(OwnerId::new(row.owner_id)),
            details: serde_json::Value::Null,
            created_at: to_millis(row.created_at),
        }
    }
}
