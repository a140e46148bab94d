//! In-process `RemoteStore` with failure injection, for tests and local experiments

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use super::{InsertShape, RemoteError, RemoteResult, RemoteStore};
use crate::models::{
    AuditEvent, Farm, FarmId, Field, FieldCrop, FieldDetails, LocalId, NewFarm, OwnerId, RemoteId,
};
use crate::util::now_millis;

/// Remote operations, used to inject failures and inspect calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    InsertField,
    ListFields,
    GetField,
    UpdateField,
    DeleteField,
    ListFarms,
    GetFarm,
    InsertFarm,
    InsertCrop,
    ListCrops,
    RecordAudit,
    ListAudit,
}

#[derive(Default)]
struct MemoryState {
    fields: Vec<Field>,
    farms: Vec<Farm>,
    crops: Vec<FieldCrop>,
    audit: Vec<AuditEvent>,
    calls: Vec<(RemoteOp, Option<String>)>,
    one_shot_failures: HashMap<RemoteOp, VecDeque<RemoteError>>,
    standing_failures: HashMap<RemoteOp, RemoteError>,
    rejected_names: HashSet<String>,
    reject_full_inserts: bool,
    latency: Option<Duration>,
}

/// Shared in-memory remote store; clones observe the same state
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryState>>,
}

fn new_remote_id() -> String {
    Uuid::new_v4().to_string()
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and apply injected failures; returns the latency to simulate.
    fn enter(&self, op: RemoteOp, target: Option<String>) -> RemoteResult<Option<Duration>> {
        let mut state = self.lock();
        state.calls.push((op, target));

        if let Some(error) = state
            .one_shot_failures
            .get_mut(&op)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }
        if let Some(error) = state.standing_failures.get(&op) {
            return Err(error.clone());
        }
        Ok(state.latency)
    }

    async fn begin(&self, op: RemoteOp, target: Option<String>) -> RemoteResult<()> {
        if let Some(latency) = self.enter(op, target)? {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: RemoteOp, error: RemoteError) {
        self.lock()
            .one_shot_failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `op` until cleared.
    pub fn fail_always(&self, op: RemoteOp, error: RemoteError) {
        self.lock().standing_failures.insert(op, error);
    }

    /// Fail every call of every operation, as if the backend were unreachable.
    pub fn go_unreachable(&self) {
        let ops = [
            RemoteOp::InsertField,
            RemoteOp::ListFields,
            RemoteOp::GetField,
            RemoteOp::UpdateField,
            RemoteOp::DeleteField,
            RemoteOp::ListFarms,
            RemoteOp::GetFarm,
            RemoteOp::InsertFarm,
            RemoteOp::InsertCrop,
            RemoteOp::ListCrops,
            RemoteOp::RecordAudit,
            RemoteOp::ListAudit,
        ];
        let mut state = self.lock();
        for op in ops {
            state
                .standing_failures
                .insert(op, RemoteError::network("connection refused"));
        }
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.one_shot_failures.clear();
        state.standing_failures.clear();
        state.rejected_names.clear();
        state.reject_full_inserts = false;
    }

    /// Reject inserts and updates of fields with this name as invalid.
    pub fn reject_field_name(&self, name: &str) {
        self.lock().rejected_names.insert(name.to_string());
    }

    /// Reject full-payload inserts, accepting only the minimal shape.
    pub fn reject_full_inserts(&self, reject: bool) {
        self.lock().reject_full_inserts = reject;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// Insert a farm directly.
    pub fn seed_farm(&self, owner: &OwnerId, name: &str) -> Farm {
        let farm = Farm {
            id: FarmId::new(new_remote_id()),
            owner_id: owner.clone(),
            name: name.to_string(),
            size_unit: None,
        };
        self.lock().farms.push(farm.clone());
        farm
    }

    /// Insert a field directly, bypassing validation.
    pub fn seed_field(&self, field: &Field) -> Field {
        let mut stored = field.clone();
        stored.id = Some(RemoteId::new(new_remote_id()));
        stored.is_synced = true;
        stored.is_deleted = false;
        self.lock().fields.push(stored.clone());
        stored
    }

    pub fn fields(&self) -> Vec<Field> {
        self.lock().fields.clone()
    }

    pub fn farms(&self) -> Vec<Farm> {
        self.lock().farms.clone()
    }

    pub fn crops(&self) -> Vec<FieldCrop> {
        self.lock().crops.clone()
    }

    pub fn audit_events(&self) -> Vec<AuditEvent> {
        self.lock().audit.clone()
    }

    /// Every call so far with its target id (remote id, or local id for inserts).
    pub fn calls(&self) -> Vec<(RemoteOp, Option<String>)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, op: RemoteOp) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(called, _)| *called == op)
            .count()
    }

    fn check_field(state: &MemoryState, field: &Field) -> RemoteResult<()> {
        if state.rejected_names.contains(&field.details.name) {
            return Err(RemoteError::validation(format!(
                "field \"{}\" rejected by check constraint",
                field.details.name
            ))
            .with_code("23514"));
        }
        if let Some(farm_id) = &field.farm_id {
            if !state.farms.iter().any(|farm| &farm.id == farm_id) {
                return Err(RemoteError::validation(format!(
                    "farm_id {farm_id} violates foreign key constraint"
                ))
                .with_code("23503"));
            }
        }
        Ok(())
    }
}

impl RemoteStore for MemoryRemoteStore {
    async fn insert_field(&self, field: &Field, shape: InsertShape) -> RemoteResult<Field> {
        self.begin(RemoteOp::InsertField, Some(field.local_id.as_str()))
            .await?;
        let mut state = self.lock();

        if shape == InsertShape::Full && state.reject_full_inserts {
            return Err(RemoteError::validation("column \"boundary\" has invalid geometry")
                .with_code("22P02"));
        }
        Self::check_field(&state, field)?;

        let remote_id = new_remote_id();
        let stored = match shape {
            InsertShape::Full => Field {
                id: Some(RemoteId::new(remote_id)),
                is_synced: true,
                is_deleted: false,
                ..field.clone()
            },
            InsertShape::Minimal => {
                let now = now_millis();
                Field {
                    local_id: remote_id.parse::<LocalId>().unwrap_or_default(),
                    id: Some(RemoteId::new(remote_id)),
                    owner_id: field.owner_id.clone(),
                    farm_id: field.farm_id.clone(),
                    details: FieldDetails::named(field.details.name.clone()),
                    is_synced: true,
                    is_deleted: false,
                    created_at: now,
                    updated_at: now,
                }
            }
        };
        state.fields.push(stored.clone());
        Ok(stored)
    }

    async fn list_fields(&self, owner: &OwnerId) -> RemoteResult<Vec<Field>> {
        self.begin(RemoteOp::ListFields, Some(owner.to_string()))
            .await?;
        Ok(self
            .lock()
            .fields
            .iter()
            .filter(|field| &field.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn get_field(&self, id: &RemoteId) -> RemoteResult<Option<Field>> {
        self.begin(RemoteOp::GetField, Some(id.to_string())).await?;
        Ok(self
            .lock()
            .fields
            .iter()
            .find(|field| field.id.as_ref() == Some(id))
            .cloned())
    }

    async fn update_field(&self, field: &Field) -> RemoteResult<Field> {
        let id = field
            .id
            .clone()
            .ok_or_else(|| RemoteError::validation("cannot update a field without a remote id"))?;
        self.begin(RemoteOp::UpdateField, Some(id.to_string()))
            .await?;
        let mut state = self.lock();

        if state.rejected_names.contains(&field.details.name) {
            return Err(RemoteError::validation(format!(
                "field \"{}\" rejected by check constraint",
                field.details.name
            )));
        }

        let stored = state
            .fields
            .iter_mut()
            .find(|stored| stored.id.as_ref() == Some(&id))
            .ok_or_else(|| RemoteError::not_found(format!("field {id} does not exist")))?;
        stored.details = field.details.clone();
        if let Some(farm_id) = field.farm_id.as_ref().filter(|farm| !farm.is_local_placeholder()) {
            stored.farm_id = Some(farm_id.clone());
        }
        stored.updated_at = field.updated_at;
        Ok(stored.clone())
    }

    async fn delete_field(&self, id: &RemoteId) -> RemoteResult<()> {
        self.begin(RemoteOp::DeleteField, Some(id.to_string()))
            .await?;
        let mut state = self.lock();
        state.fields.retain(|field| field.id.as_ref() != Some(id));
        state
            .crops
            .retain(|crop| crop.field_id.as_ref() != Some(id));
        Ok(())
    }

    async fn list_farms(&self, owner: &OwnerId) -> RemoteResult<Vec<Farm>> {
        self.begin(RemoteOp::ListFarms, Some(owner.to_string()))
            .await?;
        Ok(self
            .lock()
            .farms
            .iter()
            .filter(|farm| &farm.owner_id == owner)
            .cloned()
            .collect())
    }

    async fn get_farm(&self, id: &FarmId) -> RemoteResult<Option<Farm>> {
        self.begin(RemoteOp::GetFarm, Some(id.to_string())).await?;
        Ok(self.lock().farms.iter().find(|farm| &farm.id == id).cloned())
    }

    async fn insert_farm(&self, farm: &NewFarm) -> RemoteResult<Farm> {
        self.begin(RemoteOp::InsertFarm, Some(farm.owner_id.to_string()))
            .await?;
        let stored = Farm {
            id: FarmId::new(new_remote_id()),
            owner_id: farm.owner_id.clone(),
            name: farm.name.clone(),
            size_unit: farm.size_unit.clone(),
        };
        self.lock().farms.push(stored.clone());
        Ok(stored)
    }

    async fn insert_crop(&self, crop: &FieldCrop) -> RemoteResult<FieldCrop> {
        self.begin(RemoteOp::InsertCrop, Some(crop.local_id.as_str()))
            .await?;
        let mut state = self.lock();

        let field_id = crop
            .field_id
            .clone()
            .ok_or_else(|| RemoteError::validation("crop has no remote field id"))?;
        if !state
            .fields
            .iter()
            .any(|field| field.id.as_ref() == Some(&field_id))
        {
            return Err(RemoteError::validation(format!(
                "field_id {field_id} violates foreign key constraint"
            )));
        }

        let stored = FieldCrop {
            id: Some(RemoteId::new(new_remote_id())),
            is_synced: true,
            ..crop.clone()
        };
        state.crops.push(stored.clone());
        Ok(stored)
    }

    async fn list_crops(&self, field_id: &RemoteId) -> RemoteResult<Vec<FieldCrop>> {
        self.begin(RemoteOp::ListCrops, Some(field_id.to_string()))
            .await?;
        Ok(self
            .lock()
            .crops
            .iter()
            .filter(|crop| crop.field_id.as_ref() == Some(field_id))
            .cloned()
            .collect())
    }

    async fn record_audit(&self, event: &AuditEvent) -> RemoteResult<()> {
        self.begin(RemoteOp::RecordAudit, Some(event.owner_id.to_string()))
            .await?;
        self.lock().audit.push(event.clone());
        Ok(())
    }

    async fn list_audit(&self, owner: &OwnerId) -> RemoteResult<Vec<AuditEvent>> {
        self.begin(RemoteOp::ListAudit, Some(owner.to_string()))
            .await?;
        Ok(self
            .lock()
            .audit
            .iter()
            .filter(|event| &event.owner_id == owner)
            .cloned()
            .collect())
    }
}
