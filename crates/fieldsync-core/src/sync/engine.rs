//! The offline-first field synchronizer

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{watch, Mutex};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::notify::{Notice, Notifier};
use super::outcome::WriteOutcome;
use super::ownership::{bounded, OwnershipResolver};
use super::queue::OfflineQueue;
use crate::config::SyncSettings;
use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{
    AuditEvent, AuditKind, CropDraft, Farm, FarmId, Field, FieldCrop, FieldDraft, HistoryEntry,
    HistoryKind, LocalId, OwnerId, RemoteId,
};
use crate::remote::{InsertShape, RemoteError, RemoteResult, RemoteStore};
use crate::state::SyncState;
use crate::util::{compact_text, normalize_text_option, now_millis};

pub(super) const OFFLINE: &str = "offline";

/// Keeps one owner's fields usable offline and reconciles them with the remote store.
///
/// Reads return owned snapshots. Every read-modify-write of the local queue
/// runs under one async lock, and at most one flush per owner is in flight.
pub struct Synchronizer<R, L> {
    pub(super) remote: R,
    pub(super) queue: OfflineQueue<L>,
    pub(super) connectivity: watch::Receiver<bool>,
    pub(super) notifier: Arc<dyn Notifier + Send + Sync>,
    pub(super) settings: SyncSettings,
    pub(super) queue_lock: Mutex<()>,
    pub(super) in_flight: StdMutex<HashSet<OwnerId>>,
    pub(super) state: StdMutex<SyncState>,
}

impl<R: RemoteStore, L: LocalStore> Synchronizer<R, L> {
    pub fn new(
        remote: R,
        store: L,
        connectivity: watch::Receiver<bool>,
        notifier: Arc<dyn Notifier + Send + Sync>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            remote,
            queue: OfflineQueue::new(store, settings.history_limit),
            connectivity,
            notifier,
            settings,
            queue_lock: Mutex::new(()),
            in_flight: StdMutex::new(HashSet::new()),
            state: StdMutex::new(SyncState::Synced),
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    /// Indicator state; always `Offline` while the connectivity signal says so.
    pub fn state(&self) -> SyncState {
        if self.is_online() {
            *self.state.lock().unwrap_or_else(PoisonError::into_inner)
        } else {
            SyncState::Offline
        }
    }

    pub(super) fn set_state(&self, state: SyncState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub(super) const fn resolver(&self) -> OwnershipResolver<'_, R, L> {
        OwnershipResolver::new(&self.remote, &self.queue, self.settings.request_timeout)
    }

    pub(super) async fn call<T>(&self, call: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        bounded(self.settings.request_timeout, call).await
    }

    pub(super) fn notify(&self, notice: Notice) {
        self.notifier.notify(notice);
    }

    pub(super) async fn journal(&self, owner: &OwnerId, entry: HistoryEntry) {
        if let Err(error) = self.queue.record_history(owner, vec![entry]).await {
            warn!("Failed to record history: {error}");
        }
    }

    pub(super) async fn local_fields(&self, owner: &OwnerId) -> Vec<Field> {
        self.queue.load(owner).await.unwrap_or_else(|error| {
            warn!("Failed to read local fields: {error}");
            Vec::new()
        })
    }

    /// Create a field. Always keeps the record, remotely or in the offline queue.
    pub async fn create(&self, draft: FieldDraft) -> WriteOutcome<Field> {
        let mut field = draft.into_field();
        let owner = field.owner_id.clone();
        self.journal(
            &owner,
            HistoryEntry::new(
                HistoryKind::Created,
                Some(field.local_id),
                Some(field.name().to_string()),
            ),
        )
        .await;

        if !self.is_online() {
            return self.enqueue_field(field, OFFLINE.to_string()).await;
        }

        field.farm_id = self
            .resolver()
            .resolve(&owner, field.farm_id.as_ref())
            .await
            .into_farm_id();

        match self.insert_remote(&field).await {
            Ok(stored) => {
                debug!(local_id = %stored.local_id, "Field created remotely");
                self.mirror(&stored, true).await;
                self.journal(
                    &owner,
                    HistoryEntry::new(HistoryKind::Synced, Some(stored.local_id), None),
                )
                .await;
                self.notify(
                    Notice::success("Field saved")
                        .with_description(format!("\"{}\" has been saved", stored.name())),
                );
                WriteOutcome::Synced(stored)
            }
            Err(error) => {
                warn!(local_id = %field.local_id, "Remote insert failed, queueing: {error}");
                self.audit_insert_error(&field, &error).await;
                self.enqueue_field(field, error.to_string()).await
            }
        }
    }

    /// Remote fields plus pending local ones. Falls back to the local copy when the remote is unavailable.
    pub async fn list(&self, owner: &OwnerId) -> Vec<Field> {
        let local = self.local_fields(owner).await;

        if self.is_online() {
            match self.call(self.remote.list_fields(owner)).await {
                Ok(remote) => return merge_fields(remote, &local),
                Err(error) => warn!("Listing remote fields failed, using local copy: {error}"),
            }
        }

        local.into_iter().filter(|field| !field.is_deleted).collect()
    }

    /// One field by remote id or local id.
    pub async fn get(&self, owner: &OwnerId, reference: &str) -> Result<Field> {
        let reference = reference.trim();
        let local = self
            .local_fields(owner)
            .await
            .into_iter()
            .find(|field| field.matches_ref(reference));

        if local.as_ref().is_some_and(|field| field.is_deleted) {
            return Err(Error::NotFound(format!("field {reference}")));
        }

        let remote_id = match &local {
            Some(field) => field.id.clone(),
            None => Some(RemoteId::new(reference)),
        };

        if let (true, Some(id)) = (self.is_online(), remote_id) {
            match self.call(self.remote.get_field(&id)).await {
                Ok(Some(mut field)) => {
                    if self.may_read(owner, &field).await {
                        if let Some(local) = &local {
                            field.local_id = local.local_id;
                        }
                        return Ok(field);
                    }
                    debug!(field_id = %id, "Field belongs to another user");
                }
                Ok(None) => debug!(field_id = %id, "Field not found remotely"),
                Err(error) => warn!(field_id = %id, "Remote lookup failed, using local copy: {error}"),
            }
        }

        local.ok_or_else(|| Error::NotFound(format!("field {reference}")))
    }

    async fn may_read(&self, owner: &OwnerId, field: &Field) -> bool {
        field
            .details
            .shared_with
            .iter()
            .any(|user| user == owner.as_str())
            || self.resolver().verify_record_access(owner, field).await
    }

    /// Replace a field's payload.
    pub async fn update(&self, mut field: Field) -> WriteOutcome<Field> {
        field.details = field.details.sanitized();
        field.updated_at = now_millis();
        field.is_deleted = false;
        let owner = field.owner_id.clone();
        self.journal(
            &owner,
            HistoryEntry::new(HistoryKind::Updated, Some(field.local_id), None),
        )
        .await;

        if !self.is_online() {
            return self.enqueue_field(field, OFFLINE.to_string()).await;
        }
        if field.id.is_none() {
            return self
                .enqueue_field(field, "not yet synced".to_string())
                .await;
        }
        self.vet_write(&mut field, None).await;

        match self.call(self.remote.update_field(&field)).await {
            Ok(stored) => {
                let stored = Field {
                    local_id: field.local_id,
                    ..stored
                };
                self.mirror(&stored, false).await;
                self.notify(Notice::success("Field updated"));
                WriteOutcome::Synced(stored)
            }
            Err(error) => {
                warn!(local_id = %field.local_id, "Remote update failed, queueing: {error}");
                self.enqueue_field(field, error.to_string()).await
            }
        }
    }

    /// Delete a field by remote id or local id.
    pub async fn delete(&self, owner: &OwnerId, reference: &str) -> WriteOutcome<()> {
        let reference = reference.trim();
        let existing = self
            .local_fields(owner)
            .await
            .into_iter()
            .find(|field| field.matches_ref(reference));

        if existing.as_ref().is_some_and(Field::is_local_only) {
            debug!(reference, "Purging field that was never synced");
            return self.purge_local(owner, reference, None).await;
        }

        let remote_id = existing
            .and_then(|field| field.id)
            .unwrap_or_else(|| RemoteId::new(reference));

        if !self.is_online() {
            return self
                .queue_tombstone(owner, reference, remote_id, OFFLINE.to_string())
                .await;
        }
        if !self.resolver().verify_field_access(owner, &remote_id).await {
            warn!(field_id = %remote_id, "Deleting a field the owner may not control");
        }

        match self.call(self.remote.delete_field(&remote_id)).await {
            Ok(()) => self.purge_local(owner, reference, Some(&remote_id)).await,
            Err(error) => {
                warn!(field_id = %remote_id, "Remote delete failed, queueing: {error}");
                self.queue_tombstone(owner, reference, remote_id, error.to_string())
                    .await
            }
        }
    }

    /// Share a field with another user. Needs a connection.
    pub async fn share(&self, owner: &OwnerId, reference: &str, user: &str) -> WriteOutcome<Field> {
        if !self.is_online() {
            self.notify(
                Notice::warning("Sharing needs a connection")
                    .with_description("Try again when you're back online"),
            );
            return WriteOutcome::Failed(OFFLINE.to_string());
        }
        let Some(user) = normalize_text_option(Some(user.to_string())) else {
            return WriteOutcome::Failed("user must not be empty".to_string());
        };

        let remote_id = match self
            .local_fields(owner)
            .await
            .into_iter()
            .find(|field| field.matches_ref(reference))
        {
            Some(Field { id: Some(id), .. }) => id,
            Some(_) => return WriteOutcome::Failed("field has not been synced yet".to_string()),
            None => RemoteId::new(reference.trim()),
        };

        let mut field = match self.call(self.remote.get_field(&remote_id)).await {
            Ok(Some(field)) => field,
            Ok(None) => return WriteOutcome::Failed(format!("field {remote_id} not found")),
            Err(error) => return WriteOutcome::Failed(error.to_string()),
        };
        if !self.resolver().verify_record_access(owner, &field).await {
            return WriteOutcome::Failed("access denied".to_string());
        }

        if !field.details.shared_with.contains(&user) {
            field.details.shared_with.push(user.clone());
        }
        field.details.is_shared = true;
        field.updated_at = now_millis();

        match self.call(self.remote.update_field(&field)).await {
            Ok(stored) => {
                let stored = Field {
                    local_id: field.local_id,
                    ..stored
                };
                self.mirror(&stored, false).await;
                self.notify(
                    Notice::success("Field shared")
                        .with_description(format!("\"{}\" is now shared with {user}", stored.name())),
                );
                WriteOutcome::Synced(stored)
            }
            Err(error) => WriteOutcome::Failed(error.to_string()),
        }
    }

    /// Record a crop on a field, queueing it until the field exists remotely.
    pub async fn add_crop(
        &self,
        owner: &OwnerId,
        field_ref: &str,
        draft: CropDraft,
    ) -> WriteOutcome<FieldCrop> {
        let (parent_local, parent_remote) = self.parent_of(owner, field_ref).await;
        let crop = FieldCrop::from_draft(owner.clone(), parent_local, parent_remote, draft);

        if !self.is_online() {
            return self.enqueue_crop(crop, OFFLINE.to_string()).await;
        }
        if crop.field_id.is_none() {
            return self
                .enqueue_crop(crop, "field not yet synced".to_string())
                .await;
        }

        match self.call(self.remote.insert_crop(&crop)).await {
            Ok(stored) => {
                self.notify(Notice::success("Crop added"));
                WriteOutcome::Synced(FieldCrop {
                    local_id: crop.local_id,
                    field_local_id: crop.field_local_id,
                    ..stored
                })
            }
            Err(error) => {
                warn!(local_id = %crop.local_id, "Remote crop insert failed, queueing: {error}");
                self.enqueue_crop(crop, error.to_string()).await
            }
        }
    }

    /// Crops on a field: remote ones plus those still queued.
    pub async fn list_crops(&self, owner: &OwnerId, field_ref: &str) -> Vec<FieldCrop> {
        let (parent_local, parent_remote) = self.parent_of(owner, field_ref).await;
        let belongs = |crop: &FieldCrop| {
            (parent_local.is_some() && crop.field_local_id == parent_local)
                || (parent_remote.is_some() && crop.field_id == parent_remote)
        };

        let local: Vec<FieldCrop> = self
            .queue
            .load::<FieldCrop>(owner)
            .await
            .unwrap_or_else(|error| {
                warn!("Failed to read local crops: {error}");
                Vec::new()
            })
            .into_iter()
            .filter(|crop| !crop.is_synced && belongs(crop))
            .collect();

        if let (true, Some(id)) = (self.is_online(), parent_remote.as_ref()) {
            match self.call(self.remote.list_crops(id)).await {
                Ok(mut remote) => {
                    remote.extend(local);
                    return remote;
                }
                Err(error) => warn!("Listing remote crops failed, using local copy: {error}"),
            }
        }
        local
    }

    async fn parent_of(
        &self,
        owner: &OwnerId,
        field_ref: &str,
    ) -> (Option<LocalId>, Option<RemoteId>) {
        self.local_fields(owner)
            .await
            .into_iter()
            .find(|field| !field.is_deleted && field.matches_ref(field_ref))
            .map_or_else(
                || (None, Some(RemoteId::new(field_ref.trim()))),
                |field| (Some(field.local_id), field.id),
            )
    }

    /// Audit events recorded for `owner`, counted by kind.
    pub async fn error_statistics(&self, owner: &OwnerId) -> Result<BTreeMap<AuditKind, usize>> {
        if !self.is_online() {
            return Err(RemoteError::network("device is offline").into());
        }

        let events = self.call(self.remote.list_audit(owner)).await?;
        let mut counts = BTreeMap::new();
        for event in events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Fields and crops not yet acknowledged by the remote store.
    pub async fn pending_count(&self, owner: &OwnerId) -> Result<usize> {
        let fields: Vec<Field> = self.queue.load(owner).await?;
        let crops: Vec<FieldCrop> = self.queue.load(owner).await?;
        Ok(fields.iter().filter(|field| !field.is_synced).count()
            + crops.iter().filter(|crop| !crop.is_synced).count())
    }

    /// The local journal, oldest first.
    pub async fn history(&self, owner: &OwnerId) -> Result<Vec<HistoryEntry>> {
        self.queue.load(owner).await
    }

    /// Farms seen during the last successful ownership resolution.
    pub async fn cached_farms(&self, owner: &OwnerId) -> Result<Vec<Farm>> {
        self.queue.load(owner).await
    }

    /// Flush on every reconnect and, if configured, periodically while online.
    ///
    /// Returns once the connectivity source is dropped.
    pub async fn run_auto_sync(&self, owner: &OwnerId) {
        let mut signal = self.connectivity.clone();
        let mut online = *signal.borrow_and_update();
        let mut ticker = self.settings.auto_sync_interval.map(|period| {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        info!(owner = %owner, online, "Auto-sync started");
        if online {
            self.flush(owner).await;
        }

        loop {
            tokio::select! {
                changed = signal.changed() => {
                    if changed.is_err() {
                        debug!("Connectivity signal closed");
                        break;
                    }
                    let now_online = *signal.borrow_and_update();
                    if now_online == online {
                        continue;
                    }
                    online = now_online;

                    if online {
                        self.notify(
                            Notice::info("Back online").with_description("Syncing your changes"),
                        );
                        self.flush(owner).await;
                    } else {
                        self.notify(
                            Notice::warning("You're offline")
                                .with_description("Changes will be kept on this device"),
                        );
                    }
                }
                () = next_tick(ticker.as_mut()) => {
                    if online {
                        self.flush(owner).await;
                    }
                }
            }
        }
        info!(owner = %owner, "Auto-sync stopped");
    }

    /// Insert with the full payload, retrying once with the minimal one on a validation error.
    pub(super) async fn insert_remote(&self, field: &Field) -> RemoteResult<Field> {
        let mut payload = field.clone();
        if payload
            .farm_id
            .as_ref()
            .is_some_and(FarmId::is_local_placeholder)
        {
            payload.farm_id = None;
        }

        let stored = match self
            .call(self.remote.insert_field(&payload, InsertShape::Full))
            .await
        {
            Err(error) if error.is_validation() => {
                warn!(local_id = %field.local_id, "Full insert rejected, retrying minimal: {error}");
                self.call(self.remote.insert_field(&payload, InsertShape::Minimal))
                    .await
            }
            result => result,
        }?;

        Ok(Field {
            local_id: field.local_id,
            is_synced: true,
            is_deleted: false,
            ..stored
        })
    }

    /// Ownership checks ahead of a remote update. Logs and audits, never blocks.
    ///
    /// `current` is the remote copy when the caller already fetched it; a farm
    /// that changed (or is not known to be unchanged) is resolved again.
    pub(super) async fn vet_write(&self, field: &mut Field, current: Option<&Field>) {
        let owner = field.owner_id.clone();
        let resolver = self.resolver();

        let allowed = match (current, field.id.as_ref()) {
            (Some(current), _) => resolver.verify_record_access(&owner, current).await,
            (None, Some(id)) => resolver.verify_field_access(&owner, id).await,
            (None, None) => true,
        };
        if !allowed {
            warn!(local_id = %field.local_id, "Updating a field the owner may not control");
        }

        let farm_changed = current.is_none_or(|current| current.farm_id != field.farm_id);
        if farm_changed && field.farm_id.is_some() {
            field.farm_id = resolver
                .resolve(&owner, field.farm_id.as_ref())
                .await
                .into_farm_id();
        }
    }

    pub(super) async fn audit_insert_error(&self, field: &Field, error: &RemoteError) {
        let mut event = AuditEvent::new(
            field.owner_id.clone(),
            AuditKind::InsertError,
            serde_json::json!({
                "local_id": field.local_id,
                "name": field.name(),
                "kind": error.kind.to_string(),
                "code": error.code,
                "message": compact_text(&error.message),
            }),
        );
        if let Some(farm_id) = &field.farm_id {
            event = event.with_farm(farm_id.clone());
        }
        if let Err(error) = self.call(self.remote.record_audit(&event)).await {
            debug!("Failed to record insert error: {error}");
        }
    }

    /// Put `field` into the queue as unsynced, replacing its previous entry in place.
    async fn enqueue_field(&self, mut field: Field, reason: String) -> WriteOutcome<Field> {
        field.is_synced = false;
        let owner = field.owner_id.clone();

        let saved = {
            let _guard = self.queue_lock.lock().await;
            self.upsert_field(&owner, &mut field).await
        };

        match saved {
            Ok(()) => {
                self.journal(
                    &owner,
                    HistoryEntry::new(HistoryKind::Queued, Some(field.local_id), Some(reason.clone())),
                )
                .await;
                self.notify(
                    Notice::info("Saved offline")
                        .with_description("Will sync when you're back online"),
                );
                WriteOutcome::QueuedLocally {
                    value: field,
                    reason,
                }
            }
            Err(error) => self.storage_failure(&error),
        }
    }

    async fn upsert_field(&self, owner: &OwnerId, field: &mut Field) -> Result<()> {
        let mut fields: Vec<Field> = self.queue.load(owner).await?;
        match fields.iter_mut().find(|entry| entry.same_record(field)) {
            Some(entry) => {
                if field.id.is_none() {
                    field.id.clone_from(&entry.id);
                }
                *entry = field.clone();
            }
            None => fields.push(field.clone()),
        }
        self.queue.save(owner, &fields).await
    }

    /// Keep the local copy of a confirmed record; `insert` adds it when missing.
    pub(super) async fn mirror(&self, stored: &Field, insert: bool) {
        let _guard = self.queue_lock.lock().await;
        let result: Result<()> = async {
            let mut fields: Vec<Field> = self.queue.load(&stored.owner_id).await?;
            match fields.iter_mut().find(|entry| entry.same_record(stored)) {
                Some(entry) => *entry = stored.clone(),
                None if insert => fields.push(stored.clone()),
                None => return Ok(()),
            }
            self.queue.save(&stored.owner_id, &fields).await
        }
        .await;

        if let Err(error) = result {
            warn!(local_id = %stored.local_id, "Failed to mirror field locally: {error}");
        }
    }

    async fn purge_local(
        &self,
        owner: &OwnerId,
        reference: &str,
        remote_id: Option<&RemoteId>,
    ) -> WriteOutcome<()> {
        let result = {
            let _guard = self.queue_lock.lock().await;
            self.remove_local(owner, reference, remote_id).await
        };

        match result {
            Ok(removed) => {
                for local_id in removed {
                    self.journal(
                        owner,
                        HistoryEntry::new(HistoryKind::Deleted, Some(local_id), None),
                    )
                    .await;
                }
                self.notify(Notice::success("Field deleted"));
                WriteOutcome::Synced(())
            }
            Err(error) => self.storage_failure(&error),
        }
    }

    /// Drop every local entry for the record along with its queued crops.
    async fn remove_local(
        &self,
        owner: &OwnerId,
        reference: &str,
        remote_id: Option<&RemoteId>,
    ) -> Result<Vec<LocalId>> {
        let fields: Vec<Field> = self.queue.load(owner).await?;
        let (removed, kept): (Vec<Field>, Vec<Field>) = fields.into_iter().partition(|field| {
            field.matches_ref(reference)
                || remote_id.is_some_and(|id| field.id.as_ref() == Some(id))
        });
        if !removed.is_empty() {
            self.queue.save(owner, &kept).await?;
        }

        self.drop_crops_of(owner, &removed, remote_id).await?;
        Ok(removed.iter().map(|field| field.local_id).collect())
    }

    async fn drop_crops_of(
        &self,
        owner: &OwnerId,
        fields: &[Field],
        remote_id: Option<&RemoteId>,
    ) -> Result<()> {
        let crops: Vec<FieldCrop> = self.queue.load(owner).await?;
        let before = crops.len();
        let kept: Vec<FieldCrop> = crops
            .into_iter()
            .filter(|crop| {
                !fields
                    .iter()
                    .any(|field| crop.belongs_to(&field.local_id, field.id.as_ref()))
                    && !remote_id.is_some_and(|id| crop.field_id.as_ref() == Some(id))
            })
            .collect();
        if kept.len() != before {
            self.queue.save(owner, &kept).await?;
        }
        Ok(())
    }

    async fn queue_tombstone(
        &self,
        owner: &OwnerId,
        reference: &str,
        remote_id: RemoteId,
        reason: String,
    ) -> WriteOutcome<()> {
        let result = {
            let _guard = self.queue_lock.lock().await;
            self.write_tombstone(owner, reference, remote_id).await
        };

        match result {
            Ok(local_id) => {
                self.journal(
                    owner,
                    HistoryEntry::new(HistoryKind::Deleted, local_id, Some(reason.clone())),
                )
                .await;
                self.notify(
                    Notice::info("Deleted offline")
                        .with_description("The deletion will sync when you're back online"),
                );
                WriteOutcome::QueuedLocally { value: (), reason }
            }
            Err(error) => self.storage_failure(&error),
        }
    }

    async fn write_tombstone(
        &self,
        owner: &OwnerId,
        reference: &str,
        remote_id: RemoteId,
    ) -> Result<Option<LocalId>> {
        let mut fields: Vec<Field> = self.queue.load(owner).await?;
        let position = fields
            .iter()
            .position(|field| field.matches_ref(reference) || field.id.as_ref() == Some(&remote_id));

        let local_id = match position {
            Some(index) if fields[index].is_local_only() => {
                let removed = fields.remove(index);
                self.drop_crops_of(owner, std::slice::from_ref(&removed), None)
                    .await?;
                removed.local_id
            }
            Some(index) => {
                fields[index].mark_deleted();
                fields[index].local_id
            }
            None => {
                let tombstone = Field::tombstone(owner.clone(), remote_id.clone());
                let local_id = tombstone.local_id;
                fields.push(tombstone);
                local_id
            }
        };

        self.queue.save(owner, &fields).await?;
        self.drop_crops_of(owner, &[], Some(&remote_id)).await?;
        Ok(Some(local_id))
    }

    async fn enqueue_crop(&self, mut crop: FieldCrop, reason: String) -> WriteOutcome<FieldCrop> {
        crop.is_synced = false;
        let owner = crop.owner_id.clone();

        let saved: Result<()> = {
            let _guard = self.queue_lock.lock().await;
            async {
                let mut crops: Vec<FieldCrop> = self.queue.load(&owner).await?;
                crops.push(crop.clone());
                self.queue.save(&owner, &crops).await
            }
            .await
        };

        match saved {
            Ok(()) => {
                self.notify(
                    Notice::info("Crop saved offline")
                        .with_description("Will sync once the field is synced"),
                );
                WriteOutcome::QueuedLocally { value: crop, reason }
            }
            Err(error) => self.storage_failure(&error),
        }
    }

    fn storage_failure<T>(&self, error: &Error) -> WriteOutcome<T> {
        error!("Local storage write failed: {error}");
        self.notify(Notice::error("Could not save").with_description(error.to_string()));
        WriteOutcome::Failed(error.to_string())
    }
}

/// Remote rows win; pending local records fill in what the remote has not seen.
fn merge_fields(remote: Vec<Field>, local: &[Field]) -> Vec<Field> {
    let mut merged: Vec<Field> = remote
        .into_iter()
        .filter(|row| !local.iter().any(|entry| entry.is_deleted && entry.same_record(row)))
        .map(|mut row| {
            if let Some(entry) = local.iter().find(|entry| entry.same_record(&row)) {
                row.local_id = entry.local_id;
            }
            row
        })
        .collect();

    let pending: Vec<Field> = local
        .iter()
        .filter(|entry| {
            !entry.is_synced
                && !entry.is_deleted
                && !merged.iter().any(|row| row.same_record(entry))
        })
        .cloned()
        .collect();
    merged.extend(pending);
    merged
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
