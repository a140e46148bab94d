//! Replaying the offline queue against the remote store

use std::collections::HashSet;
use std::sync::{Mutex as StdMutex, PoisonError};

use tracing::{debug, info, warn};

use super::engine::Synchronizer;
use super::notify::Notice;
use super::outcome::{FlushReport, FlushStatus};
use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{Field, FieldCrop, HistoryEntry, HistoryKind, OwnerId};
use crate::remote::{RemoteError, RemoteErrorKind, RemoteStore};
use crate::state::SyncState;

/// Marks an owner's flush as in flight until dropped
struct FlushToken<'a> {
    in_flight: &'a StdMutex<HashSet<OwnerId>>,
    owner: OwnerId,
}

impl Drop for FlushToken<'_> {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.owner);
    }
}

/// What happened to one queued entry
enum ItemResult {
    /// Confirmed by the remote store
    Synced(Field),
    /// Tombstone cleared
    Removed,
    /// The remote row was newer and replaces the local one
    Conflict(Field),
    /// The remote store will never accept this entry
    Dropped(String),
    /// Transient failure; stays queued
    Failed(RemoteError),
}

impl<R: RemoteStore, L: LocalStore> Synchronizer<R, L> {
    fn begin_flush(&self, owner: &OwnerId) -> Option<FlushToken<'_>> {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        in_flight.insert(owner.clone()).then(|| FlushToken {
            in_flight: &self.in_flight,
            owner: owner.clone(),
        })
    }

    /// Push every unsynced entry for `owner` to the remote store, oldest first.
    pub async fn flush(&self, owner: &OwnerId) -> FlushReport {
        if !self.is_online() {
            return FlushReport::skipped(FlushStatus::Offline, self.remaining(owner).await);
        }
        let Some(_token) = self.begin_flush(owner) else {
            debug!(owner = %owner, "Flush already in flight");
            return FlushReport::skipped(FlushStatus::AlreadyRunning, self.remaining(owner).await);
        };

        self.set_state(SyncState::Syncing);
        let mut report = FlushReport::default();

        let pending: Vec<Field> = self
            .local_fields(owner)
            .await
            .into_iter()
            .filter(|field| !field.is_synced)
            .collect();
        debug!(owner = %owner, pending = pending.len(), "Flushing offline queue");

        for item in pending {
            let result = if item.is_deleted {
                self.push_delete(&item).await
            } else if item.id.is_none() {
                self.push_insert(owner, &item).await
            } else {
                self.push_update(&item).await
            };

            let entry = match &result {
                ItemResult::Synced(_) => {
                    report.synced += 1;
                    HistoryEntry::new(HistoryKind::Synced, Some(item.local_id), None)
                }
                ItemResult::Removed => {
                    report.removed += 1;
                    HistoryEntry::new(HistoryKind::Removed, Some(item.local_id), None)
                }
                ItemResult::Conflict(remote) => {
                    report.conflicts += 1;
                    HistoryEntry::new(
                        HistoryKind::Conflict,
                        Some(item.local_id),
                        Some(format!(
                            "remote copy from {} replaced local edit from {}",
                            remote.updated_at, item.updated_at
                        )),
                    )
                }
                ItemResult::Dropped(reason) => {
                    report.removed += 1;
                    warn!(local_id = %item.local_id, "Dropping queued entry: {reason}");
                    HistoryEntry::new(HistoryKind::Dropped, Some(item.local_id), Some(reason.clone()))
                }
                ItemResult::Failed(error) => {
                    report.failed += 1;
                    debug!(local_id = %item.local_id, "Entry stays queued: {error}");
                    self.journal_failure(owner, &item, error).await;
                    continue;
                }
            };

            if let Err(error) = self.apply(owner, &item, result).await {
                warn!(local_id = %item.local_id, "Failed to record flush result: {error}");
            }
            self.journal(owner, entry).await;
        }

        let (crops_synced, crops_failed) = self.push_crops(owner).await;
        report.synced += crops_synced;
        report.failed += crops_failed;
        report.remaining = self.remaining(owner).await;

        self.set_state(if report.failed == 0 && report.remaining == 0 {
            SyncState::Synced
        } else {
            SyncState::Error
        });

        info!(
            owner = %owner,
            synced = report.synced,
            removed = report.removed,
            conflicts = report.conflicts,
            failed = report.failed,
            remaining = report.remaining,
            "Flush completed"
        );

        let changed = report.synced + report.removed + report.conflicts;
        if changed > 0 {
            self.notify(
                Notice::success("Sync complete")
                    .with_description(format!("{changed} offline change(s) synced")),
            );
        }
        if report.failed > 0 {
            self.notify(
                Notice::warning("Some changes did not sync")
                    .with_description(format!("{} change(s) will be retried", report.failed)),
            );
        }
        report
    }

    async fn remaining(&self, owner: &OwnerId) -> usize {
        self.pending_count(owner).await.unwrap_or_else(|error| {
            warn!("Failed to count pending entries: {error}");
            0
        })
    }

    async fn journal_failure(&self, owner: &OwnerId, item: &Field, error: &RemoteError) {
        self.journal(
            owner,
            HistoryEntry::new(HistoryKind::Queued, Some(item.local_id), Some(error.to_string())),
        )
        .await;
    }

    async fn push_delete(&self, item: &Field) -> ItemResult {
        let Some(id) = item.id.as_ref() else {
            return ItemResult::Removed;
        };

        match self.call(self.remote.delete_field(id)).await {
            Ok(()) => ItemResult::Removed,
            Err(error) if error.is_permanent() => ItemResult::Dropped(error.to_string()),
            Err(error) => ItemResult::Failed(error),
        }
    }

    async fn push_insert(&self, owner: &OwnerId, item: &Field) -> ItemResult {
        // The farm chosen while offline may since have gone or never been the owner's.
        let mut field = item.clone();
        field.farm_id = self
            .resolver()
            .resolve(owner, field.farm_id.as_ref())
            .await
            .into_farm_id();

        match self.insert_remote(&field).await {
            Ok(stored) => ItemResult::Synced(stored),
            Err(error) => {
                self.audit_insert_error(&field, &error).await;
                ItemResult::Failed(error)
            }
        }
    }

    /// Last writer wins by `updated_at`; the local edit wins ties.
    async fn push_update(&self, item: &Field) -> ItemResult {
        let Some(id) = item.id.as_ref() else {
            return ItemResult::Failed(RemoteError::validation("entry has no remote id"));
        };

        let current = match self.call(self.remote.get_field(id)).await {
            Ok(Some(remote)) if remote.updated_at > item.updated_at => {
                info!(field_id = %id, "Remote copy is newer, discarding local edit");
                return ItemResult::Conflict(Field {
                    local_id: item.local_id,
                    is_synced: true,
                    is_deleted: false,
                    ..remote
                });
            }
            Ok(Some(remote)) => remote,
            Ok(None) => return ItemResult::Dropped(format!("field {id} was deleted remotely")),
            Err(error) => return ItemResult::Failed(error),
        };

        let mut payload = item.clone();
        self.vet_write(&mut payload, Some(&current)).await;
        match self.call(self.remote.update_field(&payload)).await {
            Ok(stored) => ItemResult::Synced(Field {
                local_id: item.local_id,
                ..stored
            }),
            Err(error) if error.kind == RemoteErrorKind::NotFound => {
                ItemResult::Dropped(error.to_string())
            }
            Err(error) => ItemResult::Failed(error),
        }
    }

    /// Write one entry's result into the current queue.
    ///
    /// An entry edited while its remote call was in flight keeps the newer
    /// payload and stays unsynced; it only learns the remote id.
    async fn apply(&self, owner: &OwnerId, item: &Field, result: ItemResult) -> Result<()> {
        let _guard = self.queue_lock.lock().await;
        let mut fields: Vec<Field> = self.queue.load(owner).await?;
        let position = fields
            .iter()
            .position(|field| field.local_id == item.local_id);
        let untouched = position.is_some_and(|index| fields[index] == *item);

        match (result, position) {
            (ItemResult::Failed(_), _) => return Ok(()),
            (ItemResult::Removed | ItemResult::Dropped(_), Some(index)) if untouched => {
                fields.remove(index);
            }
            (ItemResult::Removed | ItemResult::Dropped(_), _) => return Ok(()),
            (ItemResult::Synced(confirmed) | ItemResult::Conflict(confirmed), Some(index)) => {
                if untouched {
                    fields[index] = confirmed;
                } else if fields[index].id.is_none() {
                    debug!(local_id = %item.local_id, "Entry changed during flush, keeping local edit");
                    fields[index].id = confirmed.id;
                } else {
                    return Ok(());
                }
            }
            (ItemResult::Synced(confirmed) | ItemResult::Conflict(confirmed), None) => {
                // Deleted locally while its insert was in flight.
                match (item.id.is_none(), confirmed.id) {
                    (true, Some(id)) => fields.push(Field::tombstone(owner.clone(), id)),
                    _ => return Ok(()),
                }
            }
        }

        self.queue.save(owner, &fields).await
    }

    /// Insert queued crops whose parent field now has a remote id.
    async fn push_crops(&self, owner: &OwnerId) -> (usize, usize) {
        let crops: Vec<FieldCrop> = match self.queue.load(owner).await {
            Ok(crops) => crops,
            Err(error) => {
                warn!("Failed to read queued crops: {error}");
                return (0, 0);
            }
        };
        let fields = self.local_fields(owner).await;
        let (mut synced, mut failed) = (0, 0);

        for crop in crops.into_iter().filter(|crop| !crop.is_synced) {
            let parent = crop.field_id.clone().or_else(|| {
                let parent_local = crop.field_local_id?;
                fields
                    .iter()
                    .find(|field| field.local_id == parent_local)
                    .and_then(|field| field.id.clone())
            });
            let Some(parent) = parent else {
                debug!(local_id = %crop.local_id, "Crop waits for its field");
                continue;
            };

            let payload = FieldCrop {
                field_id: Some(parent),
                ..crop
            };
            match self.call(self.remote.insert_crop(&payload)).await {
                Ok(_) => {
                    synced += 1;
                    if let Err(error) = self.forget_crop(owner, &payload).await {
                        warn!(local_id = %payload.local_id, "Failed to clear synced crop: {error}");
                    }
                    self.journal(
                        owner,
                        HistoryEntry::new(
                            HistoryKind::Synced,
                            Some(payload.local_id),
                            Some(format!("crop {}", payload.crop_name)),
                        ),
                    )
                    .await;
                }
                Err(error) => {
                    failed += 1;
                    debug!(local_id = %payload.local_id, "Crop stays queued: {error}");
                }
            }
        }
        (synced, failed)
    }

    async fn forget_crop(&self, owner: &OwnerId, crop: &FieldCrop) -> Result<()> {
        let _guard = self.queue_lock.lock().await;
        let mut crops: Vec<FieldCrop> = self.queue.load(owner).await?;
        crops.retain(|queued| queued.local_id != crop.local_id);
        self.queue.save(owner, &crops).await
    }
}
