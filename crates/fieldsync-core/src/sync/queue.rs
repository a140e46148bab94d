//! Typed per-owner lists over the local blob store

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::db::{LocalStore, StorageKind};
use crate::error::Result;
use crate::models::{Farm, Field, FieldCrop, HistoryEntry, OwnerId};

/// A value stored as one JSON list per owner
pub trait QueueEntry: Serialize + DeserializeOwned {
    const KIND: StorageKind;

    /// Entries that may be dropped to make room. The remote store holds a copy.
    fn is_mirror(&self) -> bool {
        false
    }

    /// What survives when the list itself has to shrink
    fn shed(items: &[Self]) -> Vec<&Self> {
        items.iter().filter(|item| !item.is_mirror()).collect()
    }
}

impl QueueEntry for Field {
    const KIND: StorageKind = StorageKind::Fields;

    fn is_mirror(&self) -> bool {
        self.is_synced && !self.is_deleted
    }
}

impl QueueEntry for FieldCrop {
    const KIND: StorageKind = StorageKind::Crops;

    fn is_mirror(&self) -> bool {
        self.is_synced
    }
}

impl QueueEntry for Farm {
    const KIND: StorageKind = StorageKind::Farms;

    fn shed(_items: &[Self]) -> Vec<&Self> {
        Vec::new()
    }
}

impl QueueEntry for HistoryEntry {
    const KIND: StorageKind = StorageKind::History;

    fn shed(items: &[Self]) -> Vec<&Self> {
        items.iter().skip(items.len() / 2).collect()
    }
}

/// The offline queue and its companion lists (crops, history, farm cache)
pub struct OfflineQueue<L> {
    store: L,
    history_limit: usize,
    history_lock: Mutex<()>,
}

impl<L: LocalStore> OfflineQueue<L> {
    pub fn new(store: L, history_limit: usize) -> Self {
        Self {
            store,
            history_limit,
            history_lock: Mutex::new(()),
        }
    }

    /// Load a list. A corrupt blob reads as empty.
    pub async fn load<T: QueueEntry>(&self, owner: &OwnerId) -> Result<Vec<T>> {
        let key = T::KIND.key(owner);
        let Some(blob) = self.store.get(&key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&blob) {
            Ok(items) => Ok(items),
            Err(error) => {
                warn!(key, "Discarding corrupt local list: {error}");
                Ok(Vec::new())
            }
        }
    }

    /// Replace a list, pruning once when local storage is full.
    pub async fn save<T: QueueEntry>(&self, owner: &OwnerId, items: &[T]) -> Result<()> {
        let key = T::KIND.key(owner);
        let blob = serde_json::to_string(items)?;

        match self.store.set(&key, &blob).await {
            Err(error) if error.is_quota_exceeded() => {
                warn!(key, "Local storage full, pruning: {error}");
                self.prune_companions(owner, T::KIND).await;

                let kept = T::shed(items);
                let blob = serde_json::to_string(&kept)?;
                self.store.set(&key, &blob).await.inspect_err(|error| {
                    error!(key, "Local storage exhausted after pruning: {error}");
                })
            }
            result => result,
        }
    }

    /// Drop the oldest half of history and the farm cache, except for the list being written.
    async fn prune_companions(&self, owner: &OwnerId, writing: StorageKind) {
        if writing != StorageKind::History {
            let _guard = self.history_lock.lock().await;
            match self.load::<HistoryEntry>(owner).await {
                Ok(history) if !history.is_empty() => {
                    let kept = HistoryEntry::shed(&history);
                    let result = match serde_json::to_string(&kept) {
                        Ok(blob) => self.store.set(&StorageKind::History.key(owner), &blob).await,
                        Err(error) => Err(error.into()),
                    };
                    if let Err(error) = result {
                        warn!("Failed to prune history: {error}");
                    }
                }
                Ok(_) => {}
                Err(error) => warn!("Failed to read history for pruning: {error}"),
            }
        }

        if writing != StorageKind::Farms {
            if let Err(error) = self.store.remove(&StorageKind::Farms.key(owner)).await {
                warn!("Failed to drop farm cache: {error}");
            }
        }
    }

    /// Append journal entries, keeping at most `history_limit`.
    pub async fn record_history(&self, owner: &OwnerId, entries: Vec<HistoryEntry>) -> Result<()> {
        if entries.is_empty() || self.history_limit == 0 {
            return Ok(());
        }

        let _guard = self.history_lock.lock().await;
        let mut history = self.load::<HistoryEntry>(owner).await?;
        history.extend(entries);
        if history.len() > self.history_limit {
            let excess = history.len() - self.history_limit;
            history.drain(..excess);
        }
        self.save(owner, &history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlLocalStore;
    use crate::models::{FarmId, FieldDetails, FieldDraft, HistoryKind};
    use pretty_assertions::assert_eq;

    fn owner() -> OwnerId {
        OwnerId::from("user-1")
    }

    fn field(name: &str, synced: bool) -> Field {
        let mut field = FieldDraft::new(owner(), FieldDetails::named(name)).into_field();
        field.is_synced = synced;
        field
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn load_of_missing_list_is_empty() {
        let queue = OfflineQueue::new(LibSqlLocalStore::open_in_memory().await.unwrap(), 10);
        let fields: Vec<Field> = queue.load(&owner()).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn corrupt_blob_reads_as_empty() {
        let store = LibSqlLocalStore::open_in_memory().await.unwrap();
        store
            .set(&StorageKind::Fields.key(&owner()), "{not json")
            .await
            .unwrap();
        let queue = OfflineQueue::new(store, 10);

        let fields: Vec<Field> = queue.load(&owner()).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn save_then_load_keeps_order() {
        let queue = OfflineQueue::new(LibSqlLocalStore::open_in_memory().await.unwrap(), 10);
        let items = vec![field("a", false), field("b", false), field("c", false)];
        queue.save(&owner(), &items).await.unwrap();

        let loaded: Vec<Field> = queue.load(&owner()).await.unwrap();
        assert_eq!(loaded, items);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lists_are_scoped_by_owner() {
        let queue = OfflineQueue::new(LibSqlLocalStore::open_in_memory().await.unwrap(), 10);
        queue.save(&owner(), &[field("mine", false)]).await.unwrap();

        let other: Vec<Field> = queue.load(&OwnerId::from("user-2")).await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn history_is_capped() {
        let queue = OfflineQueue::new(LibSqlLocalStore::open_in_memory().await.unwrap(), 3);
        for index in 0..5 {
            queue
                .record_history(
                    &owner(),
                    vec![HistoryEntry::new(
                        HistoryKind::Queued,
                        None,
                        Some(format!("entry {index}")),
                    )],
                )
                .await
                .unwrap();
        }

        let history: Vec<HistoryEntry> = queue.load(&owner()).await.unwrap();
        let details: Vec<_> = history.iter().filter_map(|entry| entry.detail.clone()).collect();
        assert_eq!(details, vec!["entry 2", "entry 3", "entry 4"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quota_prunes_mirrors_and_companions() {
        let store = LibSqlLocalStore::open_in_memory().await.unwrap();
        let queue = OfflineQueue::new(store.clone(), 100);

        let farms = vec![Farm {
            id: FarmId::from("farm-1"),
            owner_id: owner(),
            name: "x".repeat(400),
            size_unit: None,
        }];
        queue.save(&owner(), &farms).await.unwrap();

        let pending = field("pending", false);
        let mirror = field(&"m".repeat(400), true);
        let needed = serde_json::to_string(&[pending.clone(), mirror.clone()])
            .unwrap()
            .len() as u64;
        let queue = OfflineQueue::new(store.with_quota(Some(needed)), 100);

        queue
            .save(&owner(), &[pending.clone(), mirror])
            .await
            .unwrap();

        let fields: Vec<Field> = queue.load(&owner()).await.unwrap();
        assert_eq!(fields, vec![pending]);
        let cached: Vec<Farm> = queue.load(&owner()).await.unwrap();
        assert!(cached.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quota_failure_after_pruning_propagates() {
        let store = LibSqlLocalStore::open_in_memory().await.unwrap().with_quota(Some(16));
        let queue = OfflineQueue::new(store, 100);

        let error = queue
            .save(&owner(), &[field("too big to fit", false)])
            .await
            .unwrap_err();
        assert!(error.is_quota_exceeded());
    }
}
