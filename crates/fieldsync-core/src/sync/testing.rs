//! Shared fixture for synchronizer tests

use std::sync::Arc;

use super::notify::testing::RecordingNotifier;
use super::{Connectivity, Synchronizer};
use crate::config::SyncSettings;
use crate::db::LibSqlLocalStore;
use crate::models::{Farm, Field, FieldDetails, FieldDraft, OwnerId};
use crate::remote::MemoryRemoteStore;

pub struct Harness {
    pub sync: Synchronizer<MemoryRemoteStore, LibSqlLocalStore>,
    pub remote: MemoryRemoteStore,
    pub connectivity: Connectivity,
    pub notifier: Arc<RecordingNotifier>,
    pub owner: OwnerId,
    pub farm: Farm,
}

impl Harness {
    pub async fn online() -> Self {
        Self::with_settings(true, SyncSettings::default().without_auto_sync()).await
    }

    pub async fn offline() -> Self {
        Self::with_settings(false, SyncSettings::default().without_auto_sync()).await
    }

    pub async fn with_settings(online: bool, settings: SyncSettings) -> Self {
        let remote = MemoryRemoteStore::new();
        let owner = OwnerId::from("farmer-1");
        let farm = remote.seed_farm(&owner, "Home Farm");
        let store = LibSqlLocalStore::open_in_memory()
            .await
            .unwrap()
            .with_quota(settings.local_quota_bytes);
        let connectivity = Connectivity::new(online);
        let notifier = Arc::new(RecordingNotifier::default());

        let sync = Synchronizer::new(
            remote.clone(),
            store,
            connectivity.signal(),
            notifier.clone(),
            settings,
        );

        Self {
            sync,
            remote,
            connectivity,
            notifier,
            owner,
            farm,
        }
    }

    pub fn draft(&self, name: &str) -> FieldDraft {
        FieldDraft::new(self.owner.clone(), FieldDetails::named(name)).with_farm(self.farm.id.clone())
    }

    /// Raw queue contents, mirrors included
    pub async fn local_fields(&self) -> Vec<Field> {
        self.sync.queue.load(&self.owner).await.unwrap()
    }
}
