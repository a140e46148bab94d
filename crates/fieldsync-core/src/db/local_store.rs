//! Persistent key/value blob store backing the offline queue

use std::sync::Arc;

use libsql::params;

use super::Database;
use crate::error::{Error, Result};
use crate::models::OwnerId;
use crate::util::now_millis;

/// Entity kinds kept in the local store, one serialized list per owner each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Fields,
    Crops,
    History,
    Farms,
}

impl StorageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fields => "fields",
            Self::Crops => "crops",
            Self::History => "history",
            Self::Farms => "farms",
        }
    }

    /// Storage key for this kind and owner.
    pub fn key(self, owner: &OwnerId) -> String {
        format!("fieldsync:{}:{}", self.as_str(), owner)
    }
}

/// Trait for local blob storage (async)
///
/// Each call is atomic from the caller's perspective: a reader sees either the
/// previous blob or the new one, never a partial write.
#[allow(async_fn_in_trait)]
pub trait LocalStore {
    /// Read the blob stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the blob stored under `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the blob stored under `key`
    async fn remove(&self, key: &str) -> Result<()>;
}

/// libSQL implementation of `LocalStore`
#[derive(Clone)]
pub struct LibSqlLocalStore {
    db: Arc<Database>,
    quota_bytes: Option<u64>,
}

impl LibSqlLocalStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            quota_bytes: None,
        }
    }

    /// Open a store over a fresh in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    /// Cap the total size of stored blobs
    #[must_use]
    pub const fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    async fn bytes_excluding(&self, key: &str) -> Result<u64> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT COALESCE(SUM(LENGTH(CAST(value AS BLOB))), 0) FROM offline_store WHERE key != ?1",
                params![key],
            )
            .await?;

        let used: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(used).unwrap_or_default())
    }
}

impl LocalStore for LibSqlLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .db
            .connection()
            .query(
                "SELECT value FROM offline_store WHERE key = ?1",
                params![key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        if let Some(limit) = self.quota_bytes {
            let needed = self.bytes_excluding(key).await? + value.len() as u64;
            if needed > limit {
                return Err(Error::StorageQuotaExceeded { needed, limit });
            }
        }

        self.db
            .connection()
            .execute(
                "INSERT INTO offline_store (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_millis()],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.db
            .connection()
            .execute("DELETE FROM offline_store WHERE key = ?1", params![key])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_keys_are_scoped_by_kind_and_owner() {
        let owner = OwnerId::from("user-1");
        assert_eq!(StorageKind::Fields.key(&owner), "fieldsync:fields:user-1");
        assert_ne!(
            StorageKind::Crops.key(&owner),
            StorageKind::Fields.key(&owner)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn set_get_remove_roundtrip() {
        let store = LibSqlLocalStore::open_in_memory().await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), None);
        store.set("k", "[1]").await.unwrap();
        store.set("k", "[1,2]").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("[1,2]"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn quota_counts_other_keys_only() {
        let store = LibSqlLocalStore::open_in_memory()
            .await
            .unwrap()
            .with_quota(Some(10));

        store.set("a", "12345").await.unwrap();
        // Replacing a key does not count its previous value.
        store.set("a", "1234567").await.unwrap();

        let error = store.set("b", "1234").await.unwrap_err();
        assert!(error.is_quota_exceeded());
        assert_eq!(store.get("b").await.unwrap(), None);

        store.set("b", "123").await.unwrap();
    }
}
