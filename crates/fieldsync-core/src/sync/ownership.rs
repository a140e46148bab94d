//! Fail-open farm ownership resolution

use std::future::Future;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};

use super::queue::OfflineQueue;
use crate::db::LocalStore;
use crate::models::{AuditEvent, AuditKind, Farm, FarmId, Field, NewFarm, OwnerId, RemoteId};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};

/// Where a write ended up being filed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FarmResolution {
    /// The requested farm belongs to the owner
    Verified(FarmId),
    /// Filed under another farm of the owner
    Redirected { from: Option<FarmId>, to: FarmId },
    /// A default farm was created for the owner
    Provisioned(FarmId),
    /// Resolution failed; the requested farm is kept as-is
    Unresolved(Option<FarmId>),
}

impl FarmResolution {
    pub fn into_farm_id(self) -> Option<FarmId> {
        match self {
            Self::Verified(id) | Self::Provisioned(id) | Self::Redirected { to: id, .. } => Some(id),
            Self::Unresolved(requested) => requested,
        }
    }
}

pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = RemoteResult<T>>,
) -> RemoteResult<T> {
    tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
        Err(RemoteError::timeout(format!(
            "no response within {} ms",
            timeout.as_millis()
        )))
    })
}

/// Resolves the farm a field is filed under. Never blocks a write.
pub struct OwnershipResolver<'a, R, L> {
    remote: &'a R,
    queue: &'a OfflineQueue<L>,
    timeout: Duration,
}

impl<'a, R: RemoteStore, L: LocalStore> OwnershipResolver<'a, R, L> {
    pub const fn new(remote: &'a R, queue: &'a OfflineQueue<L>, timeout: Duration) -> Self {
        Self {
            remote,
            queue,
            timeout,
        }
    }

    pub async fn resolve(&self, owner: &OwnerId, requested: Option<&FarmId>) -> FarmResolution {
        match self.try_resolve(owner, requested).await {
            Ok(resolution) => resolution,
            Err(error) => {
                warn!("Farm resolution failed, continuing without it: {error}");
                self.resolve_from_cache(owner, requested).await
            }
        }
    }

    async fn try_resolve(
        &self,
        owner: &OwnerId,
        requested: Option<&FarmId>,
    ) -> RemoteResult<FarmResolution> {
        let farms = bounded(self.timeout, self.remote.list_farms(owner)).await?;
        self.cache_farms(owner, &farms).await;

        if let Some(requested) = requested {
            if farms.iter().any(|farm| &farm.id == requested) {
                return Ok(FarmResolution::Verified(requested.clone()));
            }
            if !requested.is_local_placeholder() {
                self.check_foreign_farm(owner, requested).await;
            }
        }

        if let Some(first) = farms.first() {
            if let Some(requested) = requested {
                info!(from = %requested, to = %first.id, "Redirecting field to an owned farm");
                self.audit(
                    AuditEvent::new(
                        owner.clone(),
                        AuditKind::FarmCorrection,
                        json!({ "requested_farm_id": requested.as_str(), "corrected_farm_id": first.id.as_str() }),
                    )
                    .with_farm(first.id.clone()),
                )
                .await;
            }
            return Ok(FarmResolution::Redirected {
                from: requested.cloned(),
                to: first.id.clone(),
            });
        }

        let farm = bounded(
            self.timeout,
            self.remote.insert_farm(&NewFarm::default_for(owner.clone())),
        )
        .await?;
        info!(farm_id = %farm.id, "Provisioned default farm");
        self.cache_farms(owner, std::slice::from_ref(&farm)).await;
        self.audit(
            AuditEvent::new(
                owner.clone(),
                AuditKind::FarmAutocreation,
                json!({ "requested_farm_id": requested.map(FarmId::as_str), "farm_name": farm.name }),
            )
            .with_farm(farm.id.clone()),
        )
        .await;
        Ok(FarmResolution::Provisioned(farm.id))
    }

    async fn resolve_from_cache(
        &self,
        owner: &OwnerId,
        requested: Option<&FarmId>,
    ) -> FarmResolution {
        let cached: Vec<Farm> = self.queue.load(owner).await.unwrap_or_default();

        match requested {
            Some(requested) if cached.iter().any(|farm| &farm.id == requested) => {
                FarmResolution::Verified(requested.clone())
            }
            Some(requested) if !requested.is_local_placeholder() => {
                FarmResolution::Unresolved(Some(requested.clone()))
            }
            _ => cached.first().map_or_else(
                || FarmResolution::Unresolved(requested.cloned()),
                |farm| FarmResolution::Redirected {
                    from: requested.cloned(),
                    to: farm.id.clone(),
                },
            ),
        }
    }

    /// Record when a requested farm exists but belongs to someone else.
    async fn check_foreign_farm(&self, owner: &OwnerId, requested: &FarmId) {
        match bounded(self.timeout, self.remote.get_farm(requested)).await {
            Ok(Some(farm)) if &farm.owner_id != owner => {
                warn!(farm_id = %requested, "Farm belongs to another user");
                self.audit(AuditEvent::ownership_mismatch(
                    owner.clone(),
                    requested.clone(),
                    farm.owner_id,
                ))
                .await;
            }
            Ok(_) => {}
            Err(error) => debug!("Farm lookup failed: {error}"),
        }
    }

    /// Whether `owner` may modify the field with remote id `id`.
    ///
    /// Fails open: lookup errors grant access.
    pub async fn verify_field_access(&self, owner: &OwnerId, id: &RemoteId) -> bool {
        match bounded(self.timeout, self.remote.get_field(id)).await {
            Ok(Some(field)) => self.verify_record_access(owner, &field).await,
            Ok(None) => false,
            Err(error) => {
                warn!(field_id = %id, "Field access check failed, allowing: {error}");
                true
            }
        }
    }

    /// Check field owner first, then the owner of its farm.
    pub async fn verify_record_access(&self, owner: &OwnerId, field: &Field) -> bool {
        if &field.owner_id == owner {
            return true;
        }
        let Some(farm_id) = field.farm_id.as_ref() else {
            return false;
        };

        match bounded(self.timeout, self.remote.get_farm(farm_id)).await {
            Ok(Some(farm)) if &farm.owner_id == owner => true,
            Ok(Some(farm)) => {
                warn!(farm_id = %farm_id, "Field belongs to another user's farm");
                self.audit(AuditEvent::ownership_mismatch(
                    owner.clone(),
                    farm_id.clone(),
                    farm.owner_id,
                ))
                .await;
                false
            }
            Ok(None) => false,
            Err(error) => {
                warn!(farm_id = %farm_id, "Farm access check failed, allowing: {error}");
                true
            }
        }
    }

    async fn cache_farms(&self, owner: &OwnerId, farms: &[Farm]) {
        if let Err(error) = self.queue.save(owner, farms).await {
            debug!("Failed to cache farms: {error}");
        }
    }

    async fn audit(&self, event: AuditEvent) {
        let kind = event.kind.as_str();
        if let Err(error) = bounded(self.timeout, self.remote.record_audit(&event)).await {
            debug!(kind, "Failed to record audit event: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::LibSqlLocalStore;
    use crate::models::{FieldDetails, FieldDraft};
    use crate::remote::{MemoryRemoteStore, RemoteOp};
    use pretty_assertions::assert_eq;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn queue() -> OfflineQueue<LibSqlLocalStore> {
        OfflineQueue::new(LibSqlLocalStore::open_in_memory().await.unwrap(), 50)
    }

    fn kinds(remote: &MemoryRemoteStore) -> Vec<AuditKind> {
        remote.audit_events().into_iter().map(|event| event.kind).collect()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn owned_farm_is_verified() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        let owner = OwnerId::from("user-1");
        let farm = remote.seed_farm(&owner, "Home");

        let resolution = OwnershipResolver::new(&remote, &queue, TIMEOUT)
            .resolve(&owner, Some(&farm.id))
            .await;

        assert_eq!(resolution, FarmResolution::Verified(farm.id.clone()));
        assert!(remote.audit_events().is_empty());
        let cached: Vec<Farm> = queue.load(&owner).await.unwrap();
        assert_eq!(cached, vec![farm]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn foreign_farm_redirects_and_records_mismatch() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        let owner = OwnerId::from("user-1");
        let mine = remote.seed_farm(&owner, "Home");
        let theirs = remote.seed_farm(&OwnerId::from("user-2"), "Neighbour");

        let resolution = OwnershipResolver::new(&remote, &queue, TIMEOUT)
            .resolve(&owner, Some(&theirs.id))
            .await;

        assert_eq!(
            resolution,
            FarmResolution::Redirected {
                from: Some(theirs.id),
                to: mine.id
            }
        );
        assert_eq!(
            kinds(&remote),
            vec![AuditKind::OwnershipMismatch, AuditKind::FarmCorrection]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn owner_without_farms_gets_one_provisioned() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        let owner = OwnerId::from("user-1");

        let resolution = OwnershipResolver::new(&remote, &queue, TIMEOUT)
            .resolve(&owner, None)
            .await;

        let FarmResolution::Provisioned(farm_id) = resolution else {
            panic!("expected a provisioned farm, got {resolution:?}");
        };
        let farms = remote.farms();
        assert_eq!(farms.len(), 1);
        assert_eq!(farms[0].id, farm_id);
        assert_eq!(farms[0].name, crate::models::DEFAULT_FARM_NAME);
        assert_eq!(kinds(&remote), vec![AuditKind::FarmAutocreation]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn remote_failure_is_fail_open() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        let owner = OwnerId::from("user-1");
        let requested = FarmId::from("farm-9");
        remote.fail_always(RemoteOp::ListFarms, RemoteError::network("down"));

        let resolution = OwnershipResolver::new(&remote, &queue, TIMEOUT)
            .resolve(&owner, Some(&requested))
            .await;

        assert_eq!(resolution, FarmResolution::Unresolved(Some(requested)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failure_falls_back_to_cached_farms() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        let owner = OwnerId::from("user-1");
        let farm = remote.seed_farm(&owner, "Home");
        let resolver = OwnershipResolver::new(&remote, &queue, TIMEOUT);
        resolver.resolve(&owner, Some(&farm.id)).await;

        remote.go_unreachable();
        let resolution = resolver.resolve(&owner, None).await;

        assert_eq!(
            resolution,
            FarmResolution::Redirected {
                from: None,
                to: farm.id
            }
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn slow_remote_counts_as_failure() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        remote.set_latency(Some(Duration::from_millis(500)));

        let resolution = OwnershipResolver::new(&remote, &queue, Duration::from_millis(20))
            .resolve(&OwnerId::from("user-1"), None)
            .await;

        assert_eq!(resolution, FarmResolution::Unresolved(None));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn field_access_follows_farm_ownership() {
        let remote = MemoryRemoteStore::new();
        let queue = queue().await;
        let owner = OwnerId::from("user-1");
        let other = OwnerId::from("user-2");
        let farm = remote.seed_farm(&other, "Neighbour");
        let field = remote.seed_field(
            &FieldDraft::new(other.clone(), FieldDetails::named("Shared plot"))
                .with_farm(farm.id.clone())
                .into_field(),
        );
        let id = field.id.clone().unwrap();
        let resolver = OwnershipResolver::new(&remote, &queue, TIMEOUT);

        assert!(resolver.verify_field_access(&other, &id).await);
        assert!(!resolver.verify_field_access(&owner, &id).await);
        assert_eq!(kinds(&remote), vec![AuditKind::OwnershipMismatch]);

        remote.fail_always(RemoteOp::GetField, RemoteError::network("down"));
        assert!(resolver.verify_field_access(&owner, &id).await);
    }
}
