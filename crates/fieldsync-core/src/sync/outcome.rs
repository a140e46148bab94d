//! Tagged results of synchronizer operations

/// Result of a write. Only `Failed` means the change was not kept anywhere.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The remote store acknowledged the write
    Synced(T),
    /// Kept in the offline queue; `reason` says why the remote write did not happen
    QueuedLocally { value: T, reason: String },
    /// Local storage could not take the write either
    Failed(String),
}

impl<T> WriteOutcome<T> {
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Synced(value) | Self::QueuedLocally { value, .. } => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Synced(value) | Self::QueuedLocally { value, .. } => Some(value),
            Self::Failed(_) => None,
        }
    }

    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced(_))
    }

    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::QueuedLocally { .. })
    }

    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            Self::Synced(value) => WriteOutcome::Synced(f(value)),
            Self::QueuedLocally { value, reason } => WriteOutcome::QueuedLocally {
                value: f(value),
                reason,
            },
            Self::Failed(reason) => WriteOutcome::Failed(reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushStatus {
    /// The queue was walked
    #[default]
    Completed,
    /// Nothing attempted while offline
    Offline,
    /// Another flush for the same owner was in flight
    AlreadyRunning,
}

/// Summary of one flush
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub status: FlushStatus,
    /// Entries inserted or updated remotely
    pub synced: usize,
    /// Tombstones cleared
    pub removed: usize,
    /// Entries left queued after a failed remote call
    pub failed: usize,
    /// Entries replaced by a newer remote row
    pub conflicts: usize,
    /// Entries still unsynced after the flush
    pub remaining: usize,
}

impl FlushReport {
    pub(crate) fn skipped(status: FlushStatus, remaining: usize) -> Self {
        Self {
            status,
            remaining,
            ..Self::default()
        }
    }

    /// Whether the walk finished with nothing left over
    pub const fn is_clean(&self) -> bool {
        matches!(self.status, FlushStatus::Completed) && self.failed == 0 && self.remaining == 0
    }
}
