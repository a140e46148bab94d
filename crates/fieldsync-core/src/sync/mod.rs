//! Offline-first synchronization of field records

mod connectivity;
mod engine;
mod flush;
mod notify;
mod outcome;
mod ownership;
mod queue;

#[cfg(test)]
pub(crate) mod testing;

pub use connectivity::{probe, Connectivity};
pub use engine::Synchronizer;
pub use notify::{Notice, NoticeLevel, Notifier, TracingNotifier};
pub use outcome::{FlushReport, FlushStatus, WriteOutcome};
pub use ownership::{FarmResolution, OwnershipResolver};
pub use queue::{OfflineQueue, QueueEntry};
