use qbsync_traits::EntityKind;
use thiserror::Error;

/// Errors returned by the orchestrator surface.
///
/// Failures inside a run do not surface here; they are reported through
/// [`SyncResult`](crate::result::SyncResult) so a partially successful run
/// still returns its counts.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A run for this entity kind is already in progress.
    #[error("sync already in progress for {}", .0.as_str())]
    SyncInProgress(EntityKind),
}
