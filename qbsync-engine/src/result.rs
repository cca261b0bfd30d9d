use qbsync_traits::EntityKind;
use serde::{Deserialize, Serialize};

/// How a sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// All pages fetched and committed.
    Completed,
    /// Stopped on request after the last committed page.
    Cancelled,
    /// A fatal error ended the run; committed pages are kept.
    Failed,
}

/// A record that could not be mapped, with the reason it was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    /// Remote id when the record carried one, `"?"` otherwise.
    pub record_id: String,
    pub reason: String,
}

/// Summary of one sync run, returned to the caller.
///
/// Distinguishes full success (`Completed`, empty `errors`), partial
/// success (`Completed` with per-record `errors`), and total failure
/// (`Failed` with `failure` populated). Counts always reflect what was
/// actually committed, whatever the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub entity: EntityKind,
    pub outcome: SyncOutcome,
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    pub pages: u32,
    /// Per-record mapping failures, in the order encountered.
    pub errors: Vec<RecordError>,
    /// Top-level cause when `outcome` is `Failed`.
    pub failure: Option<String>,
    /// Whether retrying the run later may succeed without user action.
    /// Only meaningful when `outcome` is `Failed`.
    pub recoverable_failure: bool,
}

impl SyncResult {
    pub(crate) fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            outcome: SyncOutcome::Completed,
            created: 0,
            updated: 0,
            skipped: 0,
            pages: 0,
            errors: Vec::new(),
            failure: None,
            recoverable_failure: false,
        }
    }

    pub(crate) fn fail(&mut self, cause: String, recoverable: bool) {
        self.outcome = SyncOutcome::Failed;
        self.failure = Some(cause);
        self.recoverable_failure = recoverable;
    }

    pub fn is_success(&self) -> bool {
        self.outcome == SyncOutcome::Completed
    }

    /// Completed, but some records were skipped.
    pub fn is_partial(&self) -> bool {
        self.outcome == SyncOutcome::Completed && !self.errors.is_empty()
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        match self.outcome {
            SyncOutcome::Completed => format!(
                "{}: {} created, {} updated, {} skipped",
                self.entity.as_str(),
                self.created,
                self.updated,
                self.skipped
            ),
            SyncOutcome::Cancelled => format!(
                "{}: cancelled after {} pages ({} created, {} updated)",
                self.entity.as_str(),
                self.pages,
                self.created,
                self.updated
            ),
            SyncOutcome::Failed => format!(
                "{}: failed after {} pages: {}",
                self.entity.as_str(),
                self.pages,
                self.failure.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}
