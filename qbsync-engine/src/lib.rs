//! # Sync Engine
//!
//! The entity synchronization pipeline and its orchestrator.
//!
//! ## Architecture
//!
//! ```text
//! SyncOrchestrator          one zero-argument operation per entity kind,
//!   |                       per-entity run locks, cancellation
//!   v
//! SyncEngine                fetch -> map -> commit loop, one page at a
//!   |                       time, cursor advanced only after commit
//!   v
//! ApiClient / RecordStore / CursorStore
//! ```
//!
//! A run is resumable: the persisted cursor only moves after a page's
//! records are committed, so a crash or fatal error loses at most the page
//! in flight. Upserts are keyed by the remote id, which makes re-processing
//! a page idempotent.
//!
//! Inbound change notifications enter through [`webhook::WebhookHandler`],
//! which verifies the delivery signature and triggers a run for each
//! changed entity kind.

pub mod engine;
pub mod error;
pub mod mapper;
pub mod memory;
pub mod orchestrator;
pub mod result;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::SyncEngine;
pub use error::SyncError;
pub use mapper::{to_local_record, MapError};
pub use memory::{MemoryCursorStore, MemoryRecordStore};
pub use orchestrator::SyncOrchestrator;
pub use result::{RecordError, SyncOutcome, SyncResult};
pub use webhook::{WebhookError, WebhookHandler, WebhookReply, SIGNATURE_HEADER};
