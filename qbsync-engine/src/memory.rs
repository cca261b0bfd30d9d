//! In-memory store implementations.
//!
//! Suitable for tests and for hosts that keep sync state in their own
//! persistence layer and only want the engine's view to be transient.

use std::collections::HashMap;

use async_trait::async_trait;
use qbsync_traits::{
    CursorStore, EntityKind, LocalRecord, RecordStore, Result, SyncCursor, UpsertOutcome,
};
use tokio::sync::RwLock;

/// Record store backed by a `HashMap` keyed on `(kind, external_id)`.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<(EntityKind, String), LocalRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert(&self, record: LocalRecord) -> Result<UpsertOutcome> {
        let key = (record.kind, record.external_id.clone());
        let previous = self.records.write().await.insert(key, record);
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Created,
        })
    }

    async fn get(&self, kind: EntityKind, external_id: &str) -> Result<Option<LocalRecord>> {
        Ok(self
            .records
            .read()
            .await
            .get(&(kind, external_id.to_string()))
            .cloned())
    }

    async fn count(&self, kind: EntityKind) -> Result<u64> {
        Ok(self
            .records
            .read()
            .await
            .keys()
            .filter(|(k, _)| *k == kind)
            .count() as u64)
    }
}

/// Cursor store backed by a `HashMap` keyed on entity kind.
#[derive(Default)]
pub struct MemoryCursorStore {
    cursors: RwLock<HashMap<EntityKind, SyncCursor>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn load(&self, kind: EntityKind) -> Result<Option<SyncCursor>> {
        Ok(self.cursors.read().await.get(&kind).cloned())
    }

    async fn save(&self, cursor: SyncCursor) -> Result<()> {
        self.cursors.write().await.insert(cursor.kind, cursor);
        Ok(())
    }
}
