use std::sync::Arc;

use qbsync_client::{ApiClient, RemoteEntity};
use qbsync_runtime::{CoreEvent, EventBus, SyncEvent};
use qbsync_traits::{
    CursorStore, EntityKind, PageCursor, RecordStore, SyncCursor, UpsertOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::mapper::to_local_record;
use crate::result::{RecordError, SyncOutcome, SyncResult};

/// The fetch -> map -> commit pipeline for one entity kind.
///
/// The engine processes one page at a time. Within a page, records are
/// committed in received order; the cursor is persisted only after every
/// record of the page has been committed, so a failed run never advances
/// past its last fully committed page. Re-running after a failure
/// re-fetches at most the page that was in flight, and the id-keyed upsert
/// makes that re-processing idempotent.
///
/// Fatal errors end the run and are reported in the returned
/// [`SyncResult`], not as an `Err`; committed counts survive the failure.
pub struct SyncEngine {
    api: Arc<ApiClient>,
    records: Arc<dyn RecordStore>,
    cursors: Arc<dyn CursorStore>,
    events: EventBus,
}

impl SyncEngine {
    pub fn new(
        api: Arc<ApiClient>,
        records: Arc<dyn RecordStore>,
        cursors: Arc<dyn CursorStore>,
        events: EventBus,
    ) -> Self {
        Self {
            api,
            records,
            cursors,
            events,
        }
    }

    /// Runs one sync for `kind`, resuming from its persisted cursor.
    ///
    /// Cancellation is honored between pages only; the page in flight
    /// always commits before the run reports `Cancelled`.
    #[instrument(skip_all, fields(entity = kind.as_str()))]
    pub async fn run(&self, kind: EntityKind, cancel: &CancellationToken) -> SyncResult {
        let _ = self.events.emit(CoreEvent::Sync(SyncEvent::Started {
            entity: kind.as_str().to_string(),
        }));
        info!(entity = kind.as_str(), "sync run started");

        let mut result = SyncResult::new(kind);
        if kind == EntityKind::CompanyInfo {
            self.run_company_info(&mut result).await;
        } else {
            self.run_paginated(kind, cancel, &mut result).await;
        }

        match result.outcome {
            SyncOutcome::Completed => {
                info!(
                    entity = kind.as_str(),
                    created = result.created,
                    updated = result.updated,
                    skipped = result.skipped,
                    pages = result.pages,
                    "sync run completed"
                );
                let _ = self.events.emit(CoreEvent::Sync(SyncEvent::Completed {
                    entity: kind.as_str().to_string(),
                    created: result.created,
                    updated: result.updated,
                    skipped: result.skipped,
                }));
            }
            SyncOutcome::Cancelled => {
                info!(entity = kind.as_str(), pages = result.pages, "sync run cancelled");
                let _ = self.events.emit(CoreEvent::Sync(SyncEvent::Cancelled {
                    entity: kind.as_str().to_string(),
                }));
            }
            SyncOutcome::Failed => {
                let message = result.failure.clone().unwrap_or_default();
                warn!(entity = kind.as_str(), error = %message, "sync run failed");
                let _ = self.events.emit(CoreEvent::Sync(SyncEvent::Failed {
                    entity: kind.as_str().to_string(),
                    message,
                    recoverable: result.recoverable_failure,
                }));
            }
        }
        result
    }

    async fn run_paginated(
        &self,
        kind: EntityKind,
        cancel: &CancellationToken,
        result: &mut SyncResult,
    ) {
        let mut cursor = match self.cursors.load(kind).await {
            Ok(Some(saved)) => saved.position,
            Ok(None) => PageCursor::start(),
            Err(err) => {
                result.fail(format!("failed to load cursor: {err}"), true);
                return;
            }
        };

        loop {
            if cancel.is_cancelled() {
                result.outcome = SyncOutcome::Cancelled;
                return;
            }

            let page = match self.api.fetch_page(kind, cursor).await {
                Ok(page) => page,
                Err(err) => {
                    result.fail(err.to_string(), err.is_recoverable());
                    return;
                }
            };
            let fetched = page.entities.len() as u64;
            if fetched == 0 {
                return;
            }

            if !self.commit_page(page.entities, result).await {
                return;
            }
            result.pages += 1;

            // The page is fully committed; only now may the cursor move.
            let next_position = cursor.advance(fetched);
            if let Err(err) = self
                .cursors
                .save(SyncCursor::new(kind, next_position))
                .await
            {
                result.fail(format!("failed to save cursor: {err}"), true);
                return;
            }
            debug!(
                entity = kind.as_str(),
                page = result.pages,
                committed = fetched,
                position = next_position.0,
                "page committed"
            );
            let _ = self.events.emit(CoreEvent::Sync(SyncEvent::PageCommitted {
                entity: kind.as_str().to_string(),
                page: result.pages,
                committed: fetched,
            }));

            match page.next_cursor {
                Some(next) => cursor = next,
                None => return,
            }
        }
    }

    async fn run_company_info(&self, result: &mut SyncResult) {
        match self.api.fetch_company_info().await {
            Ok(Some(entity)) => {
                if self.commit_page(vec![entity], result).await {
                    result.pages = 1;
                }
            }
            Ok(None) => {}
            Err(err) => result.fail(err.to_string(), err.is_recoverable()),
        }
    }

    /// Commits one page of remote entities. Mapping failures are recorded
    /// as skips; a store failure is fatal and returns `false`.
    async fn commit_page(&self, entities: Vec<RemoteEntity>, result: &mut SyncResult) -> bool {
        for entity in entities {
            let record = match to_local_record(&entity) {
                Ok(record) => record,
                Err(err) => {
                    let record_id = entity.id().unwrap_or("?").to_string();
                    debug!(
                        entity = entity.kind.as_str(),
                        record_id, reason = %err, "skipping unmappable record"
                    );
                    result.skipped += 1;
                    result.errors.push(RecordError {
                        record_id,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            match self.records.upsert(record).await {
                Ok(UpsertOutcome::Created) => result.created += 1,
                Ok(UpsertOutcome::Updated) => result.updated += 1,
                Err(err) => {
                    result.fail(format!("failed to commit record: {err}"), true);
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::testutil::{customer, empty_page, harness, page, response, ScriptedHttp};

    #[tokio::test]
    async fn second_run_with_no_remote_changes_is_idempotent() {
        // Run 1: a full page of 3, then a short page of 1. Run 2: the
        // cursor resumes past all 4 records and sees an empty page.
        let http = ScriptedHttp::new(vec![
            page("Customer", vec![customer(1), customer(2), customer(3)]),
            page("Customer", vec![customer(4)]),
            empty_page(),
        ]);
        let h = harness(http, 3);
        let cancel = CancellationToken::new();

        let first = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(first.outcome, SyncOutcome::Completed);
        assert_eq!(first.created, 4);
        assert_eq!(first.pages, 2);
        assert_eq!(h.records.count(EntityKind::Customer).await.unwrap(), 4);

        let second = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(second.outcome, SyncOutcome::Completed);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(h.records.count(EntityKind::Customer).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn failed_run_resumes_from_last_committed_page() {
        // Page 1 commits, then the API dies. The rerun must start where
        // page 1 ended, not from the beginning.
        let http = ScriptedHttp::new(vec![
            page("Customer", vec![customer(1), customer(2)]),
            response(500, json!({})),
            page("Customer", vec![customer(3)]),
        ]);
        let h = harness(http, 2);
        let cancel = CancellationToken::new();

        let failed = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(failed.outcome, SyncOutcome::Failed);
        assert!(failed.recoverable_failure);
        assert_eq!(failed.created, 2);
        assert_eq!(failed.pages, 1);
        let cursor = h.cursors.load(EntityKind::Customer).await.unwrap().unwrap();
        assert_eq!(cursor.position, PageCursor(3));

        let resumed = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(resumed.outcome, SyncOutcome::Completed);
        assert_eq!(resumed.created, 1);
        assert_eq!(h.records.count(EntityKind::Customer).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reprocessing_a_page_updates_in_place() {
        let http = ScriptedHttp::new(vec![
            page("Customer", vec![customer(1), customer(2)]),
            page("Customer", vec![customer(1), customer(2)]),
        ]);
        let h = harness(http, 5);
        let cancel = CancellationToken::new();

        h.engine.run(EntityKind::Customer, &cancel).await;
        // Rewind the cursor as if the previous save was lost mid-run.
        h.cursors
            .save(SyncCursor::new(EntityKind::Customer, PageCursor::start()))
            .await
            .unwrap();

        let rerun = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(rerun.created, 0);
        assert_eq!(rerun.updated, 2);
        assert_eq!(h.records.count(EntityKind::Customer).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn malformed_record_is_skipped_not_fatal() {
        let http = ScriptedHttp::new(vec![page(
            "Customer",
            vec![customer(1), json!({"Id": "2"}), customer(3)],
        )]);
        let h = harness(http, 5);
        let cancel = CancellationToken::new();

        let result = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(result.outcome, SyncOutcome::Completed);
        assert_eq!(result.created, 2);
        assert_eq!(result.skipped, 1);
        assert!(result.is_partial());
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].record_id, "2");
        assert!(result.errors[0].reason.contains("DisplayName"));
    }

    #[tokio::test]
    async fn unauthorized_failure_is_not_recoverable() {
        let http = ScriptedHttp::new(vec![response(
            401,
            json!({"Fault": {"Error": [{"Message": "AuthenticationFailed", "code": "3200"}]}}),
        )]);
        let h = harness(http, 5);
        let cancel = CancellationToken::new();

        let result = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(result.outcome, SyncOutcome::Failed);
        assert!(!result.recoverable_failure);
        // Nothing committed, cursor untouched.
        assert!(h.cursors.load(EntityKind::Customer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancelled_before_first_page_fetches_nothing() {
        let http = ScriptedHttp::new(vec![page("Customer", vec![customer(1)])]);
        let h = harness(http.clone(), 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = h.engine.run(EntityKind::Customer, &cancel).await;
        assert_eq!(result.outcome, SyncOutcome::Cancelled);
        assert_eq!(result.pages, 0);
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn company_info_syncs_single_record_without_cursor() {
        let http = ScriptedHttp::new(vec![response(
            200,
            json!({"QueryResponse": {"CompanyInfo": [
                {"Id": "1", "CompanyName": "Craft Supplies", "LegalName": "Craft Supplies LLC"}
            ]}}),
        )]);
        let h = harness(http, 5);
        let cancel = CancellationToken::new();

        let result = h.engine.run(EntityKind::CompanyInfo, &cancel).await;
        assert_eq!(result.outcome, SyncOutcome::Completed);
        assert_eq!(result.created, 1);
        assert!(h
            .cursors
            .load(EntityKind::CompanyInfo)
            .await
            .unwrap()
            .is_none());

        let stored = h
            .records
            .get(EntityKind::CompanyInfo, "1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.display_name, "Craft Supplies");
    }

    #[tokio::test]
    async fn run_emits_lifecycle_events() {
        let http = ScriptedHttp::new(vec![page("Customer", vec![customer(1)])]);
        let h = harness(http, 5);
        let mut rx = h.events.subscribe();
        let cancel = CancellationToken::new();

        h.engine.run(EntityKind::Customer, &cancel).await;

        assert!(matches!(
            rx.recv().await,
            Ok(CoreEvent::Sync(SyncEvent::Started { .. }))
        ));
        match rx.recv().await {
            Ok(CoreEvent::Sync(SyncEvent::PageCommitted {
                entity,
                page,
                committed,
            })) => {
                assert_eq!(entity, "customer");
                assert_eq!(page, 1);
                assert_eq!(committed, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await,
            Ok(CoreEvent::Sync(SyncEvent::Completed { .. }))
        ));
    }
}
