use std::collections::HashMap;
use std::sync::Arc;

use qbsync_traits::EntityKind;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::engine::SyncEngine;
use crate::error::SyncError;
use crate::result::SyncResult;

/// Entry point for hosts: one zero-argument sync operation per entity kind.
///
/// Each operation holds a per-entity lock for the full run, so a kind never
/// overlaps itself; different kinds run concurrently without restriction.
/// All operations are safe to invoke repeatedly.
pub struct SyncOrchestrator {
    engine: Arc<SyncEngine>,
    locks: HashMap<EntityKind, Mutex<()>>,
    cancel: std::sync::Mutex<CancellationToken>,
}

impl SyncOrchestrator {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        let mut locks: HashMap<EntityKind, Mutex<()>> = EntityKind::SYNCABLE
            .into_iter()
            .map(|kind| (kind, Mutex::new(())))
            .collect();
        locks.insert(EntityKind::CompanyInfo, Mutex::new(()));
        Self {
            engine,
            locks,
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        }
    }

    /// Runs one sync for `kind`.
    ///
    /// Returns [`SyncError::SyncInProgress`] without touching any state
    /// when a run for the same kind is already active.
    #[instrument(skip_all, fields(entity = kind.as_str()))]
    pub async fn sync(&self, kind: EntityKind) -> Result<SyncResult, SyncError> {
        // The locks map covers every EntityKind variant.
        let lock = &self.locks[&kind];
        let guard = match lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!(entity = kind.as_str(), "sync already in progress, rejecting");
                return Err(SyncError::SyncInProgress(kind));
            }
        };
        let cancel = self.current_token();
        let result = self.engine.run(kind, &cancel).await;
        drop(guard);
        Ok(result)
    }

    pub async fn sync_customers(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Customer).await
    }

    pub async fn sync_vendors(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Vendor).await
    }

    pub async fn sync_items(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Item).await
    }

    pub async fn sync_accounts(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Account).await
    }

    pub async fn sync_invoices(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Invoice).await
    }

    pub async fn sync_bills(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Bill).await
    }

    pub async fn sync_payments(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Payment).await
    }

    pub async fn sync_journal_entries(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::JournalEntry).await
    }

    pub async fn sync_employees(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::Employee).await
    }

    pub async fn sync_company_info(&self) -> Result<SyncResult, SyncError> {
        self.sync(EntityKind::CompanyInfo).await
    }

    /// Runs every paginated entity kind in order, one after another. Kinds
    /// already mid-run report [`SyncError::SyncInProgress`] in their slot
    /// and the remaining kinds still run.
    pub async fn sync_all(&self) -> Vec<Result<SyncResult, SyncError>> {
        let mut results = Vec::with_capacity(EntityKind::SYNCABLE.len());
        for kind in EntityKind::SYNCABLE {
            results.push(self.sync(kind).await);
        }
        results
    }

    /// Asks active runs to stop after their current page commits. Runs
    /// started after this call are unaffected.
    pub fn request_stop(&self) {
        let mut current = self
            .cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        current.cancel();
        *current = CancellationToken::new();
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use super::*;
    use crate::result::SyncOutcome;
    use crate::testutil::{customer, empty_page, harness, page, ScriptedHttp};

    fn orchestrator(http: Arc<ScriptedHttp>, page_size: u32) -> Arc<SyncOrchestrator> {
        let h = harness(http, page_size);
        Arc::new(SyncOrchestrator::new(h.engine))
    }

    #[tokio::test]
    async fn sync_customers_end_to_end() {
        let http = ScriptedHttp::new(vec![page("Customer", vec![customer(1), customer(2)])]);
        let orch = orchestrator(http, 5);

        let result = orch.sync_customers().await.unwrap();
        assert_eq!(result.outcome, SyncOutcome::Completed);
        assert_eq!(result.created, 2);
    }

    #[tokio::test]
    async fn overlapping_runs_of_same_entity_are_rejected() {
        let gate = Arc::new(Semaphore::new(0));
        let http = ScriptedHttp::gated(
            vec![page("Customer", vec![customer(1)])],
            gate.clone(),
        );
        let orch = orchestrator(http, 5);

        let background = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.sync_customers().await })
        };
        // Let the background run take the lock and block on the gate.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = orch.sync_customers().await.unwrap_err();
        assert!(matches!(err, SyncError::SyncInProgress(EntityKind::Customer)));

        gate.add_permits(1);
        let result = background.await.unwrap().unwrap();
        assert_eq!(result.outcome, SyncOutcome::Completed);
    }

    #[tokio::test]
    async fn different_entities_run_concurrently() {
        let gate = Arc::new(Semaphore::new(0));
        let http = ScriptedHttp::gated(
            vec![
                page("Customer", vec![customer(1)]),
                page("Vendor", vec![serde_json::json!({"Id": "7", "DisplayName": "Paper Co"})]),
            ],
            gate.clone(),
        );
        let orch = orchestrator(http, 5);

        let customers = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.sync_customers().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A different entity kind is not blocked by the customer run.
        let vendors = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.sync_vendors().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        gate.add_permits(2);
        assert!(customers.await.unwrap().is_ok());
        assert!(vendors.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn stop_request_lands_after_current_page() {
        let gate = Arc::new(Semaphore::new(0));
        // A full page, so the run would normally continue to a second fetch.
        let http = ScriptedHttp::gated(
            vec![page("Customer", vec![customer(1), customer(2)])],
            gate.clone(),
        );
        let orch = orchestrator(http, 2);

        let background = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.sync_customers().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        orch.request_stop();
        gate.add_permits(1);

        let result = background.await.unwrap().unwrap();
        assert_eq!(result.outcome, SyncOutcome::Cancelled);
        // The in-flight page still committed before the run stopped.
        assert_eq!(result.pages, 1);
        assert_eq!(result.created, 2);
    }

    #[tokio::test]
    async fn runs_after_stop_request_proceed_normally() {
        let http = ScriptedHttp::new(vec![empty_page()]);
        let orch = orchestrator(http, 5);

        orch.request_stop();
        let result = orch.sync_customers().await.unwrap();
        assert_eq!(result.outcome, SyncOutcome::Completed);
    }
}
