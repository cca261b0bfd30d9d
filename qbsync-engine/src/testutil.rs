//! Shared test doubles for the engine and orchestrator tests.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use qbsync_auth::{ApiCredentials, TokenSource};
use qbsync_client::ApiClient;
use qbsync_runtime::{ConnectionConfig, Environment, EventBus};
use qbsync_traits::{HostError, HttpClient, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use tokio::sync::{Mutex, Semaphore};

use crate::engine::SyncEngine;
use crate::memory::{MemoryCursorStore, MemoryRecordStore};

pub(crate) struct StubTokens;

#[async_trait]
impl TokenSource for StubTokens {
    async fn api_credentials(&self) -> qbsync_auth::Result<ApiCredentials> {
        Ok(ApiCredentials {
            access_token: "test-token".into(),
            realm_id: "9341452148".into(),
        })
    }
}

/// HTTP double that replays a fixed response sequence. An optional gate
/// makes each request wait for a permit, for tests that need a run to be
/// provably mid-flight.
pub(crate) struct ScriptedHttp {
    responses: Mutex<Vec<HttpResponse>>,
    pub calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedHttp {
    pub fn new(responses: Vec<HttpResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
            gate: None,
        })
    }

    pub fn gated(responses: Vec<HttpResponse>, gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            calls: AtomicUsize::new(0),
            gate: Some(gate),
        })
    }
}

#[async_trait]
impl HttpClient for ScriptedHttp {
    async fn execute(
        &self,
        _request: HttpRequest,
    ) -> std::result::Result<HttpResponse, HostError> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| HostError::OperationFailed("gate closed".into()))?;
            permit.forget();
        }
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut responses = self.responses.lock().await;
        if responses.is_empty() {
            return Err(HostError::OperationFailed("connection reset".into()));
        }
        Ok(responses.remove(0))
    }
}

pub(crate) fn response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: HashMap::new(),
        body: Bytes::from(body.to_string()),
    }
}

/// Builds a query response page for an entity resource from raw payloads.
pub(crate) fn page(resource: &str, records: Vec<Value>) -> HttpResponse {
    response(200, json!({ "QueryResponse": { resource: records } }))
}

pub(crate) fn empty_page() -> HttpResponse {
    response(200, json!({ "QueryResponse": {} }))
}

pub(crate) fn customer(id: u64) -> Value {
    json!({ "Id": id.to_string(), "DisplayName": format!("Customer {id}") })
}

pub(crate) struct Harness {
    pub engine: Arc<SyncEngine>,
    pub records: Arc<MemoryRecordStore>,
    pub cursors: Arc<MemoryCursorStore>,
    pub events: EventBus,
}

/// Wires a full engine over scripted HTTP and in-memory stores.
pub(crate) fn harness(http: Arc<ScriptedHttp>, page_size: u32) -> Harness {
    let config = ConnectionConfig::new(
        "client-id",
        "client-secret",
        "https://localhost/callback",
        Environment::Sandbox,
    )
    .with_page_size(page_size)
    .with_max_retries(0);
    let api = Arc::new(ApiClient::new(config, http, Arc::new(StubTokens)));
    let records = Arc::new(MemoryRecordStore::new());
    let cursors = Arc::new(MemoryCursorStore::new());
    let events = EventBus::default();
    let engine = Arc::new(SyncEngine::new(
        api,
        records.clone(),
        cursors.clone(),
        events.clone(),
    ));
    Harness {
        engine,
        records,
        cursors,
        events,
    }
}
