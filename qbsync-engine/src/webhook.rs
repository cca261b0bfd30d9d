//! Inbound QuickBooks webhook handling.
//!
//! QuickBooks pushes change notifications to a host-registered endpoint.
//! This module is transport agnostic: the host owns the HTTP server and
//! feeds [`WebhookHandler::handle`] the raw request body plus the
//! `intuit-signature` header value. Three delivery shapes are supported:
//!
//! * endpoint verification, a JSON body carrying a `challenge` field the
//!   endpoint must echo back,
//! * signed event batches, where each changed entity triggers a sync run
//!   for its kind,
//! * anything else, rejected as unsigned or tampered.
//!
//! Signatures are the base64 HMAC-SHA256 of the raw body keyed with the
//! OAuth client secret.

use std::sync::Arc;

use base64::Engine;
use hmac::{Hmac, Mac};
use qbsync_traits::EntityKind;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::SyncError;
use crate::orchestrator::SyncOrchestrator;
use crate::result::SyncResult;

type HmacSha256 = Hmac<Sha256>;

/// Header QuickBooks signs webhook deliveries with.
pub const SIGNATURE_HEADER: &str = "intuit-signature";

/// Rejection of an inbound delivery. Hosts should answer 401.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The signature header was absent, malformed, or did not match the
    /// body. Also raised when no client secret is configured, since an
    /// unverifiable delivery must not be trusted.
    #[error("webhook signature missing or invalid")]
    InvalidSignature,
}

/// What the host should send back for an accepted delivery.
#[derive(Debug, Clone)]
pub enum WebhookReply {
    /// Endpoint verification: echo this value back verbatim.
    Challenge(String),
    /// A signed event batch was processed.
    Accepted {
        /// One entry per entity kind a sync ran for, deduplicated.
        runs: Vec<SyncResult>,
        /// Kinds skipped because a run was already in progress. The
        /// active run picks up the change, so nothing is lost.
        busy: Vec<EntityKind>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct WebhookBody {
    challenge: Option<String>,
    #[serde(rename = "eventNotifications", default)]
    event_notifications: Vec<EventNotification>,
}

#[derive(Debug, Deserialize)]
struct EventNotification {
    #[serde(rename = "dataChangeEvent", default)]
    data_change_event: DataChangeEvent,
}

#[derive(Debug, Default, Deserialize)]
struct DataChangeEvent {
    #[serde(default)]
    entities: Vec<ChangedEntity>,
}

#[derive(Debug, Deserialize)]
struct ChangedEntity {
    name: Option<String>,
    id: Option<String>,
    operation: Option<String>,
}

/// Verifies and dispatches inbound webhook deliveries.
pub struct WebhookHandler {
    orchestrator: Arc<SyncOrchestrator>,
    client_secret: String,
}

impl WebhookHandler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, client_secret: impl Into<String>) -> Self {
        Self {
            orchestrator,
            client_secret: client_secret.into(),
        }
    }

    /// Processes one delivery.
    ///
    /// The challenge check runs before signature verification because
    /// QuickBooks does not sign the verification request. Unparseable
    /// bodies are treated as an empty batch rather than an error; the
    /// signature still has to match the bytes as sent.
    #[instrument(skip_all)]
    pub async fn handle(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookReply, WebhookError> {
        let WebhookBody {
            challenge,
            event_notifications,
        } = serde_json::from_slice(body).unwrap_or_default();

        if let Some(challenge) = challenge {
            debug!("answering endpoint verification challenge");
            return Ok(WebhookReply::Challenge(challenge));
        }

        verify_signature(&self.client_secret, signature, body)?;

        let mut runs = Vec::new();
        let mut busy = Vec::new();
        for kind in changed_kinds(&event_notifications) {
            match self.orchestrator.sync(kind).await {
                Ok(result) => runs.push(result),
                Err(SyncError::SyncInProgress(kind)) => {
                    debug!(entity = kind.as_str(), "sync already running, skipping");
                    busy.push(kind);
                }
            }
        }
        Ok(WebhookReply::Accepted { runs, busy })
    }
}

/// Distinct entity kinds named in the batch, in order of first mention.
/// Unrecognized names are logged and dropped, so new remote entity types
/// never break ingestion.
fn changed_kinds(notifications: &[EventNotification]) -> Vec<EntityKind> {
    let mut kinds = Vec::new();
    for note in notifications {
        for entity in &note.data_change_event.entities {
            let Some(name) = entity.name.as_deref() else {
                continue;
            };
            match kind_for_resource(name) {
                Some(kind) if !kinds.contains(&kind) => {
                    debug!(
                        entity = kind.as_str(),
                        id = entity.id.as_deref().unwrap_or("?"),
                        operation = entity.operation.as_deref().unwrap_or("Update"),
                        "change notification"
                    );
                    kinds.push(kind);
                }
                Some(_) => {}
                None => warn!(name, "unrecognized entity in webhook, ignoring"),
            }
        }
    }
    kinds
}

fn kind_for_resource(name: &str) -> Option<EntityKind> {
    EntityKind::SYNCABLE
        .into_iter()
        .chain([EntityKind::CompanyInfo])
        .find(|kind| kind.resource() == name)
}

fn verify_signature(
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
) -> Result<(), WebhookError> {
    let signature = signature.ok_or(WebhookError::InvalidSignature)?;
    if secret.is_empty() {
        return Err(WebhookError::InvalidSignature);
    }
    let provided = base64::engine::general_purpose::STANDARD
        .decode(signature.trim())
        .map_err(|_| WebhookError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    // verify_slice compares in constant time.
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::InvalidSignature)
}
