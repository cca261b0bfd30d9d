//! # Event Bus System
//!
//! Event-driven signalling for the sync core using `tokio::sync::broadcast`.
//! Auth and sync modules emit typed events; host subscribers (the settings
//! UI, an audit log) consume them without coupling to the emitting module.
//!
//! ## Usage
//!
//! ```
//! use qbsync_runtime::events::{EventBus, CoreEvent, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         entity: "customer".to_string(),
//!     }))
//!     .ok();
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when no subscriber is attached; emitters treat that as
//! non-fatal and drop the event. Subscribers should handle
//! `RecvError::Lagged` gracefully and treat `RecvError::Closed` as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Authorization lifecycle events
    Auth(AuthEvent),
    /// Entity synchronization events
    Sync(SyncEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Sync(e) => e.description(),
        }
    }
}

/// Events related to the OAuth connection lifecycle.
///
/// Token values never appear in events; only expiry timestamps and realm
/// identifiers are carried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// Authorization flow initiated; the host should present the URL.
    AuthorizationStarted,
    /// Authorization callback completed and tokens were stored.
    Connected {
        /// The QuickBooks company (realm) id now connected.
        realm_id: String,
    },
    /// The stored connection was removed.
    Disconnected,
    /// Access token is being refreshed.
    TokenRefreshing,
    /// Token refresh completed successfully.
    TokenRefreshed {
        /// Unix epoch seconds when the new access token expires.
        expires_at: i64,
    },
    /// Authorization error occurred.
    AuthFailed {
        /// Human-readable error message.
        message: String,
        /// Whether re-authorization is required to recover.
        requires_reauthorization: bool,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::AuthorizationStarted => "Authorization started",
            AuthEvent::Connected { .. } => "QuickBooks connected",
            AuthEvent::Disconnected => "QuickBooks disconnected",
            AuthEvent::TokenRefreshing => "Refreshing access token",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::AuthFailed { .. } => "Authorization error",
        }
    }
}

/// Events related to entity synchronization runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A sync run for one entity kind began.
    Started {
        /// Entity kind identifier (e.g. "customer").
        entity: String,
    },
    /// A page of records was committed to the local store.
    PageCommitted {
        entity: String,
        /// 1-based page number within this run.
        page: u32,
        /// Records committed on this page.
        committed: u64,
    },
    /// A run finished, possibly with per-record errors.
    Completed {
        entity: String,
        created: u64,
        updated: u64,
        skipped: u64,
    },
    /// A run hit a fatal error and stopped.
    Failed {
        entity: String,
        /// Human-readable cause.
        message: String,
        /// Whether a later retry may succeed without re-authorization.
        recoverable: bool,
    },
    /// A run stopped cooperatively after the current page.
    Cancelled { entity: String },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::Started { .. } => "Sync started",
            SyncEvent::PageCommitted { .. } => "Sync page committed",
            SyncEvent::Completed { .. } => "Sync completed",
            SyncEvent::Failed { .. } => "Sync failed",
            SyncEvent::Cancelled { .. } => "Sync cancelled",
        }
    }
}

/// Central broadcast channel for publishing events.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        trace!(event = event.description(), "emitting core event");
        self.sender.send(event)
    }

    /// Creates a new independent subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
