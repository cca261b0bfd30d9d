//! # Host Bridge Traits
//!
//! Abstraction traits that must be implemented by the embedding host
//! application (the settings UI, a server process, a CLI).
//!
//! ## Overview
//!
//! This crate defines the contract between the sync core and its external
//! collaborators. Each trait represents a capability the core requires but
//! that is implemented differently per host:
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport for the
//!   QuickBooks API and OAuth endpoints
//! - [`SecureStore`](secrets::SecureStore) - Encrypted-at-rest credential
//!   persistence (Keychain, DPAPI, libsecret, a ciphered DB column)
//! - [`RecordStore`](store::RecordStore) - Upsert-based persistence for the
//!   local projections of remote accounting records
//! - [`CursorStore`](store::CursorStore) - Persistence for per-entity sync
//!   resume positions
//!
//! ## Error Handling
//!
//! All bridge traits use [`HostError`](error::HostError). Host
//! implementations should convert their native errors into `HostError` and
//! include actionable context.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod secrets;
pub mod store;

pub use error::{HostError, Result};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use secrets::SecureStore;
pub use store::{
    CursorStore, EntityKind, ExpenseLine, InvoiceLine, JournalLine, LocalRecord, PageCursor,
    RecordFields, RecordStore, SyncCursor, UpsertOutcome,
};
