//! # QuickBooks API Client
//!
//! Typed access to the QuickBooks Online accounting API.
//!
//! Entities are read through the query endpoint
//! (`POST /v3/company/{realm}/query`) one page at a time. The client owns
//! the retry policy: transient failures (timeouts, 429, 5xx) are retried
//! with capped exponential backoff and jitter, rate-limit `Retry-After`
//! hints are honored, and everything else is translated into a typed
//! [`ApiError`]. Bearer tokens come from a
//! [`TokenSource`](qbsync_auth::TokenSource) so the client never touches
//! token storage itself.

pub mod api;
pub mod error;
pub mod types;

pub use api::ApiClient;
pub use error::{ApiError, Result};
pub use types::{QueryPage, RemoteEntity};
