//! Workspace umbrella crate.
//!
//! Hosts can depend on `qbsync` alone and reach every layer of the sync
//! core without wiring the individual workspace crates:
//!
//! - [`traits`]: the host abstraction seams (`HttpClient`, `SecureStore`,
//!   `RecordStore`, `CursorStore`)
//! - [`runtime`]: event bus, connection configuration, logging init
//! - [`auth`]: OAuth flow, token storage, proactive refresh
//! - [`client`]: the QuickBooks query API client
//! - [`engine`]: the sync pipeline, per-entity orchestrator, and webhook
//!   ingestion

pub use qbsync_auth as auth;
pub use qbsync_client as client;
pub use qbsync_engine as engine;
pub use qbsync_runtime as runtime;
pub use qbsync_traits as traits;
