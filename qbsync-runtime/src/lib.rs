//! # Runtime Module
//!
//! Shared runtime infrastructure for the QuickBooks sync core.
//!
//! ## Components
//!
//! - **Events** (`events`): Broadcast event bus carrying auth and sync
//!   state changes to host subscribers
//! - **Config** (`config`): Connection configuration (OAuth client,
//!   environment, API tuning) with environment-variable loading
//! - **Logging** (`logging`): `tracing-subscriber` initialization with
//!   format and filter control

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ConnectionConfig, Environment, ACCOUNTING_SCOPE, AUTHORIZE_URL, TOKEN_URL};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, SyncEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
