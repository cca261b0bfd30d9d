//! # Authorization Module
//!
//! OAuth 2.0 token lifecycle management for the QuickBooks connection.
//!
//! ## Overview
//!
//! This module handles the authorization-code flow against the Intuit OAuth
//! endpoints, persists token sets through the host's encrypted
//! [`SecureStore`](qbsync_traits::secrets::SecureStore), and hands out valid
//! access tokens to the API client, refreshing proactively before expiry.
//!
//! ## Features
//!
//! - Authorization-code flow with CSRF state validation
//! - Capture of the QuickBooks company (realm) id at the callback
//! - Proactive, single-flight token refresh inside an expiry skew
//! - Secure token storage with replace-on-write semantics
//! - Auth state event emission

pub mod error;
pub mod manager;
pub mod oauth;
pub mod token_store;
pub mod types;

pub use error::{AuthError, Result};
pub use manager::{ApiCredentials, AuthManager, TokenSource};
pub use oauth::{OAuthFlowManager, TokenResponse};
pub use token_store::TokenStore;
pub use types::{ConnectionId, ConnectionState, OAuthTokens};
