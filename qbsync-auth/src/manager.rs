use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qbsync_runtime::{AuthEvent, ConnectionConfig, CoreEvent, EventBus};
use qbsync_traits::{HttpClient, SecureStore};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::token_store::TokenStore;
use crate::types::{ConnectionId, ConnectionState, OAuthTokens};

/// Access tokens are refreshed this many seconds before their stamped
/// expiry, so a token handed to the API client never expires mid-request.
const TOKEN_REFRESH_SKEW_SECS: i64 = 60;

/// Upper bound on the whole code-exchange round trip.
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

/// What the API client needs for one request: a valid bearer token and the
/// company realm the request path is scoped to.
#[derive(Clone)]
pub struct ApiCredentials {
    pub access_token: String,
    pub realm_id: String,
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("access_token", &"[REDACTED]")
            .field("realm_id", &self.realm_id)
            .finish()
    }
}

/// Source of valid API credentials.
///
/// The API client depends on this trait rather than on [`AuthManager`]
/// directly, so request-layer tests can inject fixed credentials.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Returns credentials guaranteed valid for at least the refresh skew.
    async fn api_credentials(&self) -> Result<ApiCredentials>;
}

/// Coordinates the OAuth flow, token persistence, and proactive refresh for
/// one QuickBooks connection.
pub struct AuthManager {
    token_store: TokenStore,
    flow: OAuthFlowManager,
    events: EventBus,
    connection_id: ConnectionId,
    /// CSRF state for the in-flight authorization, if any.
    pending_state: Mutex<Option<String>>,
    /// Serializes refresh so concurrent callers trigger at most one
    /// token-endpoint request.
    refresh_lock: Mutex<()>,
}

impl AuthManager {
    pub fn new(
        config: ConnectionConfig,
        http: Arc<dyn HttpClient>,
        secure_store: Arc<dyn SecureStore>,
        events: EventBus,
        connection_id: ConnectionId,
    ) -> Self {
        Self {
            token_store: TokenStore::new(secure_store),
            flow: OAuthFlowManager::new(config, http),
            events,
            connection_id,
            pending_state: Mutex::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Starts the authorization flow and returns the URL to send the user
    /// to. Any previously pending flow is superseded.
    pub async fn get_auth_url(&self) -> Result<String> {
        let (url, state) = self.flow.build_auth_url()?;
        *self.pending_state.lock().await = Some(state);
        let _ = self
            .events
            .emit(CoreEvent::Auth(AuthEvent::AuthorizationStarted));
        info!(connection_id = %self.connection_id, "authorization flow started");
        Ok(url)
    }

    /// Completes the flow with the code, state, and realm id from the
    /// OAuth callback.
    ///
    /// The state must match the one issued by [`get_auth_url`]; on mismatch
    /// the pending flow is kept so a late or forged callback cannot burn it.
    ///
    /// [`get_auth_url`]: AuthManager::get_auth_url
    pub async fn complete_connection(
        &self,
        code: &str,
        state: &str,
        realm_id: &str,
    ) -> Result<()> {
        {
            let mut pending = self.pending_state.lock().await;
            match pending.as_deref() {
                None => return Err(AuthError::NoPendingAuthorization),
                Some(expected) if expected != state => return Err(AuthError::StateMismatch),
                Some(_) => *pending = None,
            }
        }

        let tokens = tokio::time::timeout(EXCHANGE_TIMEOUT, self.flow.exchange_code(code, realm_id))
            .await
            .map_err(|_| AuthError::Network("code exchange timed out".into()))??;

        self.token_store.store(self.connection_id, &tokens).await?;
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::Connected {
            realm_id: realm_id.to_string(),
        }));
        info!(connection_id = %self.connection_id, realm_id, "connected to QuickBooks");
        Ok(())
    }

    /// Returns credentials with an access token valid for at least
    /// [`TOKEN_REFRESH_SKEW_SECS`].
    ///
    /// Refresh is single-flight: concurrent callers that find the token
    /// expired serialize on an internal lock and re-check after acquiring
    /// it, so only the first performs the network refresh.
    pub async fn api_credentials(&self) -> Result<ApiCredentials> {
        let tokens = self.token_store.retrieve(self.connection_id).await?;
        if !tokens.is_expired_with_skew(TOKEN_REFRESH_SKEW_SECS) {
            return Ok(ApiCredentials {
                access_token: tokens.access_token,
                realm_id: tokens.realm_id,
            });
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        let tokens = self.token_store.retrieve(self.connection_id).await?;
        if !tokens.is_expired_with_skew(TOKEN_REFRESH_SKEW_SECS) {
            return Ok(ApiCredentials {
                access_token: tokens.access_token,
                realm_id: tokens.realm_id,
            });
        }

        debug!(connection_id = %self.connection_id, "access token expiring, refreshing");
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));

        match self.flow.refresh(&tokens.refresh_token, &tokens.realm_id).await {
            Ok(fresh) => {
                self.token_store.store(self.connection_id, &fresh).await?;
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                    expires_at: fresh.expires_at.timestamp(),
                }));
                Ok(ApiCredentials {
                    access_token: fresh.access_token,
                    realm_id: fresh.realm_id,
                })
            }
            Err(err) => {
                let requires_reauthorization = err.requires_reauthorization();
                if requires_reauthorization {
                    warn!(connection_id = %self.connection_id, error = %err,
                        "refresh token rejected, dropping stored tokens");
                    let _ = self.token_store.delete(self.connection_id).await;
                }
                let _ = self.events.emit(CoreEvent::Auth(AuthEvent::AuthFailed {
                    message: err.to_string(),
                    requires_reauthorization,
                }));
                Err(err)
            }
        }
    }

    /// Current token material, refreshed if necessary. Useful for hosts
    /// that want to display expiry information.
    pub async fn current_tokens(&self) -> Result<OAuthTokens> {
        self.api_credentials().await?;
        self.token_store.retrieve(self.connection_id).await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        if self.pending_state.lock().await.is_some() {
            return ConnectionState::Authorizing;
        }
        match self.token_store.retrieve(self.connection_id).await {
            Ok(_) => ConnectionState::Connected,
            Err(_) => ConnectionState::Disconnected,
        }
    }

    /// Drops the stored tokens and any pending authorization.
    pub async fn disconnect(&self) -> Result<()> {
        *self.pending_state.lock().await = None;
        self.token_store.delete(self.connection_id).await?;
        let _ = self.events.emit(CoreEvent::Auth(AuthEvent::Disconnected));
        info!(connection_id = %self.connection_id, "disconnected");
        Ok(())
    }
}

#[async_trait]
impl TokenSource for AuthManager {
    async fn api_credentials(&self) -> Result<ApiCredentials> {
        AuthManager::api_credentials(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use qbsync_runtime::Environment;
    use qbsync_traits::{HostError, HttpRequest, HttpResponse};

    use super::*;

    #[derive(Default)]
    struct MemorySecureStore {
        secrets: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl SecureStore for MemorySecureStore {
        async fn set_secret(
            &self,
            key: &str,
            value: &[u8],
        ) -> std::result::Result<(), HostError> {
            self.secrets
                .lock()
                .await
                .insert(key.to_string(), value.to_vec());
            Ok(())
        }

        async fn get_secret(
            &self,
            key: &str,
        ) -> std::result::Result<Option<Vec<u8>>, HostError> {
            Ok(self.secrets.lock().await.get(key).cloned())
        }

        async fn delete_secret(&self, key: &str) -> std::result::Result<(), HostError> {
            self.secrets.lock().await.remove(key);
            Ok(())
        }
    }

    /// Always answers token requests with a fresh token pair, counting
    /// how many requests were made.
    struct CountingTokenEndpoint {
        calls: AtomicUsize,
        status: u16,
    }

    impl CountingTokenEndpoint {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status: 200,
            }
        }

        fn rejecting() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                status: 400,
            }
        }
    }

    #[async_trait]
    impl HttpClient for CountingTokenEndpoint {
        async fn execute(
            &self,
            _request: HttpRequest,
        ) -> std::result::Result<HttpResponse, HostError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let body = if self.status == 200 {
                format!(
                    r#"{{"access_token":"access-{n}","refresh_token":"refresh-{n}","expires_in":3600}}"#
                )
            } else {
                r#"{"error":"invalid_grant"}"#.to_string()
            };
            Ok(HttpResponse {
                status: self.status,
                headers: HashMap::new(),
                body: Bytes::from(body),
            })
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::new(
            "client-id",
            "client-secret",
            "https://localhost/callback",
            Environment::Sandbox,
        )
    }

    fn manager(http: Arc<dyn HttpClient>) -> AuthManager {
        AuthManager::new(
            config(),
            http,
            Arc::new(MemorySecureStore::default()),
            EventBus::default(),
            ConnectionId::new(),
        )
    }

    fn expired_tokens() -> OAuthTokens {
        OAuthTokens::new(
            "stale-access".into(),
            "stale-refresh".into(),
            "1234567890".into(),
            None,
            // Already inside the refresh skew.
            10,
        )
    }

    #[tokio::test]
    async fn full_authorization_flow() {
        let http = Arc::new(CountingTokenEndpoint::ok());
        let mgr = manager(http);
        let mut rx = mgr.events.subscribe();

        let url = mgr.get_auth_url().await.unwrap();
        let state = url::Url::parse(&url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(mgr.connection_state().await, ConnectionState::Authorizing);

        mgr.complete_connection("code", &state, "4620816365")
            .await
            .unwrap();
        assert_eq!(mgr.connection_state().await, ConnectionState::Connected);

        let creds = mgr.api_credentials().await.unwrap();
        assert_eq!(creds.realm_id, "4620816365");
        assert_eq!(creds.access_token, "access-0");

        assert!(matches!(
            rx.recv().await,
            Ok(CoreEvent::Auth(AuthEvent::AuthorizationStarted))
        ));
        assert!(matches!(
            rx.recv().await,
            Ok(CoreEvent::Auth(AuthEvent::Connected { .. }))
        ));
    }

    #[tokio::test]
    async fn callback_with_wrong_state_is_rejected() {
        let mgr = manager(Arc::new(CountingTokenEndpoint::ok()));
        mgr.get_auth_url().await.unwrap();

        let err = mgr
            .complete_connection("code", "forged-state", "1")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::StateMismatch));
        // A mismatch does not consume the pending flow.
        assert_eq!(mgr.connection_state().await, ConnectionState::Authorizing);
    }

    #[tokio::test]
    async fn callback_without_pending_flow_is_rejected() {
        let mgr = manager(Arc::new(CountingTokenEndpoint::ok()));
        let err = mgr.complete_connection("code", "state", "1").await.unwrap_err();
        assert!(matches!(err, AuthError::NoPendingAuthorization));
    }

    #[tokio::test]
    async fn credentials_without_tokens_is_not_connected() {
        let mgr = manager(Arc::new(CountingTokenEndpoint::ok()));
        let err = mgr.api_credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::NotConnected));
    }

    #[tokio::test]
    async fn concurrent_callers_trigger_exactly_one_refresh() {
        let http = Arc::new(CountingTokenEndpoint::ok());
        let mgr = Arc::new(manager(http.clone()));
        mgr.token_store
            .store(mgr.connection_id, &expired_tokens())
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            handles.push(tokio::spawn(async move { mgr.api_credentials().await }));
        }
        for handle in handles {
            let creds = handle.await.unwrap().unwrap();
            assert_eq!(creds.access_token, "access-0");
        }

        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_drops_tokens_and_signals_reauthorization() {
        let mgr = manager(Arc::new(CountingTokenEndpoint::rejecting()));
        let mut rx = mgr.events.subscribe();
        mgr.token_store
            .store(mgr.connection_id, &expired_tokens())
            .await
            .unwrap();

        let err = mgr.api_credentials().await.unwrap_err();
        assert!(matches!(err, AuthError::Reauthorize(_)));
        assert_eq!(mgr.connection_state().await, ConnectionState::Disconnected);

        assert!(matches!(
            rx.recv().await,
            Ok(CoreEvent::Auth(AuthEvent::TokenRefreshing))
        ));
        match rx.recv().await {
            Ok(CoreEvent::Auth(AuthEvent::AuthFailed {
                requires_reauthorization,
                ..
            })) => assert!(requires_reauthorization),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_clears_tokens() {
        let http = Arc::new(CountingTokenEndpoint::ok());
        let mgr = manager(http);
        mgr.token_store
            .store(
                mgr.connection_id,
                &OAuthTokens::new("a".into(), "r".into(), "1".into(), None, 3600),
            )
            .await
            .unwrap();

        mgr.disconnect().await.unwrap();
        assert_eq!(mgr.connection_state().await, ConnectionState::Disconnected);
    }
}
