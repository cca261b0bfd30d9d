use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use qbsync_traits::{HttpClient, HttpMethod, HttpRequest};
use qbsync_runtime::{ConnectionConfig, ACCOUNTING_SCOPE, AUTHORIZE_URL, TOKEN_URL};
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AuthError, Result};
use crate::types::OAuthTokens;

/// Transient refresh failures are retried this many times before giving up.
const TOKEN_RETRY_ATTEMPTS: u32 = 3;
const TOKEN_RETRY_BASE_DELAY_MS: u64 = 100;

fn default_expires_in() -> i64 {
    3600
}

/// Body of a successful response from the Intuit token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when the server chooses not to rotate the refresh token.
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub x_refresh_token_expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

/// Drives the OAuth 2.0 authorization-code flow against the Intuit
/// authorization server.
///
/// This type is stateless; CSRF state bookkeeping lives in
/// [`AuthManager`](crate::manager::AuthManager).
pub struct OAuthFlowManager {
    config: ConnectionConfig,
    http: Arc<dyn HttpClient>,
}

impl OAuthFlowManager {
    pub fn new(config: ConnectionConfig, http: Arc<dyn HttpClient>) -> Self {
        Self { config, http }
    }

    /// Builds the authorization URL the user must visit, along with the CSRF
    /// state token the callback must echo back.
    pub fn build_auth_url(&self) -> Result<(String, String)> {
        let state = generate_state();
        let mut url = Url::parse(AUTHORIZE_URL)
            .map_err(|e| AuthError::Config(format!("invalid authorize URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", ACCOUNTING_SCOPE)
            .append_pair("state", &state);
        Ok((url.into(), state))
    }

    /// Exchanges an authorization code for a token set.
    ///
    /// The realm id comes from the callback query string, not the token
    /// response, so it is threaded through here and stamped onto the result.
    pub async fn exchange_code(&self, code: &str, realm_id: &str) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];
        let response = self.token_request(&form).await?;

        if !response.is_success() {
            let detail = token_error_detail(&response.body);
            return Err(AuthError::InvalidAuthCode(format!(
                "status {}: {detail}",
                response.status
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Serialization(e.to_string()))?;
        let refresh_token = parsed
            .refresh_token
            .ok_or_else(|| AuthError::InvalidAuthCode("response missing refresh_token".into()))?;

        debug!(realm_id, expires_in = parsed.expires_in, "authorization code exchanged");
        Ok(OAuthTokens::new(
            parsed.access_token,
            refresh_token,
            realm_id.to_string(),
            Some(ACCOUNTING_SCOPE.to_string()),
            parsed.expires_in,
        ))
    }

    /// Refreshes an access token.
    ///
    /// Retries transient (network / 5xx) failures with exponential backoff.
    /// A 4xx response means the refresh token is no longer accepted and maps
    /// to [`AuthError::Reauthorize`]. When the server does not rotate the
    /// refresh token the previous one is carried forward.
    pub async fn refresh(&self, refresh_token: &str, realm_id: &str) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];

        let mut last_err = AuthError::TokenRefreshFailed("no attempts made".into());
        for attempt in 0..TOKEN_RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = TOKEN_RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = match self.token_request(&form).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "token refresh request failed");
                    last_err = e;
                    continue;
                }
            };

            if response.is_success() {
                let parsed: TokenResponse = response
                    .json()
                    .map_err(|e| AuthError::Serialization(e.to_string()))?;
                let rotated = parsed
                    .refresh_token
                    .unwrap_or_else(|| refresh_token.to_string());
                return Ok(OAuthTokens::new(
                    parsed.access_token,
                    rotated,
                    realm_id.to_string(),
                    Some(ACCOUNTING_SCOPE.to_string()),
                    parsed.expires_in,
                ));
            }

            let detail = token_error_detail(&response.body);
            if response.is_client_error() {
                return Err(AuthError::Reauthorize(format!(
                    "status {}: {detail}",
                    response.status
                )));
            }
            warn!(attempt, status = response.status, "token endpoint returned server error");
            last_err =
                AuthError::TokenRefreshFailed(format!("status {}: {detail}", response.status));
        }
        Err(last_err)
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
    ) -> Result<qbsync_traits::HttpResponse> {
        let body = serde_urlencoded::to_string(form)
            .map_err(|e| AuthError::Serialization(e.to_string()))?;
        let request = HttpRequest::new(HttpMethod::Post, TOKEN_URL)
            .header("Authorization", self.basic_auth())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(Bytes::from(body))
            .timeout(Duration::from_secs(self.config.request_timeout_secs));
        self.http
            .execute(request)
            .await
            .map_err(|e| AuthError::Network(e.to_string()))
    }

    fn basic_auth(&self) -> String {
        let credentials = format!("{}:{}", self.config.client_id, self.config.client_secret);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }
}

fn generate_state() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn token_error_detail(body: &[u8]) -> String {
    match serde_json::from_slice::<TokenErrorResponse>(body) {
        Ok(parsed) => {
            let error = parsed.error.unwrap_or_else(|| "unknown_error".into());
            match parsed.error_description {
                Some(desc) => format!("{error} ({desc})"),
                None => error,
            }
        }
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}
