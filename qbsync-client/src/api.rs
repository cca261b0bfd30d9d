use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use qbsync_auth::TokenSource;
use qbsync_runtime::ConnectionConfig;
use qbsync_traits::{EntityKind, HttpClient, HttpMethod, HttpRequest, HttpResponse, PageCursor};
use rand::Rng;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::types::{FaultEnvelope, QueryPage, RemoteEntity};

const BACKOFF_BASE_MS: u64 = 500;
const BACKOFF_CAP_MS: u64 = 16_000;
const JITTER_MAX_MS: u64 = 250;

/// Client for the QuickBooks Online query API.
///
/// One instance per connection; cheap to share behind an `Arc`. All reads
/// go through the query endpoint with `STARTPOSITION`/`MAXRESULTS`
/// pagination. Retry policy lives entirely here so that callers see each
/// page fetch as a single fallible operation.
pub struct ApiClient {
    config: ConnectionConfig,
    http: Arc<dyn HttpClient>,
    tokens: Arc<dyn TokenSource>,
}

impl ApiClient {
    pub fn new(
        config: ConnectionConfig,
        http: Arc<dyn HttpClient>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            config,
            http,
            tokens,
        }
    }

    /// Fetches one page of records for an entity kind.
    ///
    /// `next_cursor` is `Some` only when the page came back full, meaning
    /// more records may follow. A missing or empty `QueryResponse` is a
    /// successful empty page, not an error.
    pub async fn fetch_page(&self, kind: EntityKind, cursor: PageCursor) -> Result<QueryPage> {
        let statement = format!(
            "SELECT * FROM {} STARTPOSITION {} MAXRESULTS {}",
            kind.resource(),
            cursor.0,
            self.config.page_size
        );
        let body = self.execute_query(&statement).await?;
        Ok(self.parse_page(kind, cursor, &body))
    }

    /// Fetches the company info singleton. No pagination, no cursor.
    pub async fn fetch_company_info(&self) -> Result<Option<RemoteEntity>> {
        let body = self.execute_query("SELECT * FROM CompanyInfo").await?;
        let page = self.parse_page(EntityKind::CompanyInfo, PageCursor::start(), &body);
        Ok(page.entities.into_iter().next())
    }

    fn parse_page(&self, kind: EntityKind, cursor: PageCursor, body: &Value) -> QueryPage {
        let records = body
            .get("QueryResponse")
            .and_then(|qr| qr.get(kind.resource()))
            .and_then(Value::as_array);

        let entities: Vec<RemoteEntity> = match records {
            Some(array) => array
                .iter()
                .map(|payload| RemoteEntity {
                    kind,
                    payload: payload.clone(),
                })
                .collect(),
            None => Vec::new(),
        };

        let fetched = entities.len() as u64;
        let next_cursor = if kind.is_paginated() && fetched == u64::from(self.config.page_size) {
            Some(cursor.advance(fetched))
        } else {
            None
        };

        debug!(
            entity = kind.as_str(),
            position = cursor.0,
            fetched,
            has_more = next_cursor.is_some(),
            "fetched page"
        );
        QueryPage {
            entities,
            next_cursor,
        }
    }

    /// Runs one query statement with the retry policy applied.
    async fn execute_query(&self, statement: &str) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            // Credentials are re-acquired per attempt so a refresh that
            // happened while we were backing off is picked up.
            let credentials = self.tokens.api_credentials().await?;
            let url = format!(
                "{}/v3/company/{}/query?minorversion={}",
                self.config.api_base_url(),
                credentials.realm_id,
                self.config.minor_version
            );
            let request = HttpRequest::new(HttpMethod::Post, url)
                .bearer_token(&credentials.access_token)
                .header("Content-Type", "application/text")
                .header("Accept", "application/json")
                .body(Bytes::from(statement.to_string()))
                .timeout(Duration::from_secs(self.config.request_timeout_secs));

            let outcome = match self.http.execute(request).await {
                Ok(response) => self.classify(response),
                Err(err) => Attempt::Transient {
                    error: ApiError::Network(err.to_string()),
                    delay: None,
                },
            };

            match outcome {
                Attempt::Done(value) => return Ok(value),
                Attempt::Fatal(err) => return Err(err),
                Attempt::Transient { error, delay } => {
                    if attempt >= self.config.max_retries {
                        return Err(match error {
                            ApiError::Remote { status: 429, .. } => ApiError::RateLimited {
                                attempts: attempt + 1,
                            },
                            other => other,
                        });
                    }
                    let delay = delay.unwrap_or_else(|| backoff_delay(attempt));
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient API failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn classify(&self, response: HttpResponse) -> Attempt {
        if response.is_success() {
            return match serde_json::from_slice(&response.body) {
                Ok(value) => Attempt::Done(value),
                Err(err) => Attempt::Fatal(ApiError::Decode(err.to_string())),
            };
        }

        let status = response.status;
        let message = fault_message(&response);
        match status {
            401 => Attempt::Fatal(ApiError::Unauthorized(message)),
            429 => Attempt::Transient {
                error: ApiError::Remote { status, message },
                delay: retry_after(&response),
            },
            500..=599 => Attempt::Transient {
                error: ApiError::Remote { status, message },
                delay: None,
            },
            _ => Attempt::Fatal(ApiError::Remote { status, message }),
        }
    }
}

enum Attempt {
    Done(Value),
    Fatal(ApiError),
    Transient {
        error: ApiError,
        delay: Option<Duration>,
    },
}

fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE_MS.saturating_mul(1 << attempt.min(10));
    let jitter = rand::thread_rng().gen_range(0..=JITTER_MAX_MS);
    Duration::from_millis(exp.min(BACKOFF_CAP_MS) + jitter)
}

fn retry_after(response: &HttpResponse) -> Option<Duration> {
    response
        .header("Retry-After")
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn fault_message(response: &HttpResponse) -> String {
    match serde_json::from_slice::<FaultEnvelope>(&response.body) {
        Ok(envelope) => envelope.fault.describe(),
        Err(_) => String::from_utf8_lossy(&response.body).into_owned(),
    }
}
