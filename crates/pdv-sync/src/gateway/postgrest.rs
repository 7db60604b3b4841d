//! # PostgREST Gateway
//!
//! [`RemoteGateway`] over a PostgREST-style HTTP API.
//!
//! ## Request Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  select       GET  /rest/v1/{table}?select=*&col=eq.v&updated_at=gt.ts  │
//! │  insert       POST /rest/v1/{table}     Prefer: return=representation   │
//! │  find_by_key  GET  /rest/v1/{table}?select=id&{col}=eq.{key}&limit=1    │
//! │  tenants      POST /rest/v1/rpc/{ACCESSIBLE_TENANTS_RPC}                │
//! │                                                                         │
//! │  headers      apikey: <key>   Authorization: Bearer <token>             │
//! │  server time  HTTP Date header of the select response                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status Mapping
//! ```text
//!  401 / 403                 → Unauthorized   (fatal)
//!  404 / 42P01 / PGRST205    → TableNotFound  (phase)
//!  409 / 23505               → Duplicate      (resolved by key)
//!  other 4xx                 → Rejected       (row)
//!  5xx / transport           → Unavailable    (retryable)
//! ```
//!
//! Reads (select, find_by_key, tenants) are retried with exponential
//! backoff while the error is `Unavailable`. Inserts are never retried here:
//! a lost acknowledgement is resolved by the push reconciler via
//! `find_by_key` on the idempotency key.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use chrono::{DateTime, Utc};
use pdv_core::timestamp;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::{
    check_credential, remote_id_of, value_text, RemoteBatch, RemoteFilter, RemoteGateway,
    RemoteId, RemoteRow, RemoteTenant, UPDATED_AT_COLUMN,
};
use crate::config::RemoteSettings;
use crate::error::{GatewayError, GatewayResult};

/// No-argument procedure listing the caller's tenants.
pub const ACCESSIBLE_TENANTS_RPC: &str = "empresas_acessiveis";

// =============================================================================
// Retry Policy
// =============================================================================

/// Backoff settings for idempotent reads.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

/// PostgREST error body.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

// =============================================================================
// Gateway
// =============================================================================

/// HTTP gateway to the backend.
#[derive(Debug, Clone)]
pub struct PostgrestGateway {
    client: Client,
    /// `{base}/rest/v1/`
    rest: Url,
    api_key: String,
    bearer: String,
    retry: RetryPolicy,
}

impl PostgrestGateway {
    /// Builds a gateway after validating both credentials.
    ///
    /// Fails with `MissingCredentials` or `PrivilegedCredential` before any
    /// network activity.
    pub fn new(base_url: &str, api_key: &str, bearer: &str) -> GatewayResult<Self> {
        check_credential(api_key)?;
        check_credential(bearer)?;

        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let rest = base.join("rest/v1/")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(PostgrestGateway {
            client,
            rest,
            api_key: api_key.to_string(),
            bearer: bearer.to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Builds a gateway from the `[remote]` section.
    pub fn from_settings(settings: &RemoteSettings) -> GatewayResult<Self> {
        let url = settings
            .url
            .as_deref()
            .ok_or_else(|| GatewayError::InvalidUrl("remote.url is not set".into()))?;

        let mut gateway = Self::new(url, &settings.api_key, settings.bearer())?;
        gateway.client = Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;
        gateway.retry = RetryPolicy {
            initial_interval: Duration::from_millis(settings.initial_backoff_ms),
            max_elapsed: Duration::from_secs(settings.max_retry_secs),
        };
        Ok(gateway)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // =========================================================================
    // URL Building
    // =========================================================================

    fn table_url(&self, table: &str) -> GatewayResult<Url> {
        Ok(self.rest.join(table)?)
    }

    /// `GET` URL for a filtered select.
    pub fn select_url(&self, table: &str, filter: &RemoteFilter) -> GatewayResult<Url> {
        let mut url = self.table_url(table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            for (column, value) in &filter.equals {
                pairs.append_pair(column, &format!("eq.{}", value_text(value)));
            }
            if let Some(cursor) = filter.updated_after {
                pairs.append_pair(UPDATED_AT_COLUMN, &format!("gt.{}", timestamp::format(cursor)));
            }
        }
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.bearer))
            .header(header::ACCEPT, "application/json")
    }

    // =========================================================================
    // Single Attempts
    // =========================================================================

    async fn select_once(&self, table: &str, filter: &RemoteFilter) -> GatewayResult<RemoteBatch> {
        let url = self.select_url(table, filter)?;
        debug!(table, url = %url, "Remote select");

        let response = self.authorized(self.client.get(url)).send().await?;
        let response = ensure_success(table, response).await?;
        let server_time = server_time(&response);
        let rows: Vec<RemoteRow> = response.json().await?;

        Ok(RemoteBatch { rows, server_time })
    }

    async fn find_once(&self, table: &str, key_column: &str, key: &str) -> GatewayResult<Option<RemoteId>> {
        let mut url = self.table_url(table)?;
        url.query_pairs_mut()
            .append_pair("select", "id")
            .append_pair(key_column, &format!("eq.{}", key))
            .append_pair("limit", "1");

        let response = self.authorized(self.client.get(url)).send().await?;
        let response = ensure_success(table, response).await?;
        let rows: Vec<RemoteRow> = response.json().await?;

        Ok(rows.first().and_then(remote_id_of))
    }

    async fn tenants_once(&self) -> GatewayResult<Vec<RemoteTenant>> {
        let url = self.rest.join(&format!("rpc/{}", ACCESSIBLE_TENANTS_RPC))?;

        let response = self
            .authorized(self.client.post(url))
            .json(&Value::Object(Default::default()))
            .send()
            .await?;
        let response = ensure_success(ACCESSIBLE_TENANTS_RPC, response).await?;
        Ok(response.json().await?)
    }
}

/// Runs `operation` again while it fails with a retryable error.
async fn with_retry<T, F, Fut>(policy: RetryPolicy, what: &str, operation: F) -> GatewayResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = GatewayResult<T>>,
{
    backoff::future::retry(policy.backoff(), || {
        let attempt = operation();
        async move {
            attempt.await.map_err(|err| {
                if err.is_retryable() {
                    warn!(what, error = %err, "Remote read failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        }
    })
    .await
}

#[async_trait]
impl RemoteGateway for PostgrestGateway {
    async fn select(&self, table: &str, filter: &RemoteFilter) -> GatewayResult<RemoteBatch> {
        with_retry(self.retry, table, || self.select_once(table, filter)).await
    }

    async fn insert(&self, table: &str, row: &RemoteRow) -> GatewayResult<RemoteId> {
        let url = self.table_url(table)?;

        let response = self
            .authorized(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let response = ensure_success(table, response).await?;
        let rows: Vec<RemoteRow> = response.json().await?;

        rows.first().and_then(remote_id_of).ok_or_else(|| {
            GatewayError::InvalidResponse(format!("insert into '{}' returned no id", table))
        })
    }

    async fn find_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> GatewayResult<Option<RemoteId>> {
        with_retry(self.retry, table, || self.find_once(table, key_column, key)).await
    }

    async fn accessible_tenants(&self) -> GatewayResult<Vec<RemoteTenant>> {
        with_retry(self.retry, ACCESSIBLE_TENANTS_RPC, || self.tenants_once()).await
    }
}

// =============================================================================
// Response Handling
// =============================================================================

async fn ensure_success(table: &str, response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
    let message = parsed.message.unwrap_or(body);

    Err(classify(status.as_u16(), parsed.code.as_deref(), message, table))
}

/// Maps an HTTP status and PostgREST/Postgres error code to a gateway error.
pub fn classify(status: u16, code: Option<&str>, message: String, table: &str) -> GatewayError {
    match (status, code) {
        (401 | 403, _) => GatewayError::Unauthorized(message),
        (_, Some("42P01" | "PGRST205")) | (404, _) => GatewayError::TableNotFound {
            table: table.to_string(),
        },
        (_, Some("23505")) | (409, _) => GatewayError::Duplicate {
            table: table.to_string(),
            message,
        },
        (500..=599, _) => GatewayError::Unavailable(format!("{}: {}", status, message)),
        _ => GatewayError::Rejected { status, message },
    }
}

fn server_time(response: &Response) -> Option<DateTime<Utc>> {
    response
        .headers()
        .get(header::DATE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|ts| ts.with_timezone(&Utc))
}
