//! # Remote Gateway
//!
//! The only door to the backend (retaguarda). Reconcilers receive an
//! `Arc<dyn RemoteGateway>`; production wires [`PostgrestGateway`], tests
//! wire [`InMemoryGateway`].
//!
//! ## Surface
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  select(table, filter)          → RemoteBatch { rows, server_time }     │
//! │      filter = equality predicates + optional updated_at > cursor        │
//! │                                                                         │
//! │  insert(table, row)             → remote id                             │
//! │  find_by_key(table, col, key)   → remote id of an existing row          │
//! │  accessible_tenants()           → tenants the credential can see        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod credential;
pub mod memory;
pub mod postgrest;

pub use credential::check_credential;
pub use memory::InMemoryGateway;
pub use postgrest::PostgrestGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdv_core::timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayResult;

/// A row as exchanged with the backend.
pub type RemoteRow = Map<String, Value>;

/// Backend-assigned identifier, normalized to text.
pub type RemoteId = String;

/// Column every tenant-scoped remote table carries.
pub const TENANT_COLUMN: &str = "empresa_id";

/// Column driving incremental pulls.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// Column carrying the idempotency key of locally created rows.
pub const IDEMPOTENCY_COLUMN: &str = "uuid";

// =============================================================================
// Filter
// =============================================================================

/// Row filter for [`RemoteGateway::select`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteFilter {
    /// `column = value` predicates, all of which must hold.
    pub equals: Vec<(String, Value)>,
    /// Only rows with `updated_at` strictly after this instant.
    pub updated_after: Option<DateTime<Utc>>,
}

impl RemoteFilter {
    /// Filter scoped to one tenant.
    pub fn tenant(tenant_id: &str) -> Self {
        RemoteFilter::default().eq(TENANT_COLUMN, Value::String(tenant_id.to_string()))
    }

    pub fn eq(mut self, column: &str, value: Value) -> Self {
        self.equals.push((column.to_string(), value));
        self
    }

    pub fn updated_after(mut self, cursor: Option<DateTime<Utc>>) -> Self {
        self.updated_after = cursor;
        self
    }

    /// Evaluates the filter against a row the way PostgREST does: a missing
    /// or null column never matches, and `gt` on a null timestamp is false.
    pub fn matches(&self, row: &RemoteRow) -> bool {
        let equal = self
            .equals
            .iter()
            .all(|(column, expected)| row.get(column).is_some_and(|v| loosely_equal(v, expected)));
        if !equal {
            return false;
        }

        match self.updated_after {
            None => true,
            Some(cursor) => row
                .get(UPDATED_AT_COLUMN)
                .and_then(Value::as_str)
                .and_then(timestamp::parse)
                .is_some_and(|ts| ts > cursor),
        }
    }
}

/// Equality across the JSON shapes a backend may return (`1` vs `"1"`).
fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    a == b || value_text(a) == value_text(b)
}

/// Text rendering of a scalar, as used in query strings.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Reads the `id` column as text.
pub fn remote_id_of(row: &RemoteRow) -> Option<RemoteId> {
    match row.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// =============================================================================
// Results
// =============================================================================

/// Rows returned by one select.
#[derive(Debug, Clone, Default)]
pub struct RemoteBatch {
    pub rows: Vec<RemoteRow>,
    /// Backend clock at the time of the read, when known.
    pub server_time: Option<DateTime<Utc>>,
}

/// A tenant as returned by the accessible-tenants procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteTenant {
    pub id: String,
    #[serde(default, alias = "nome", alias = "razao_social")]
    pub name: String,
    #[serde(default, alias = "cnpj")]
    pub document: Option<String>,
    #[serde(default = "default_active", alias = "ativo")]
    pub active: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_active() -> bool {
    true
}

// =============================================================================
// Gateway Trait
// =============================================================================

/// Tenant-scoped access to the backend.
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Reads rows of `table` matching `filter`.
    async fn select(&self, table: &str, filter: &RemoteFilter) -> GatewayResult<RemoteBatch>;

    /// Inserts one row and returns the id the backend assigned.
    async fn insert(&self, table: &str, row: &RemoteRow) -> GatewayResult<RemoteId>;

    /// Finds the id of the row whose `key_column` equals `key`.
    async fn find_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> GatewayResult<Option<RemoteId>>;

    /// Tenants the current credential may read and write.
    async fn accessible_tenants(&self) -> GatewayResult<Vec<RemoteTenant>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn row(value: Value) -> RemoteRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches_like_postgrest() {
        let cursor = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let filter = RemoteFilter::tenant("t1")
            .eq("ativo", json!(true))
            .updated_after(Some(cursor));

        assert!(filter.matches(&row(json!({
            "empresa_id": "t1", "ativo": true, "updated_at": "2026-03-01T12:00:01Z"
        }))));
        // Not strictly after the cursor
        assert!(!filter.matches(&row(json!({
            "empresa_id": "t1", "ativo": true, "updated_at": "2026-03-01T12:00:00Z"
        }))));
        // Missing column never matches an equality predicate
        assert!(!filter.matches(&row(json!({
            "empresa_id": "t1", "updated_at": "2026-03-02T00:00:00Z"
        }))));
        assert!(!filter.matches(&row(json!({
            "empresa_id": "t2", "ativo": true, "updated_at": "2026-03-02T00:00:00Z"
        }))));
    }

    #[test]
    fn test_remote_id_normalization() {
        assert_eq!(remote_id_of(&row(json!({"id": 42}))), Some("42".to_string()));
        assert_eq!(remote_id_of(&row(json!({"id": "abc"}))), Some("abc".to_string()));
        assert_eq!(remote_id_of(&row(json!({"id": null}))), None);
    }

    #[test]
    fn test_remote_tenant_accepts_portuguese_columns() {
        let tenant: RemoteTenant =
            serde_json::from_value(json!({"id": "t1", "nome": "Mercadinho", "cnpj": "00"})).unwrap();
        assert_eq!(tenant.name, "Mercadinho");
        assert_eq!(tenant.document.as_deref(), Some("00"));
        assert!(tenant.active);
    }
}
