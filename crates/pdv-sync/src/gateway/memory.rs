//! # In-Memory Gateway
//!
//! A [`RemoteGateway`] holding JSON tables in memory, with a settable
//! server clock and programmable failures. Used by the test suites.
//!
//! ## Failure Programming
//! ```text
//! fail_select("formas_pagamento", TableNotFound)   every select on the table fails
//! reject_inserts("vendas", |row| ..., Rejected)   matching inserts fail
//! fail_rpc(Unauthorized)                          accessible_tenants fails
//! ```
//!
//! Tables that were never created answer selects with `TableNotFound`,
//! like PostgREST does.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::{
    remote_id_of, value_text, RemoteBatch, RemoteFilter, RemoteGateway, RemoteId, RemoteRow,
    RemoteTenant, IDEMPOTENCY_COLUMN,
};
use crate::error::{GatewayError, GatewayResult};

type RowPredicate = Box<dyn Fn(&RemoteRow) -> bool + Send + Sync>;

struct InsertRule {
    table: String,
    predicate: RowPredicate,
    error: GatewayError,
}

struct State {
    tables: HashMap<String, Vec<RemoteRow>>,
    tenants: Vec<RemoteTenant>,
    clock: DateTime<Utc>,
    next_id: u64,
    failing_selects: HashMap<String, GatewayError>,
    insert_rules: Vec<InsertRule>,
    rpc_failure: Option<GatewayError>,
    selects: HashMap<String, usize>,
    inserts: HashMap<String, usize>,
}

/// Backend stand-in.
pub struct InMemoryGateway {
    state: Mutex<State>,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("InMemoryGateway")
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("clock", &state.clock)
            .finish()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        InMemoryGateway {
            state: Mutex::new(State {
                tables: HashMap::new(),
                tenants: Vec::new(),
                clock: Utc::now(),
                next_id: 1,
                failing_selects: HashMap::new(),
                insert_rules: Vec::new(),
                rpc_failure: None,
                selects: HashMap::new(),
                inserts: HashMap::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock can only come from a test assertion
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Creates an empty table. Selects on it succeed with zero rows.
    pub fn create_table(&self, table: &str) {
        self.state().tables.entry(table.to_string()).or_default();
    }

    /// Appends rows (JSON objects) to a table, creating it if needed.
    /// Non-object values are ignored.
    pub fn put_rows(&self, table: &str, rows: impl IntoIterator<Item = Value>) {
        let mut state = self.state();
        let entries = state.tables.entry(table.to_string()).or_default();
        entries.extend(rows.into_iter().filter_map(|row| match row {
            Value::Object(map) => Some(map),
            _ => None,
        }));
    }

    /// Replaces the row with the same `id`, or appends it.
    pub fn upsert_row(&self, table: &str, row: Value) {
        let Value::Object(row) = row else { return };
        let mut state = self.state();
        let entries = state.tables.entry(table.to_string()).or_default();
        let id = remote_id_of(&row);
        match entries
            .iter()
            .position(|existing| id.is_some() && remote_id_of(existing) == id)
        {
            Some(index) => entries[index] = row,
            None => entries.push(row),
        }
    }

    pub fn set_tenants(&self, tenants: Vec<RemoteTenant>) {
        self.state().tenants = tenants;
    }

    pub fn set_clock(&self, now: DateTime<Utc>) {
        self.state().clock = now;
    }

    pub fn advance_clock(&self, by: Duration) {
        let mut state = self.state();
        state.clock = state.clock + by;
    }

    pub fn clock(&self) -> DateTime<Utc> {
        self.state().clock
    }

    // =========================================================================
    // Failure Programming
    // =========================================================================

    pub fn fail_select(&self, table: &str, error: GatewayError) {
        self.state().failing_selects.insert(table.to_string(), error);
    }

    pub fn reject_inserts<P>(&self, table: &str, predicate: P, error: GatewayError)
    where
        P: Fn(&RemoteRow) -> bool + Send + Sync + 'static,
    {
        self.state().insert_rules.push(InsertRule {
            table: table.to_string(),
            predicate: Box::new(predicate),
            error,
        });
    }

    pub fn fail_rpc(&self, error: GatewayError) {
        self.state().rpc_failure = Some(error);
    }

    /// Removes every programmed failure.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failing_selects.clear();
        state.insert_rules.clear();
        state.rpc_failure = None;
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn rows(&self, table: &str) -> Vec<RemoteRow> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    pub fn select_count(&self, table: &str) -> usize {
        self.state().selects.get(table).copied().unwrap_or(0)
    }

    pub fn insert_count(&self, table: &str) -> usize {
        self.state().inserts.get(table).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn select(&self, table: &str, filter: &RemoteFilter) -> GatewayResult<RemoteBatch> {
        let mut state = self.state();
        *state.selects.entry(table.to_string()).or_default() += 1;

        if let Some(error) = state.failing_selects.get(table) {
            return Err(error.clone());
        }

        let rows = state
            .tables
            .get(table)
            .ok_or_else(|| GatewayError::TableNotFound {
                table: table.to_string(),
            })?
            .iter()
            .filter(|row| filter.matches(row))
            .cloned()
            .collect();

        Ok(RemoteBatch {
            rows,
            server_time: Some(state.clock),
        })
    }

    async fn insert(&self, table: &str, row: &RemoteRow) -> GatewayResult<RemoteId> {
        let mut state = self.state();
        *state.inserts.entry(table.to_string()).or_default() += 1;

        if let Some(rule) = state
            .insert_rules
            .iter()
            .find(|rule| rule.table == table && (rule.predicate)(row))
        {
            return Err(rule.error.clone());
        }

        let key = row.get(IDEMPOTENCY_COLUMN).map(value_text);
        let entries = state.tables.entry(table.to_string()).or_default();
        if let Some(key) = key {
            let taken = entries
                .iter()
                .any(|existing| existing.get(IDEMPOTENCY_COLUMN).map(value_text).as_ref() == Some(&key));
            if taken {
                return Err(GatewayError::Duplicate {
                    table: table.to_string(),
                    message: format!("duplicate key value violates unique constraint ({})", key),
                });
            }
        }

        let mut stored = row.clone();
        let id = match remote_id_of(&stored) {
            Some(id) => id,
            None => {
                let id = format!("r-{}", state.next_id);
                state.next_id += 1;
                stored.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        state.tables.entry(table.to_string()).or_default().push(stored);

        Ok(id)
    }

    async fn find_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> GatewayResult<Option<RemoteId>> {
        let state = self.state();
        Ok(state.tables.get(table).and_then(|rows| {
            rows.iter()
                .find(|row| row.get(key_column).map(value_text).as_deref() == Some(key))
                .and_then(remote_id_of)
        }))
    }

    async fn accessible_tenants(&self) -> GatewayResult<Vec<RemoteTenant>> {
        let state = self.state();
        match &state.rpc_failure {
            Some(error) => Err(error.clone()),
            None => Ok(state.tenants.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let gateway = InMemoryGateway::new();
        let err = gateway.select("nope", &RemoteFilter::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::TableNotFound { .. }));

        gateway.create_table("nope");
        let batch = gateway.select("nope", &RemoteFilter::default()).await.unwrap();
        assert!(batch.rows.is_empty());
        assert_eq!(batch.server_time, Some(gateway.clock()));
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_rejects_duplicate_keys() {
        let gateway = InMemoryGateway::new();
        let row = json!({"uuid": "k1", "total_centavos": 100}).as_object().cloned().unwrap();

        let id = gateway.insert("vendas", &row).await.unwrap();
        assert_eq!(id, "r-1");

        let err = gateway.insert("vendas", &row).await.unwrap_err();
        assert!(matches!(err, GatewayError::Duplicate { .. }));
        assert_eq!(gateway.find_by_key("vendas", "uuid", "k1").await.unwrap(), Some(id));
        assert_eq!(gateway.insert_count("vendas"), 2);
    }

    #[tokio::test]
    async fn test_programmed_insert_rejection() {
        let gateway = InMemoryGateway::new();
        gateway.reject_inserts(
            "vendas",
            |row| row.get("total_centavos") == Some(&json!(0)),
            GatewayError::Rejected { status: 400, message: "total".into() },
        );

        let bad = json!({"uuid": "a", "total_centavos": 0}).as_object().cloned().unwrap();
        let good = json!({"uuid": "b", "total_centavos": 5}).as_object().cloned().unwrap();
        assert!(gateway.insert("vendas", &bad).await.is_err());
        assert!(gateway.insert("vendas", &good).await.is_ok());
        assert_eq!(gateway.rows("vendas").len(), 1);
    }
}
