//! # Change Cursor
//!
//! Per `(table, tenant)` timestamp of the last successful pull, kept in
//! `sync_metadata`.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read()     None      → never pulled, fetch the full tenant set         │
//! │             Some(ts)  → fetch rows with updated_at > ts                 │
//! │                                                                         │
//! │  advance()  only after the batch's upserts have committed; the cursor   │
//! │             never moves backwards                                       │
//! │                                                                         │
//! │  crash between commit and advance → the batch is fetched again and the  │
//! │  idempotent upsert makes that harmless                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Push never reads cursors.

use chrono::{DateTime, Utc};
use pdv_core::timestamp;
use serde::Serialize;
use tracing::debug;

use crate::error::DbResult;
use crate::pool::LocalStore;

/// One stored cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CursorEntry {
    pub table: String,
    pub tenant_id: String,
    pub last_sync_at: DateTime<Utc>,
}

/// Access to `sync_metadata`.
#[derive(Debug, Clone)]
pub struct ChangeCursor {
    store: LocalStore,
}

impl ChangeCursor {
    pub fn new(store: LocalStore) -> Self {
        ChangeCursor { store }
    }

    pub async fn read(&self, table: &str, tenant_id: &str) -> DbResult<Option<DateTime<Utc>>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT last_sync_at FROM sync_metadata WHERE tabela = ?1 AND empresa_id = ?2",
        )
        .bind(table)
        .bind(tenant_id)
        .fetch_optional(self.store.pool()?)
        .await?;

        Ok(value.as_deref().and_then(timestamp::parse))
    }

    /// Moves the cursor to `server_time`. An older value is ignored.
    ///
    /// Returns true if the stored value changed.
    pub async fn advance(
        &self,
        table: &str,
        tenant_id: &str,
        server_time: DateTime<Utc>,
    ) -> DbResult<bool> {
        let affected = self
            .store
            .execute_write(
                sqlx::query(
                    r#"
                    INSERT INTO sync_metadata (tabela, empresa_id, last_sync_at)
                    VALUES (?1, ?2, ?3)
                    ON CONFLICT (tabela, empresa_id) DO UPDATE SET
                        last_sync_at = excluded.last_sync_at
                    WHERE excluded.last_sync_at > sync_metadata.last_sync_at
                    "#,
                )
                .bind(table.to_string())
                .bind(tenant_id.to_string())
                .bind(timestamp::format(server_time)),
            )
            .await?;

        debug!(table, tenant_id, advanced = affected > 0, "Cursor advance");
        Ok(affected > 0)
    }

    /// Forgets the cursor so the next pull fetches everything.
    pub async fn reset(&self, table: &str, tenant_id: &str) -> DbResult<()> {
        self.store
            .execute_write(
                sqlx::query("DELETE FROM sync_metadata WHERE tabela = ?1 AND empresa_id = ?2")
                    .bind(table.to_string())
                    .bind(tenant_id.to_string()),
            )
            .await?;
        Ok(())
    }

    pub async fn list(&self, tenant_id: &str) -> DbResult<Vec<CursorEntry>> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT tabela, empresa_id, last_sync_at FROM sync_metadata \
             WHERE empresa_id = ?1 ORDER BY tabela",
        )
        .bind(tenant_id)
        .fetch_all(self.store.pool()?)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(table, tenant_id, at)| {
                timestamp::parse(&at).map(|last_sync_at| CursorEntry {
                    table,
                    tenant_id,
                    last_sync_at,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_cursor_only_moves_forward() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let cursors = store.cursors();
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(cursors.read("produtos", "t1").await.unwrap(), None);

        assert!(cursors.advance("produtos", "t1", t0).await.unwrap());
        assert!(!cursors
            .advance("produtos", "t1", t0 - Duration::hours(1))
            .await
            .unwrap());
        assert_eq!(cursors.read("produtos", "t1").await.unwrap(), Some(t0));

        // Scoped per tenant
        assert_eq!(cursors.read("produtos", "t2").await.unwrap(), None);
        assert_eq!(cursors.list("t1").await.unwrap().len(), 1);

        cursors.reset("produtos", "t1").await.unwrap();
        assert_eq!(cursors.read("produtos", "t1").await.unwrap(), None);
    }
}
