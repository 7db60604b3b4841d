//! # Cash Movement Repository
//!
//! The cash drawer ledger (`movimentos_caixa`). A session is the run of rows
//! sharing `(empresa_id, data_movimento, caixa_numero)`; there is no session
//! table.
//!
//! State-changing methods take a connection so the cash session manager can
//! check and write inside one write transaction.

use chrono::{NaiveDate, Utc};
use pdv_core::{new_idempotency_key, timestamp, CashMovement, CashMovementKind};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use crate::pool::LocalStore;

const SELECT_MOVEMENT: &str = r#"
    SELECT id, uuid, empresa_id AS tenant_id, terminal_id, tipo AS kind,
           valor_centavos AS amount_cents, descricao AS description,
           data_movimento AS business_day, caixa_numero AS session_number,
           caixa_aberto AS session_open, diferenca_centavos AS variance_cents,
           created_at, sincronizado AS synced, retaguarda_id AS remote_id,
           sync_state, sync_tentativas AS sync_attempts, sync_erro AS sync_error
    FROM movimentos_caixa
"#;

/// A movement to append to the ledger.
#[derive(Debug, Clone)]
pub struct NewCashMovement {
    pub tenant_id: String,
    pub terminal_id: String,
    pub kind: CashMovementKind,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub business_day: NaiveDate,
    pub session_number: i64,
    pub variance_cents: Option<i64>,
}

/// Repository for cash movements.
#[derive(Debug, Clone)]
pub struct CashMovementRepository {
    store: LocalStore,
}

fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

impl CashMovementRepository {
    pub fn new(store: LocalStore) -> Self {
        CashMovementRepository { store }
    }

    // -------------------------------------------------------------------------
    // Session queries (any connection)
    // -------------------------------------------------------------------------

    /// Number of the session currently open for the tenant and day, if any.
    pub async fn open_session_number_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        day: NaiveDate,
    ) -> DbResult<Option<i64>> {
        let number = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT caixa_numero FROM movimentos_caixa
            WHERE empresa_id = ?1 AND data_movimento = ?2
              AND tipo = 'ABERTURA' AND caixa_aberto = 1
            ORDER BY caixa_numero DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(day_key(day))
        .fetch_optional(conn)
        .await?;
        Ok(number)
    }

    /// 1 + highest session number used by the tenant on that day.
    pub async fn next_session_number_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        day: NaiveDate,
    ) -> DbResult<i64> {
        let next = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(caixa_numero), 0) + 1 FROM movimentos_caixa \
             WHERE empresa_id = ?1 AND data_movimento = ?2",
        )
        .bind(tenant_id)
        .bind(day_key(day))
        .fetch_one(conn)
        .await?;
        Ok(next)
    }

    /// Movements of one session, in insertion order.
    pub async fn session_movements_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        day: NaiveDate,
        session_number: i64,
    ) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "{SELECT_MOVEMENT} WHERE empresa_id = ?1 AND data_movimento = ?2 \
             AND caixa_numero = ?3 ORDER BY id"
        );
        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(tenant_id)
            .bind(day_key(day))
            .bind(session_number)
            .fetch_all(conn)
            .await?;
        Ok(movements)
    }

    // -------------------------------------------------------------------------
    // Session writes (inside the caller's write transaction)
    // -------------------------------------------------------------------------

    /// Appends a movement. New rows belong to an open session.
    pub async fn insert_in(
        conn: &mut SqliteConnection,
        movement: &NewCashMovement,
    ) -> DbResult<CashMovement> {
        let id = sqlx::query(
            r#"
            INSERT INTO movimentos_caixa (
                uuid, empresa_id, terminal_id, tipo, valor_centavos, descricao,
                data_movimento, created_at, sincronizado, caixa_numero, caixa_aberto,
                diferenca_centavos, sync_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, 1, ?10, 'pending')
            "#,
        )
        .bind(new_idempotency_key())
        .bind(&movement.tenant_id)
        .bind(&movement.terminal_id)
        .bind(movement.kind)
        .bind(movement.amount_cents)
        .bind(&movement.description)
        .bind(day_key(movement.business_day))
        .bind(timestamp::format(Utc::now()))
        .bind(movement.session_number)
        .bind(movement.variance_cents)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        let sql = format!("{SELECT_MOVEMENT} WHERE id = ?1");
        let stored = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(id)
            .fetch_one(conn)
            .await?;
        Ok(stored)
    }

    /// Flags every row of the session as closed. Returns rows updated.
    pub async fn close_session_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        day: NaiveDate,
        session_number: i64,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE movimentos_caixa SET caixa_aberto = 0 \
             WHERE empresa_id = ?1 AND data_movimento = ?2 AND caixa_numero = ?3",
        )
        .bind(tenant_id)
        .bind(day_key(day))
        .bind(session_number)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn session_movements(
        &self,
        tenant_id: &str,
        day: NaiveDate,
        session_number: i64,
    ) -> DbResult<Vec<CashMovement>> {
        let mut conn = self.store.acquire().await?;
        Self::session_movements_in(&mut conn, tenant_id, day, session_number).await
    }

    /// Movements not yet acknowledged by the backend, oldest first.
    pub async fn pending_push(&self, tenant_id: &str) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "{SELECT_MOVEMENT} WHERE empresa_id = ?1 AND sync_state != 'synced' ORDER BY id"
        );
        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(tenant_id)
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(movements)
    }

    // -------------------------------------------------------------------------
    // Push bookkeeping
    // -------------------------------------------------------------------------

    /// Stores the backend id and marks the movement synced, in one update.
    ///
    /// Returns false if the movement was already synced.
    pub async fn mark_synced(&self, id: i64, remote_id: &str) -> DbResult<bool> {
        let affected = self
            .store
            .execute_write(
                sqlx::query(
                    "UPDATE movimentos_caixa SET \
                        retaguarda_id = COALESCE(retaguarda_id, ?1), \
                        sync_state = 'synced', sincronizado = 1, sync_erro = NULL \
                     WHERE id = ?2 AND sync_state != 'synced'",
                )
                .bind(remote_id.to_string())
                .bind(id),
            )
            .await?;
        Ok(affected == 1)
    }

    pub async fn record_failure(&self, id: i64, error: &str) -> DbResult<()> {
        self.store
            .execute_write(
                sqlx::query(
                    "UPDATE movimentos_caixa SET sync_tentativas = sync_tentativas + 1, \
                     sync_erro = ?1 WHERE id = ?2",
                )
                .bind(error.to_string())
                .bind(id),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;

    fn opening(day: NaiveDate, session_number: i64) -> NewCashMovement {
        NewCashMovement {
            tenant_id: "t1".into(),
            terminal_id: "pdv-01".into(),
            kind: CashMovementKind::Opening,
            amount_cents: 10_000,
            description: None,
            business_day: day,
            session_number,
            variance_cents: None,
        }
    }

    #[tokio::test]
    async fn test_session_numbering_and_close() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();

        let mut tx = store.begin_write().await.unwrap();
        let conn = tx.conn();
        assert_eq!(
            CashMovementRepository::next_session_number_in(conn, "t1", day).await.unwrap(),
            1
        );
        let row = CashMovementRepository::insert_in(conn, &opening(day, 1)).await.unwrap();
        assert!(row.session_open);
        assert_eq!(row.business_day, day);
        assert_eq!(
            CashMovementRepository::open_session_number_in(conn, "t1", day).await.unwrap(),
            Some(1)
        );

        assert_eq!(
            CashMovementRepository::close_session_in(conn, "t1", day, 1).await.unwrap(),
            1
        );
        assert_eq!(
            CashMovementRepository::open_session_number_in(conn, "t1", day).await.unwrap(),
            None
        );
        assert_eq!(
            CashMovementRepository::next_session_number_in(conn, "t1", day).await.unwrap(),
            2
        );
        tx.commit().await.unwrap();

        let pending = store.cash_movements().pending_push("t1").await.unwrap();
        assert_eq!(pending.len(), 1);

        let repo = store.cash_movements();
        assert!(repo.mark_synced(pending[0].id, "r-9").await.unwrap());
        assert!(!repo.mark_synced(pending[0].id, "r-10").await.unwrap());
        assert!(repo.pending_push("t1").await.unwrap().is_empty());
    }
}
