//! # Sale Repository
//!
//! Sales recorded on this terminal, with their items and payments.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. RECORD                                                              │
//! │     └── create() → Sale { status, uuid, sync_state: pending }           │
//! │         (items + payments in the same transaction)                      │
//! │                                                                         │
//! │  2. CLOSE                                                               │
//! │     └── set_status(fechada | faturada) → eligible for push              │
//! │                                                                         │
//! │  3. PUSH (pdv-sync)                                                     │
//! │     ├── mark_parent_accepted() → retaguarda_id set once, partial        │
//! │     ├── set_item_remote_id() / set_payment_remote_id()                  │
//! │     │     (retaguarda_id + sincronizado = 1 on the line)                │
//! │     └── mark_synced()          → synced, sincronizado = 1 (terminal)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use pdv_core::{new_idempotency_key, timestamp, Sale, SaleItem, SalePayment, SaleStatus};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::pool::LocalStore;

const SELECT_SALE: &str = r#"
    SELECT id, uuid, empresa_id AS tenant_id, numero AS number, cliente_id AS customer_id,
           status, subtotal_centavos AS subtotal_cents, desconto_centavos AS discount_cents,
           total_centavos AS total_cents, created_at, updated_at, sincronizado AS synced,
           retaguarda_id AS remote_id, sync_state, sync_tentativas AS sync_attempts,
           sync_erro AS sync_error
    FROM vendas
"#;

/// A sale to record.
#[derive(Debug, Clone)]
pub struct NewSale {
    pub tenant_id: String,
    pub customer_id: Option<String>,
    pub status: SaleStatus,
    pub discount_cents: i64,
    pub items: Vec<NewSaleItem>,
    pub payments: Vec<NewSalePayment>,
}

#[derive(Debug, Clone)]
pub struct NewSaleItem {
    pub product_id: String,
    pub description: String,
    pub quantity: f64,
    pub unit_price_cents: i64,
}

impl NewSaleItem {
    /// Line total, rounded to the centavo.
    pub fn total_cents(&self) -> i64 {
        (self.quantity * self.unit_price_cents as f64).round() as i64
    }
}

#[derive(Debug, Clone)]
pub struct NewSalePayment {
    pub payment_method_id: String,
    pub amount_cents: i64,
    pub change_cents: i64,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    store: LocalStore,
}

impl SaleRepository {
    pub fn new(store: LocalStore) -> Self {
        SaleRepository { store }
    }

    /// Records a sale with its items and payments.
    ///
    /// The receipt number is the tenant's next sequential number.
    pub async fn create(&self, new: NewSale) -> DbResult<Sale> {
        let subtotal: i64 = new.items.iter().map(NewSaleItem::total_cents).sum();
        let total = subtotal - new.discount_cents;
        let now = timestamp::format(Utc::now());
        let uuid = new_idempotency_key();

        let mut tx = self.store.begin_write().await?;

        let number: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(numero), 0) + 1 FROM vendas WHERE empresa_id = ?1",
        )
        .bind(&new.tenant_id)
        .fetch_one(tx.conn())
        .await?;

        let sale_id = sqlx::query(
            r#"
            INSERT INTO vendas (
                uuid, empresa_id, numero, cliente_id, status,
                subtotal_centavos, desconto_centavos, total_centavos,
                created_at, updated_at, sincronizado, sync_state
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9, 0, 'pending')
            "#,
        )
        .bind(&uuid)
        .bind(&new.tenant_id)
        .bind(number)
        .bind(&new.customer_id)
        .bind(new.status)
        .bind(subtotal)
        .bind(new.discount_cents)
        .bind(total)
        .bind(&now)
        .execute(tx.conn())
        .await?
        .last_insert_rowid();

        for item in &new.items {
            sqlx::query(
                r#"
                INSERT INTO venda_itens (
                    uuid, empresa_id, venda_id, produto_id, descricao, quantidade,
                    preco_unitario_centavos, total_centavos, sincronizado
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
                "#,
            )
            .bind(new_idempotency_key())
            .bind(&new.tenant_id)
            .bind(sale_id)
            .bind(&item.product_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.total_cents())
            .execute(tx.conn())
            .await?;
        }

        for payment in &new.payments {
            sqlx::query(
                r#"
                INSERT INTO venda_pagamentos (
                    uuid, empresa_id, venda_id, forma_pagamento_id, valor_centavos,
                    troco_centavos, sincronizado
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
                "#,
            )
            .bind(new_idempotency_key())
            .bind(&new.tenant_id)
            .bind(sale_id)
            .bind(&payment.payment_method_id)
            .bind(payment.amount_cents)
            .bind(payment.change_cents)
            .execute(tx.conn())
            .await?;
        }

        let sql = format!("{SELECT_SALE} WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(sale_id)
            .fetch_one(tx.conn())
            .await?;

        tx.commit().await?;

        debug!(uuid = %sale.uuid, number = sale.number, total = sale.total_cents, "Sale recorded");
        Ok(sale)
    }

    /// Changes the status of a sale that has not been synced yet.
    pub async fn set_status(&self, uuid: &str, status: SaleStatus) -> DbResult<()> {
        let mut tx = self.store.begin_write().await?;
        let result = sqlx::query(
            "UPDATE vendas SET status = ?1, updated_at = ?2 \
             WHERE uuid = ?3 AND sync_state != 'synced'",
        )
        .bind(status)
        .bind(timestamp::format(Utc::now()))
        .bind(uuid)
        .execute(tx.conn())
        .await?;
        tx.commit().await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Unsynced sale", uuid));
        }
        Ok(())
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<Sale>> {
        let sql = format!("{SELECT_SALE} WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(sale)
    }

    pub async fn get_by_uuid(&self, uuid: &str) -> DbResult<Option<Sale>> {
        let sql = format!("{SELECT_SALE} WHERE uuid = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(uuid)
            .fetch_optional(self.store.pool()?)
            .await?;
        Ok(sale)
    }

    /// Closed or invoiced sales of a tenant not yet fully acknowledged,
    /// oldest first.
    pub async fn pending_push(&self, tenant_id: &str) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "{SELECT_SALE} WHERE empresa_id = ?1 AND sync_state != 'synced' \
             AND status IN ('fechada', 'faturada') ORDER BY id"
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(tenant_id)
            .fetch_all(self.store.pool()?)
            .await?;
        Ok(sales)
    }

    pub async fn items(&self, sale_id: i64) -> DbResult<Vec<SaleItem>> {
        let items = sqlx::query_as::<_, SaleItem>(
            r#"
            SELECT id, uuid, empresa_id AS tenant_id, venda_id AS sale_id,
                   produto_id AS product_id, descricao AS description, quantidade AS quantity,
                   preco_unitario_centavos AS unit_price_cents, total_centavos AS total_cents,
                   sincronizado AS synced, retaguarda_id AS remote_id
            FROM venda_itens
            WHERE venda_id = ?1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(items)
    }

    pub async fn payments(&self, sale_id: i64) -> DbResult<Vec<SalePayment>> {
        let payments = sqlx::query_as::<_, SalePayment>(
            r#"
            SELECT id, uuid, empresa_id AS tenant_id, venda_id AS sale_id,
                   forma_pagamento_id AS payment_method_id, valor_centavos AS amount_cents,
                   troco_centavos AS change_cents, sincronizado AS synced,
                   retaguarda_id AS remote_id
            FROM venda_pagamentos
            WHERE venda_id = ?1
            ORDER BY id
            "#,
        )
        .bind(sale_id)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(payments)
    }

    // -------------------------------------------------------------------------
    // Push bookkeeping
    // -------------------------------------------------------------------------

    /// Stores the backend id of the sale and moves it to `partial`.
    ///
    /// The remote id is written only if none was stored before.
    pub async fn mark_parent_accepted(&self, id: i64, remote_id: &str) -> DbResult<()> {
        self.store
            .execute_write(
                sqlx::query(
                    "UPDATE vendas SET \
                        retaguarda_id = COALESCE(retaguarda_id, ?1), \
                        sync_state = 'partial' \
                     WHERE id = ?2 AND sync_state = 'pending'",
                )
                .bind(remote_id.to_string())
                .bind(id),
            )
            .await?;
        Ok(())
    }

    pub async fn set_item_remote_id(&self, item_id: i64, remote_id: &str) -> DbResult<()> {
        self.store
            .execute_write(
                sqlx::query(
                    "UPDATE venda_itens SET retaguarda_id = ?1, sincronizado = 1 \
                     WHERE id = ?2 AND retaguarda_id IS NULL",
                )
                .bind(remote_id.to_string())
                .bind(item_id),
            )
            .await?;
        Ok(())
    }

    pub async fn set_payment_remote_id(&self, payment_id: i64, remote_id: &str) -> DbResult<()> {
        self.store
            .execute_write(
                sqlx::query(
                    "UPDATE venda_pagamentos SET retaguarda_id = ?1, sincronizado = 1 \
                     WHERE id = ?2 AND retaguarda_id IS NULL",
                )
                .bind(remote_id.to_string())
                .bind(payment_id),
            )
            .await?;
        Ok(())
    }

    /// Marks the sale fully acknowledged. Requires the parent's remote id.
    ///
    /// Returns false if the sale was not eligible (no remote id yet).
    pub async fn mark_synced(&self, id: i64) -> DbResult<bool> {
        let affected = self
            .store
            .execute_write(
                sqlx::query(
                    "UPDATE vendas SET sync_state = 'synced', sincronizado = 1, sync_erro = NULL \
                     WHERE id = ?1 AND retaguarda_id IS NOT NULL AND sync_state != 'synced'",
                )
                .bind(id),
            )
            .await?;
        Ok(affected == 1)
    }

    /// Counts a failed attempt and keeps the last error message.
    pub async fn record_failure(&self, id: i64, error: &str) -> DbResult<()> {
        self.store
            .execute_write(
                sqlx::query(
                    "UPDATE vendas SET sync_tentativas = sync_tentativas + 1, sync_erro = ?1 \
                     WHERE id = ?2",
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
    use pdv_core::SyncState;

    fn new_sale(status: SaleStatus) -> NewSale {
        NewSale {
            tenant_id: "t1".into(),
            customer_id: None,
            status,
            discount_cents: 0,
            items: vec![NewSaleItem {
                product_id: "p1".into(),
                description: "Pão francês".into(),
                quantity: 0.5,
                unit_price_cents: 1_598,
            }],
            payments: vec![NewSalePayment {
                payment_method_id: "dinheiro".into(),
                amount_cents: 1_000,
                change_cents: 201,
            }],
        }
    }

    #[tokio::test]
    async fn test_create_sale_with_children() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let repo = store.sales();

        let first = repo.create(new_sale(SaleStatus::Closed)).await.unwrap();
        let second = repo.create(new_sale(SaleStatus::Open)).await.unwrap();

        assert_eq!(first.number, 1);
        assert_eq!(second.number, 2);
        assert_eq!(first.total_cents, 799);
        assert_eq!(first.sync_state, SyncState::Pending);
        assert!(!first.synced);
        let items = repo.items(first.id).await.unwrap();
        let payments = repo.payments(first.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(payments.len(), 1);
        assert_eq!(items[0].tenant_id, "t1");
        assert_eq!(payments[0].tenant_id, "t1");
        assert!(!items[0].synced && !payments[0].synced);

        // Open sales are not eligible
        let pending = repo.pending_push("t1").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].uuid, first.uuid);
    }

    #[tokio::test]
    async fn test_sync_transitions_are_monotonic() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        let repo = store.sales();
        let sale = repo.create(new_sale(SaleStatus::Closed)).await.unwrap();

        // Not eligible before the parent is accepted
        assert!(!repo.mark_synced(sale.id).await.unwrap());

        repo.mark_parent_accepted(sale.id, "r-1").await.unwrap();
        repo.mark_parent_accepted(sale.id, "r-2").await.unwrap();
        let partial = repo.get(sale.id).await.unwrap().unwrap();
        assert_eq!(partial.sync_state, SyncState::Partial);
        assert_eq!(partial.remote_id.as_deref(), Some("r-1"));

        let item = &repo.items(sale.id).await.unwrap()[0];
        let payment = &repo.payments(sale.id).await.unwrap()[0];
        repo.set_item_remote_id(item.id, "ri-1").await.unwrap();
        repo.set_payment_remote_id(payment.id, "rp-1").await.unwrap();
        let item = &repo.items(sale.id).await.unwrap()[0];
        let payment = &repo.payments(sale.id).await.unwrap()[0];
        assert!(item.synced);
        assert_eq!(item.remote_id.as_deref(), Some("ri-1"));
        assert!(payment.synced);
        assert_eq!(payment.remote_id.as_deref(), Some("rp-1"));

        assert!(repo.mark_synced(sale.id).await.unwrap());
        assert!(!repo.mark_synced(sale.id).await.unwrap());
        assert!(repo.pending_push("t1").await.unwrap().is_empty());

        // A synced sale can't be edited back into the queue
        assert!(repo.set_status(&sale.uuid, SaleStatus::Cancelled).await.is_err());
    }
}
