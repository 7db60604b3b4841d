//! # Reference Repository
//!
//! Local mirror of backend-owned rows: catalog items, customers and payment
//! methods.
//!
//! ## Conflict Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  INSERT ... ON CONFLICT (id) DO UPDATE SET <all fields>, synced = 1     │
//! │             WHERE excluded.updated_at >= <table>.updated_at             │
//! │                                                                         │
//! │  remote newer or equal  → overwrite (equal rewrites identical values)   │
//! │  remote older           → keep local, rows_affected = 0                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Timestamps are stored fixed-width, so the string comparison above is a
//! time comparison.

use pdv_core::{timestamp, CatalogItem, Customer, PaymentMethod};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use crate::pool::LocalStore;

/// Local tables that mirror backend-owned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceTable {
    PaymentMethods,
    CatalogItems,
    Customers,
}

impl ReferenceTable {
    /// Local table name; also the cursor key.
    pub fn table_name(&self) -> &'static str {
        match self {
            ReferenceTable::PaymentMethods => "formas_pagamento",
            ReferenceTable::CatalogItems => "produtos",
            ReferenceTable::Customers => "clientes",
        }
    }
}

/// Repository for mirrored reference rows.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    store: LocalStore,
}

impl ReferenceRepository {
    pub fn new(store: LocalStore) -> Self {
        ReferenceRepository { store }
    }

    /// Number of mirrored rows for a tenant.
    pub async fn count(&self, table: ReferenceTable, tenant_id: &str) -> DbResult<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE empresa_id = ?1",
            table.table_name()
        );
        let count = sqlx::query_scalar::<_, i64>(&sql)
            .bind(tenant_id)
            .fetch_one(self.store.pool()?)
            .await?;
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Upserts (run inside the pull's write transaction)
    // -------------------------------------------------------------------------

    pub async fn upsert_catalog_item_in(
        conn: &mut SqliteConnection,
        item: &CatalogItem,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO produtos (
                id, empresa_id, codigo, codigo_barras, descricao, unidade,
                preco_centavos, ativo, updated_at, sincronizado
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)
            ON CONFLICT (id) DO UPDATE SET
                empresa_id = excluded.empresa_id,
                codigo = excluded.codigo,
                codigo_barras = excluded.codigo_barras,
                descricao = excluded.descricao,
                unidade = excluded.unidade,
                preco_centavos = excluded.preco_centavos,
                ativo = excluded.ativo,
                updated_at = excluded.updated_at,
                sincronizado = 1
            WHERE excluded.updated_at >= produtos.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.tenant_id)
        .bind(&item.code)
        .bind(&item.barcode)
        .bind(&item.description)
        .bind(&item.unit)
        .bind(item.price_cents)
        .bind(item.active)
        .bind(timestamp::format(item.updated_at))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn upsert_customer_in(
        conn: &mut SqliteConnection,
        customer: &Customer,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO clientes (
                id, empresa_id, nome, documento, email, telefone,
                ativo, updated_at, sincronizado
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 1)
            ON CONFLICT (id) DO UPDATE SET
                empresa_id = excluded.empresa_id,
                nome = excluded.nome,
                documento = excluded.documento,
                email = excluded.email,
                telefone = excluded.telefone,
                ativo = excluded.ativo,
                updated_at = excluded.updated_at,
                sincronizado = 1
            WHERE excluded.updated_at >= clientes.updated_at
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.tenant_id)
        .bind(&customer.name)
        .bind(&customer.document)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.active)
        .bind(timestamp::format(customer.updated_at))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn upsert_payment_method_in(
        conn: &mut SqliteConnection,
        method: &PaymentMethod,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            INSERT INTO formas_pagamento (
                id, empresa_id, descricao, tipo, ativo, updated_at, sincronizado
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1)
            ON CONFLICT (id) DO UPDATE SET
                empresa_id = excluded.empresa_id,
                descricao = excluded.descricao,
                tipo = excluded.tipo,
                ativo = excluded.ativo,
                updated_at = excluded.updated_at,
                sincronizado = 1
            WHERE excluded.updated_at >= formas_pagamento.updated_at
            "#,
        )
        .bind(&method.id)
        .bind(&method.tenant_id)
        .bind(&method.description)
        .bind(&method.kind)
        .bind(method.active)
        .bind(timestamp::format(method.updated_at))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub async fn catalog_items(&self, tenant_id: &str) -> DbResult<Vec<CatalogItem>> {
        let items = sqlx::query_as::<_, CatalogItem>(
            r#"
            SELECT id, empresa_id AS tenant_id, codigo AS code, codigo_barras AS barcode,
                   descricao AS description, unidade AS unit, preco_centavos AS price_cents,
                   ativo AS active, updated_at, sincronizado AS synced
            FROM produtos
            WHERE empresa_id = ?1
            ORDER BY descricao
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(items)
    }

    /// Looks up an active item by barcode.
    pub async fn catalog_item_by_barcode(
        &self,
        tenant_id: &str,
        barcode: &str,
    ) -> DbResult<Option<CatalogItem>> {
        let item = sqlx::query_as::<_, CatalogItem>(
            r#"
            SELECT id, empresa_id AS tenant_id, codigo AS code, codigo_barras AS barcode,
                   descricao AS description, unidade AS unit, preco_centavos AS price_cents,
                   ativo AS active, updated_at, sincronizado AS synced
            FROM produtos
            WHERE empresa_id = ?1 AND codigo_barras = ?2 AND ativo = 1
            "#,
        )
        .bind(tenant_id)
        .bind(barcode)
        .fetch_optional(self.store.pool()?)
        .await?;
        Ok(item)
    }

    pub async fn customers(&self, tenant_id: &str) -> DbResult<Vec<Customer>> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, empresa_id AS tenant_id, nome AS name, documento AS document,
                   email, telefone AS phone, ativo AS active, updated_at,
                   sincronizado AS synced
            FROM clientes
            WHERE empresa_id = ?1
            ORDER BY nome
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(customers)
    }

    pub async fn payment_methods(&self, tenant_id: &str) -> DbResult<Vec<PaymentMethod>> {
        let methods = sqlx::query_as::<_, PaymentMethod>(
            r#"
            SELECT id, empresa_id AS tenant_id, descricao AS description, tipo AS kind,
                   ativo AS active, updated_at, sincronizado AS synced
            FROM formas_pagamento
            WHERE empresa_id = ?1
            ORDER BY descricao
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.store.pool()?)
        .await?;
        Ok(methods)
    }
}
