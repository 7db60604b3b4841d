//! # Baseline Schema
//!
//! The shape of a store created by the first release. Everything after that
//! is a [`crate::migrations`] descriptor, so this file never changes once
//! shipped.
//!
//! ## Tables
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  REFERENCE (pulled)            TRANSACTIONAL (pushed)     BOOKKEEPING   │
//! │  ──────────────────            ──────────────────────     ───────────   │
//! │  empresas                      vendas                     sync_metadata │
//! │  produtos                        ├── venda_itens          schema_       │
//! │  clientes                        └── venda_pagamentos      migrations   │
//! │  formas_pagamento              movimentos_caixa                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every statement is guarded with `IF NOT EXISTS`; running it on an existing
//! store changes nothing.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

const BASELINE: &[&str] = &[
    // -------------------------------------------------------------------------
    // Reference entities
    // -------------------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS empresas (
        id          TEXT PRIMARY KEY NOT NULL,
        nome        TEXT NOT NULL,
        cnpj        TEXT,
        ativo       INTEGER NOT NULL DEFAULT 1,
        updated_at  TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS produtos (
        id             TEXT PRIMARY KEY NOT NULL,
        empresa_id     TEXT NOT NULL,
        codigo         TEXT NOT NULL,
        codigo_barras  TEXT,
        descricao      TEXT NOT NULL,
        unidade        TEXT NOT NULL DEFAULT 'UN',
        preco          REAL NOT NULL DEFAULT 0,
        ativo          INTEGER NOT NULL DEFAULT 1,
        updated_at     TEXT NOT NULL,
        sincronizado   INTEGER NOT NULL DEFAULT 1
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_produtos_empresa ON produtos (empresa_id)",
    "CREATE INDEX IF NOT EXISTS idx_produtos_codigo ON produtos (empresa_id, codigo)",
    "CREATE INDEX IF NOT EXISTS idx_produtos_barras ON produtos (codigo_barras)",
    r#"
    CREATE TABLE IF NOT EXISTS clientes (
        id            TEXT PRIMARY KEY NOT NULL,
        empresa_id    TEXT NOT NULL,
        nome          TEXT NOT NULL,
        documento     TEXT,
        email         TEXT,
        telefone      TEXT,
        ativo         INTEGER NOT NULL DEFAULT 1,
        updated_at    TEXT NOT NULL,
        sincronizado  INTEGER NOT NULL DEFAULT 1
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_clientes_empresa ON clientes (empresa_id)",
    "CREATE INDEX IF NOT EXISTS idx_clientes_documento ON clientes (empresa_id, documento)",
    r#"
    CREATE TABLE IF NOT EXISTS formas_pagamento (
        id            TEXT PRIMARY KEY NOT NULL,
        empresa_id    TEXT NOT NULL,
        descricao     TEXT NOT NULL,
        tipo          TEXT NOT NULL DEFAULT 'outros',
        ativo         INTEGER NOT NULL DEFAULT 1,
        updated_at    TEXT NOT NULL,
        sincronizado  INTEGER NOT NULL DEFAULT 1
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_formas_pagamento_empresa ON formas_pagamento (empresa_id)",
    // -------------------------------------------------------------------------
    // Transactional entities
    // -------------------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS vendas (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid               TEXT NOT NULL,
        empresa_id         TEXT NOT NULL,
        numero             INTEGER NOT NULL,
        cliente_id         TEXT,
        status             TEXT NOT NULL DEFAULT 'aberta'
                           CHECK (status IN ('aberta', 'fechada', 'faturada', 'cancelada')),
        subtotal_centavos  INTEGER NOT NULL DEFAULT 0,
        desconto_centavos  INTEGER NOT NULL DEFAULT 0,
        total_centavos     INTEGER NOT NULL DEFAULT 0,
        created_at         TEXT NOT NULL,
        updated_at         TEXT NOT NULL,
        sincronizado       INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_vendas_empresa ON vendas (empresa_id)",
    "CREATE INDEX IF NOT EXISTS idx_vendas_pendentes ON vendas (sincronizado, status)",
    "CREATE INDEX IF NOT EXISTS idx_vendas_uuid ON vendas (uuid)",
    r#"
    CREATE TABLE IF NOT EXISTS venda_itens (
        id                        INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid                      TEXT NOT NULL,
        venda_id                  INTEGER NOT NULL REFERENCES vendas (id) ON DELETE CASCADE,
        produto_id                TEXT NOT NULL,
        descricao                 TEXT NOT NULL,
        quantidade                REAL NOT NULL,
        preco_unitario_centavos   INTEGER NOT NULL,
        total_centavos            INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_venda_itens_venda ON venda_itens (venda_id)",
    r#"
    CREATE TABLE IF NOT EXISTS venda_pagamentos (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid                TEXT NOT NULL,
        venda_id            INTEGER NOT NULL REFERENCES vendas (id) ON DELETE CASCADE,
        forma_pagamento_id  TEXT NOT NULL,
        valor_centavos      INTEGER NOT NULL,
        troco_centavos      INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_venda_pagamentos_venda ON venda_pagamentos (venda_id)",
    r#"
    CREATE TABLE IF NOT EXISTS movimentos_caixa (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        uuid            TEXT NOT NULL,
        empresa_id      TEXT NOT NULL,
        terminal_id     TEXT NOT NULL,
        tipo            TEXT NOT NULL
                        CHECK (tipo IN ('ABERTURA', 'ENTRADA', 'SAIDA', 'FECHAMENTO')),
        valor_centavos  INTEGER NOT NULL,
        descricao       TEXT,
        data_movimento  TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        sincronizado    INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_movimentos_empresa ON movimentos_caixa (empresa_id, data_movimento)",
    // -------------------------------------------------------------------------
    // Bookkeeping
    // -------------------------------------------------------------------------
    r#"
    CREATE TABLE IF NOT EXISTS sync_metadata (
        tabela        TEXT NOT NULL,
        empresa_id    TEXT NOT NULL,
        last_sync_at  TEXT NOT NULL,
        PRIMARY KEY (tabela, empresa_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS schema_migrations (
        version     INTEGER PRIMARY KEY NOT NULL,
        name        TEXT NOT NULL,
        applied_at  TEXT NOT NULL
    )
    "#,
];

/// Creates the baseline tables and indexes.
pub async fn create_schema(pool: &SqlitePool) -> DbResult<()> {
    let mut tx = pool.begin().await?;
    for statement in BASELINE {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;

    debug!(statements = BASELINE.len(), "Baseline schema ensured");
    Ok(())
}
