//! # Schema Migrations
//!
//! Versioned migration descriptors applied on top of the baseline schema.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  initialize()                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT version FROM schema_migrations                                  │
//! │       │                                                                 │
//! │       ├── 1 cash_session_columns   ✓ (already applied)                  │
//! │       ├── 2 remote_ids             ✓ (already applied)                  │
//! │       └── 3 sync_state             ⬜ (pending)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  For each pending migration, in version order:                          │
//! │    BEGIN                                                                │
//! │      steps...                                                           │
//! │      INSERT INTO schema_migrations                                      │
//! │    COMMIT                      ── on error: ROLLBACK, warn!, continue   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A migration's steps and its version row commit together, so after a crash
//! the store is either in the old shape with no version row or in the new
//! shape with it. A failed migration never blocks startup; it stays pending
//! and is tried again on the next `initialize`.
//!
//! ## Adding New Migrations
//!
//! 1. Append a [`Migration`] to [`MIGRATIONS`] with the next version number
//! 2. **NEVER** edit or renumber a shipped migration
//! 3. Retyping or renaming a column is a [`TableRebuild`], never an in-place
//!    `ALTER`

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};

// =============================================================================
// Descriptors
// =============================================================================

/// One versioned schema change.
#[derive(Debug)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub steps: &'static [Step],
}

/// A single step of a migration.
#[derive(Debug)]
pub enum Step {
    /// Plain DDL/DML.
    Sql(&'static str),
    /// `ALTER TABLE .. ADD COLUMN`, skipped if the column already exists
    /// (stores written by builds that predate version tracking).
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
    /// Copy-to-new-table-then-swap.
    Rebuild(TableRebuild),
}

/// Destructive change done by rebuilding the table.
///
/// ```text
///   create <table>_new (new shape)
///   INSERT INTO <table>_new SELECT <transform> FROM <table>
///   DROP TABLE <table>
///   ALTER TABLE <table>_new RENAME TO <table>
///   recreate indexes
/// ```
#[derive(Debug)]
pub struct TableRebuild {
    pub table: &'static str,
    pub shadow: &'static str,
    pub create_shadow: &'static str,
    pub copy: &'static str,
    pub indexes: &'static [&'static str],
}

/// Every migration this build knows, in version order.
pub static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "cash_session_columns",
        steps: &[
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "caixa_numero",
                definition: "INTEGER NOT NULL DEFAULT 1",
            },
            // Rows written before sessions existed are treated as closed
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "caixa_aberto",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "diferenca_centavos",
                definition: "INTEGER",
            },
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_movimentos_sessao \
                 ON movimentos_caixa (empresa_id, data_movimento, caixa_numero)",
            ),
        ],
    },
    Migration {
        version: 2,
        name: "remote_ids",
        steps: &[
            Step::AddColumn {
                table: "vendas",
                column: "retaguarda_id",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "venda_itens",
                column: "retaguarda_id",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "venda_pagamentos",
                column: "retaguarda_id",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "retaguarda_id",
                definition: "TEXT",
            },
        ],
    },
    Migration {
        version: 3,
        name: "sync_state",
        steps: &[
            Step::AddColumn {
                table: "vendas",
                column: "sync_state",
                definition: "TEXT NOT NULL DEFAULT 'pending'",
            },
            Step::AddColumn {
                table: "vendas",
                column: "sync_tentativas",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            Step::AddColumn {
                table: "vendas",
                column: "sync_erro",
                definition: "TEXT",
            },
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "sync_state",
                definition: "TEXT NOT NULL DEFAULT 'pending'",
            },
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "sync_tentativas",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            Step::AddColumn {
                table: "movimentos_caixa",
                column: "sync_erro",
                definition: "TEXT",
            },
            Step::Sql("UPDATE vendas SET sync_state = 'synced' WHERE sincronizado = 1"),
            Step::Sql("UPDATE movimentos_caixa SET sync_state = 'synced' WHERE sincronizado = 1"),
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_vendas_sync ON vendas (empresa_id, sync_state)",
            ),
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_movimentos_sync \
                 ON movimentos_caixa (empresa_id, sync_state)",
            ),
        ],
    },
    Migration {
        version: 4,
        name: "produtos_preco_centavos",
        steps: &[Step::Rebuild(TableRebuild {
            table: "produtos",
            shadow: "produtos_new",
            create_shadow: r#"
                CREATE TABLE produtos_new (
                    id              TEXT PRIMARY KEY NOT NULL,
                    empresa_id      TEXT NOT NULL,
                    codigo          TEXT NOT NULL,
                    codigo_barras   TEXT,
                    descricao       TEXT NOT NULL,
                    unidade         TEXT NOT NULL DEFAULT 'UN',
                    preco_centavos  INTEGER NOT NULL DEFAULT 0,
                    ativo           INTEGER NOT NULL DEFAULT 1,
                    updated_at      TEXT NOT NULL,
                    sincronizado    INTEGER NOT NULL DEFAULT 1
                )
            "#,
            copy: r#"
                INSERT INTO produtos_new (
                    id, empresa_id, codigo, codigo_barras, descricao, unidade,
                    preco_centavos, ativo, updated_at, sincronizado
                )
                SELECT
                    id, empresa_id, codigo, codigo_barras, descricao, unidade,
                    CAST(ROUND(preco * 100) AS INTEGER), ativo, updated_at, sincronizado
                FROM produtos
            "#,
            indexes: &[
                "CREATE INDEX IF NOT EXISTS idx_produtos_empresa ON produtos (empresa_id)",
                "CREATE INDEX IF NOT EXISTS idx_produtos_codigo ON produtos (empresa_id, codigo)",
                "CREATE INDEX IF NOT EXISTS idx_produtos_barras ON produtos (codigo_barras)",
            ],
        })],
    },
    Migration {
        version: 5,
        name: "unique_idempotency_keys",
        steps: &[
            Step::Sql("DROP INDEX IF EXISTS idx_vendas_uuid"),
            Step::Sql("CREATE UNIQUE INDEX IF NOT EXISTS uq_vendas_uuid ON vendas (uuid)"),
            Step::Sql("CREATE UNIQUE INDEX IF NOT EXISTS uq_venda_itens_uuid ON venda_itens (uuid)"),
            Step::Sql(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_venda_pagamentos_uuid ON venda_pagamentos (uuid)",
            ),
            Step::Sql(
                "CREATE UNIQUE INDEX IF NOT EXISTS uq_movimentos_caixa_uuid ON movimentos_caixa (uuid)",
            ),
        ],
    },
    Migration {
        version: 6,
        name: "sale_children_tenant_sync",
        steps: &[
            Step::AddColumn {
                table: "venda_itens",
                column: "empresa_id",
                definition: "TEXT NOT NULL DEFAULT ''",
            },
            Step::AddColumn {
                table: "venda_itens",
                column: "sincronizado",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            Step::AddColumn {
                table: "venda_pagamentos",
                column: "empresa_id",
                definition: "TEXT NOT NULL DEFAULT ''",
            },
            Step::AddColumn {
                table: "venda_pagamentos",
                column: "sincronizado",
                definition: "INTEGER NOT NULL DEFAULT 0",
            },
            Step::Sql(
                "UPDATE venda_itens SET empresa_id = \
                 (SELECT v.empresa_id FROM vendas v WHERE v.id = venda_itens.venda_id) \
                 WHERE empresa_id = ''",
            ),
            Step::Sql(
                "UPDATE venda_pagamentos SET empresa_id = \
                 (SELECT v.empresa_id FROM vendas v WHERE v.id = venda_pagamentos.venda_id) \
                 WHERE empresa_id = ''",
            ),
            // Lines the backend already holds
            Step::Sql("UPDATE venda_itens SET sincronizado = 1 WHERE retaguarda_id IS NOT NULL"),
            Step::Sql(
                "UPDATE venda_pagamentos SET sincronizado = 1 WHERE retaguarda_id IS NOT NULL",
            ),
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_venda_itens_empresa ON venda_itens (empresa_id)",
            ),
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_venda_itens_sync ON venda_itens (sincronizado)",
            ),
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_venda_pagamentos_empresa \
                 ON venda_pagamentos (empresa_id)",
            ),
            Step::Sql(
                "CREATE INDEX IF NOT EXISTS idx_venda_pagamentos_sync \
                 ON venda_pagamentos (sincronizado)",
            ),
        ],
    },
];

// =============================================================================
// Reports
// =============================================================================

/// A migration that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedMigration {
    pub version: i64,
    pub name: String,
    pub error: String,
}

/// Outcome of one `apply_migrations` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub applied: Vec<i64>,
    pub failed: Vec<FailedMigration>,
}

/// Known versus recorded migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub known: usize,
    pub applied: Vec<i64>,
    pub pending: Vec<i64>,
}

// =============================================================================
// Runner
// =============================================================================

/// Applies every pending migration, each in its own transaction.
///
/// Only fails if the version table itself can't be read. Failures of
/// individual migrations are logged, rolled back and reported.
pub async fn apply_migrations(pool: &SqlitePool) -> DbResult<MigrationReport> {
    let applied = applied_versions(pool).await?;
    let mut report = MigrationReport::default();

    for migration in MIGRATIONS.iter().filter(|m| !applied.contains(&m.version)) {
        match apply_one(pool, migration).await {
            Ok(()) => {
                info!(
                    version = migration.version,
                    name = migration.name,
                    "Migration applied"
                );
                report.applied.push(migration.version);
            }
            Err(e) => {
                warn!(
                    version = migration.version,
                    name = migration.name,
                    error = %e,
                    "Migration failed, skipped until next startup"
                );
                report.failed.push(FailedMigration {
                    version: migration.version,
                    name: migration.name.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    debug!(
        applied = report.applied.len(),
        failed = report.failed.len(),
        "Migration pass complete"
    );
    Ok(report)
}

/// Returns which known migrations are recorded as applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<MigrationStatus> {
    let applied = applied_versions(pool).await?;
    let pending = MIGRATIONS
        .iter()
        .map(|m| m.version)
        .filter(|v| !applied.contains(v))
        .collect();

    Ok(MigrationStatus {
        known: MIGRATIONS.len(),
        applied,
        pending,
    })
}

/// Every table, index and trigger definition, sorted. Two stores with the
/// same snapshot have the same schema.
pub async fn schema_snapshot(pool: &SqlitePool) -> DbResult<Vec<(String, String, Option<String>)>> {
    let rows = sqlx::query_as::<_, (String, String, Option<String>)>(
        "SELECT type, name, sql FROM sqlite_master \
         WHERE name NOT LIKE 'sqlite_%' ORDER BY type, name",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn applied_versions(pool: &SqlitePool) -> DbResult<Vec<i64>> {
    sqlx::query_scalar::<_, i64>("SELECT version FROM schema_migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| DbError::MigrationFailed(e.to_string()))
}

async fn apply_one(pool: &SqlitePool, migration: &Migration) -> DbResult<()> {
    let mut tx = pool.begin().await?;

    for step in migration.steps {
        run_step(&mut tx, step).await?;
    }

    sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .bind(pdv_core::timestamp::format(Utc::now()))
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn run_step(conn: &mut SqliteConnection, step: &Step) -> DbResult<()> {
    match step {
        Step::Sql(sql) => {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        Step::AddColumn {
            table,
            column,
            definition,
        } => {
            if column_exists(conn, table, column).await? {
                debug!(table, column, "Column already present");
            } else {
                let ddl = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
                sqlx::query(&ddl).execute(&mut *conn).await?;
            }
        }
        Step::Rebuild(rebuild) => rebuild_table(conn, rebuild).await?,
    }
    Ok(())
}

async fn rebuild_table(conn: &mut SqliteConnection, rebuild: &TableRebuild) -> DbResult<()> {
    let old_present = table_exists(conn, rebuild.table).await?;
    let shadow_present = table_exists(conn, rebuild.shadow).await?;

    if old_present {
        // Leftover shadow from an interrupted attempt carries no data we need
        if shadow_present {
            let drop = format!("DROP TABLE {}", rebuild.shadow);
            sqlx::query(&drop).execute(&mut *conn).await?;
        }
        sqlx::query(rebuild.create_shadow).execute(&mut *conn).await?;
        let copied = sqlx::query(rebuild.copy).execute(&mut *conn).await?;
        debug!(
            table = rebuild.table,
            rows = copied.rows_affected(),
            "Rows copied to shadow table"
        );
        let drop = format!("DROP TABLE {}", rebuild.table);
        sqlx::query(&drop).execute(&mut *conn).await?;
    } else if !shadow_present {
        sqlx::query(rebuild.create_shadow).execute(&mut *conn).await?;
    } else {
        warn!(
            table = rebuild.table,
            "Found only the shadow table, finishing the swap"
        );
    }

    let rename = format!(
        "ALTER TABLE {} RENAME TO {}",
        rebuild.shadow, rebuild.table
    );
    sqlx::query(&rename).execute(&mut *conn).await?;

    for index in rebuild.indexes {
        sqlx::query(index).execute(&mut *conn).await?;
    }
    Ok(())
}

async fn table_exists(conn: &mut SqliteConnection, table: &str) -> DbResult<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(&mut *conn)
            .await?;
    Ok(count > 0)
}

async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
        .bind(table)
        .bind(column)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count > 0)
}

// =============================================================================
// Unit Tests
// =============================================================================
