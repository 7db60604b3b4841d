//! # Local Store
//!
//! The terminal's single durable store: one SQLite file, one writer.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         LocalStore Lifecycle                            │
//! │                                                                         │
//! │  LocalStore::new(config)        ← cheap, no I/O, every call fails       │
//! │       │                            with NotInitialized                  │
//! │       ▼                                                                 │
//! │  initialize().await                                                     │
//! │       ├── open file (create if missing), foreign_keys = ON              │
//! │       ├── create_schema()    ← baseline, IF NOT EXISTS                  │
//! │       └── apply_migrations() ← versioned, failures logged + skipped     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌──────────────────────────────────────────┐                           │
//! │  │  SqlitePool          write_lock (Mutex)  │                           │
//! │  │  readers: any conn   writers: one at a   │                           │
//! │  │                      time, in order      │                           │
//! │  └──────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  query() / execute() / begin_write() / repositories                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Durability
//! WAL journal with `synchronous = FULL`: once `execute` or
//! `WriteTransaction::commit` returns, the change is in the backing file.

use serde::Serialize;
use serde_json::Value;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationReport, MigrationStatus};
use crate::repository::cash::CashMovementRepository;
use crate::repository::cursor::ChangeCursor;
use crate::repository::reference::ReferenceRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::tenant::TenantRepository;
use crate::schema;
use crate::value::{self, Row};

const MEMORY_PATH: &str = ":memory:";

/// A statement with positional binds, ready to run.
pub type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

// =============================================================================
// Configuration
// =============================================================================

/// Store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/pdv/pdv.db").max_connections(4);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Maximum number of pooled connections.
    /// Default: 4 (readers only contend with one writer)
    pub max_connections: u32,

    /// Connection acquire timeout.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Whether `initialize` applies migrations after the baseline schema.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a configuration for a file-backed store.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            connect_timeout: Duration::from_secs(30),
            run_migrations: true,
        }
    }

    /// Creates an in-memory store configuration (for testing).
    ///
    /// Each SQLite connection to `:memory:` is its own database, so the pool
    /// is pinned to a single connection that is never recycled.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            connect_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on initialize.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }
}

// =============================================================================
// LocalStore
// =============================================================================

/// Result of `execute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub rows_affected: u64,
}

#[derive(Debug)]
struct Ready {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    migrations: MigrationReport,
}

#[derive(Debug)]
struct Shared {
    config: DbConfig,
    ready: OnceCell<Ready>,
}

/// Handle to the terminal's local store. Cheap to clone.
///
/// ## Usage
/// ```rust,ignore
/// let store = LocalStore::new(DbConfig::new("./pdv.db"));
/// store.initialize().await?;
///
/// let rows = store
///     .query("SELECT id, descricao FROM produtos WHERE empresa_id = ?", &[json!("t1")])
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct LocalStore {
    shared: Arc<Shared>,
}

impl LocalStore {
    /// Creates an uninitialized handle. No I/O happens here.
    pub fn new(config: DbConfig) -> Self {
        LocalStore {
            shared: Arc::new(Shared {
                config,
                ready: OnceCell::new(),
            }),
        }
    }

    /// Convenience for tests and tools: `new` + `initialize`.
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        let store = LocalStore::new(config);
        store.initialize().await?;
        Ok(store)
    }

    /// Opens the backing file, creates the baseline schema and applies
    /// migrations.
    ///
    /// Idempotent: concurrent or repeated calls initialize once. A failed
    /// attempt leaves the store uninitialized, so it can be retried.
    pub async fn initialize(&self) -> DbResult<()> {
        self.shared
            .ready
            .get_or_try_init(|| open_ready(&self.shared.config))
            .await?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.ready.initialized()
    }

    pub fn config(&self) -> &DbConfig {
        &self.shared.config
    }

    fn ready(&self) -> DbResult<&Ready> {
        self.shared.ready.get().ok_or(DbError::NotInitialized)
    }

    /// Returns the connection pool, for read-only access.
    pub fn pool(&self) -> DbResult<&SqlitePool> {
        Ok(&self.ready()?.pool)
    }

    /// Acquires a pooled connection for reads.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool()?.acquire().await?)
    }

    /// Runs a read statement and returns every row as a JSON object.
    pub async fn query(&self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let pool = self.pool()?;
        let query = value::bind_all(sqlx::query(sql), params)?;
        let rows = query.fetch_all(pool).await?;
        rows.iter().map(value::decode_row).collect()
    }

    /// Runs a write statement under the writer lock.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<ExecuteResult> {
        let ready = self.ready()?;
        let _guard = ready.write_lock.lock().await;

        let query = value::bind_all(sqlx::query(sql), params)?;
        let result = query.execute(&ready.pool).await?;

        debug!(rows_affected = result.rows_affected(), "Executed statement");
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
        })
    }

    /// Runs a prepared statement under the writer lock. Returns rows affected.
    pub async fn execute_write<'q>(&self, query: SqliteQuery<'q>) -> DbResult<u64> {
        let ready = self.ready()?;
        let _guard = ready.write_lock.lock().await;
        Ok(query.execute(&ready.pool).await?.rows_affected())
    }

    /// Starts a write transaction. Holds the writer lock until commit or drop.
    pub async fn begin_write(&self) -> DbResult<WriteTransaction<'_>> {
        let ready = self.ready()?;
        let guard = ready.write_lock.lock().await;
        let tx = ready.pool.begin().await?;
        Ok(WriteTransaction { tx, _guard: guard })
    }

    /// Writes a consistent snapshot of the store to `target`.
    ///
    /// Refuses to overwrite an existing file.
    pub async fn export_to(&self, target: &Path) -> DbResult<()> {
        let ready = self.ready()?;
        if target.exists() {
            return Err(DbError::Internal(format!(
                "export target already exists: {}",
                target.display()
            )));
        }

        let _guard = ready.write_lock.lock().await;
        sqlx::query("VACUUM INTO ?")
            .bind(target.to_string_lossy().into_owned())
            .execute(&ready.pool)
            .await?;

        info!(target = %target.display(), "Store exported");
        Ok(())
    }

    /// Migrations applied and skipped during `initialize`.
    pub fn last_migration_report(&self) -> DbResult<&MigrationReport> {
        Ok(&self.ready()?.migrations)
    }

    /// Versions known to this build and which of them are recorded.
    pub async fn migration_status(&self) -> DbResult<MigrationStatus> {
        migrations::migration_status(self.pool()?).await
    }

    /// Re-runs pending migrations (those that failed at startup).
    pub async fn apply_migrations(&self) -> DbResult<MigrationReport> {
        let ready = self.ready()?;
        let _guard = ready.write_lock.lock().await;
        migrations::apply_migrations(&ready.pool).await
    }

    /// Checks if the store answers queries.
    pub async fn health_check(&self) -> bool {
        match self.pool() {
            Ok(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            Err(_) => false,
        }
    }

    /// Closes the pool. Subsequent calls fail.
    pub async fn close(&self) {
        if let Ok(ready) = self.ready() {
            info!("Closing local store");
            ready.pool.close().await;
        }
    }

    // -------------------------------------------------------------------------
    // Repositories
    // -------------------------------------------------------------------------

    pub fn tenants(&self) -> TenantRepository {
        TenantRepository::new(self.clone())
    }

    pub fn reference(&self) -> ReferenceRepository {
        ReferenceRepository::new(self.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.clone())
    }

    pub fn cash_movements(&self) -> CashMovementRepository {
        CashMovementRepository::new(self.clone())
    }

    pub fn cursors(&self) -> ChangeCursor {
        ChangeCursor::new(self.clone())
    }
}

async fn open_ready(config: &DbConfig) -> DbResult<Ready> {
    info!(
        path = %config.database_path.display(),
        "Initializing local store"
    );

    let base = if config.is_in_memory() {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
    } else {
        SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
    };
    // Every committed write reaches the file before the call returns
    let options = base
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.connect_timeout);
    if config.is_in_memory() {
        pool_options = pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

    schema::create_schema(&pool).await?;

    let migrations = if config.run_migrations {
        migrations::apply_migrations(&pool).await?
    } else {
        warn!("Migrations disabled by configuration");
        MigrationReport::default()
    };

    info!(
        applied = migrations.applied.len(),
        failed = migrations.failed.len(),
        "Local store ready"
    );

    Ok(Ready {
        pool,
        write_lock: Mutex::new(()),
        migrations,
    })
}

// =============================================================================
// Write Transaction
// =============================================================================

/// A transaction that owns the writer lock.
///
/// Dropping it without `commit` rolls back.
pub struct WriteTransaction<'a> {
    tx: Transaction<'static, Sqlite>,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> WriteTransaction<'a> {
    /// The connection to run statements on.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

impl Deref for WriteTransaction<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.tx
    }
}

impl DerefMut for WriteTransaction<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_calls_before_initialize_fail() {
        let store = LocalStore::new(DbConfig::in_memory());

        assert!(!store.is_initialized());
        assert!(matches!(
            store.query("SELECT 1", &[]).await,
            Err(DbError::NotInitialized)
        ));
        assert!(matches!(
            store.execute("DELETE FROM empresas", &[]).await,
            Err(DbError::NotInitialized)
        ));
        assert!(matches!(
            store.begin_write().await.map(|_| ()),
            Err(DbError::NotInitialized)
        ));
        assert!(!store.health_check().await);
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let store = LocalStore::new(DbConfig::in_memory());
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
        assert!(store.health_check().await);
    }

    #[tokio::test]
    async fn test_query_and_execute_roundtrip_json() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();

        let result = store
            .execute(
                "INSERT INTO empresas (id, nome, cnpj, ativo, updated_at) VALUES (?, ?, ?, ?, ?)",
                &[
                    json!("t1"),
                    json!("Mercadinho Central"),
                    Value::Null,
                    json!(true),
                    json!("2026-03-01T12:00:00.000000Z"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(result.rows_affected, 1);

        let rows = store
            .query("SELECT id, nome, cnpj, ativo FROM empresas WHERE id = ?", &[json!("t1")])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["nome"], json!("Mercadinho Central"));
        assert_eq!(rows[0]["cnpj"], Value::Null);
        assert_eq!(rows[0]["ativo"], json!(1));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        {
            let mut tx = store.begin_write().await.unwrap();
            sqlx::query(
                "INSERT INTO empresas (id, nome, ativo, updated_at) VALUES ('t9', 'X', 1, '2026-01-01T00:00:00.000000Z')",
            )
            .execute(tx.conn())
            .await
            .unwrap();
        }
        let rows = store
            .query("SELECT id FROM empresas WHERE id = 't9'", &[])
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/pdv.db").max_connections(8);
        assert_eq!(config.max_connections, 8);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}
