//! # pdv-db: Local Store for the PDV terminal
//!
//! The embedded store every other component reads and writes through. It
//! owns the on-disk file; nothing else persists state.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PDV Data Flow                                    │
//! │                                                                         │
//! │  UI / CashSessionManager / Pull + Push reconcilers                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pdv-db (THIS CRATE)                         │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐    │   │
//! │  │   │  LocalStore   │    │ Repositories  │    │  Migrations  │    │   │
//! │  │   │  (pool.rs)    │    │               │    │              │    │   │
//! │  │   │               │    │ Tenant        │    │ schema.rs    │    │   │
//! │  │   │ query/execute │◄───│ Reference     │    │ v1..v5       │    │   │
//! │  │   │ begin_write   │    │ Sale, Cash    │    │ descriptors  │    │   │
//! │  │   │ single writer │    │ ChangeCursor  │    │              │    │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite file (one per installation)          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - `LocalStore`, configuration, write transactions
//! - [`schema`] - Baseline tables
//! - [`migrations`] - Versioned migration descriptors and runner
//! - [`repository`] - Typed table access and change cursors
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_db::{DbConfig, LocalStore};
//!
//! let store = LocalStore::new(DbConfig::new("pdv.db"));
//! store.initialize().await?;
//!
//! let pending = store.sales().pending_push("t1").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod schema;
mod value;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::{MigrationReport, MigrationStatus};
pub use pool::{DbConfig, ExecuteResult, LocalStore, WriteTransaction};
pub use value::Row;

// Repository re-exports for convenience
pub use repository::cash::{CashMovementRepository, NewCashMovement};
pub use repository::cursor::{ChangeCursor, CursorEntry};
pub use repository::reference::{ReferenceRepository, ReferenceTable};
pub use repository::sale::{NewSale, NewSaleItem, NewSalePayment, SaleRepository};
pub use repository::tenant::TenantRepository;
