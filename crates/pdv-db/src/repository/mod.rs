//! # Repository Module
//!
//! Typed access to the local store's tables.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Caller (reconciler, cash manager, seed)                                │
//! │       │                                                                 │
//! │       │  store.sales().pending_push("t1")                               │
//! │       ▼                                                                 │
//! │  SaleRepository                                                         │
//! │  ├── reads     → any pooled connection                                  │
//! │  ├── writes    → LocalStore::begin_write (single writer)                │
//! │  └── *_in(conn, ..) → compose several statements in one transaction     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (Portuguese table/column names, aliased to Rust field names)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`TenantRepository`](tenant::TenantRepository) - `empresas`
//! - [`ReferenceRepository`](reference::ReferenceRepository) - mirrored catalog, customers, payment methods
//! - [`SaleRepository`](sale::SaleRepository) - sales with items and payments
//! - [`CashMovementRepository`](cash::CashMovementRepository) - cash drawer ledger
//! - [`ChangeCursor`](cursor::ChangeCursor) - per-table pull cursors (`sync_metadata`)

pub mod cash;
pub mod cursor;
pub mod reference;
pub mod sale;
pub mod tenant;
