//! # pdv-core: Pure Domain Logic for the PDV terminal
//!
//! This crate holds the domain types and rules shared by the local store and
//! the sync engine. It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        PDV Terminal Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           UI layer (sales, configuration, history screens)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   pdv-sync: SyncOrchestrator, CashSessionManager, reconcilers   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   pdv-db: LocalStore, migrations, repositories, ChangeCursor    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ pdv-core (THIS CRATE) ★                         │   │
//! │  │   types • money • cash ledger • validation • timestamps         │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain rows (tenant, catalog, sales, cash movements)
//! - [`money`] - Money type with integer centavos (no floating point!)
//! - [`cash`] - Cash session ledger: expected balance and variance
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//! - [`timestamp`] - Fixed-width UTC timestamps used for cursors and LWW

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod error;
pub mod money;
pub mod timestamp;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cash::{CashStatus, OpenSession, SessionClosing, SessionLedger};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a free-text description (cash movements, notes).
pub const MAX_DESCRIPTION_LEN: usize = 200;
