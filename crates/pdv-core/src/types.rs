//! # Domain Types
//!
//! Rows mirrored from the backend and rows originated on the terminal.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  REFERENCE (remote-owned, pulled)     TRANSACTIONAL (local, pushed)     │
//! │  ────────────────────────────────     ─────────────────────────────     │
//! │  ┌─────────────────┐                  ┌─────────────────┐               │
//! │  │ Tenant          │                  │ Sale            │──┬─ SaleItem  │
//! │  │ CatalogItem     │                  │  uuid (idem.)   │  └─ SalePayment│
//! │  │ Customer        │                  │  sync_state     │               │
//! │  │ PaymentMethod   │                  │  remote_id      │               │
//! │  │  id = remote id │                  └─────────────────┘               │
//! │  │  updated_at LWW │                  ┌─────────────────┐               │
//! │  └─────────────────┘                  │ CashMovement    │               │
//! │                                       │  kind, session  │               │
//! │                                       └─────────────────┘               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! - Reference rows are keyed by the id the backend assigned.
//! - Transactional rows have a local integer id plus an immutable `uuid`
//!   idempotency key generated at creation; `remote_id` is filled in once the
//!   backend accepts the row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;
use crate::money::Money;

/// Generates a new idempotency key for a locally created row.
pub fn new_idempotency_key() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Reference Entities
// =============================================================================

/// A tenant (empresa): the unit every row and every sync call is scoped to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Tenant {
    pub id: String,
    pub name: String,
    /// CNPJ, when the backend exposes it.
    pub document: Option<String>,
    pub active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A catalog item (produto) available for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CatalogItem {
    /// Remote-assigned id.
    pub id: String,
    pub tenant_id: String,
    /// Business code typed by the cashier.
    pub code: String,
    pub barcode: Option<String>,
    pub description: String,
    /// Unit of measure (UN, KG, ...).
    pub unit: String,
    pub price_cents: i64,
    pub active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// Always true once mirrored; not an upload marker.
    pub synced: bool,
}

impl CatalogItem {
    /// Returns the price as Money.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

/// A customer (cliente).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// CPF or CNPJ.
    pub document: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
}

/// A payment method (forma de pagamento).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentMethod {
    pub id: String,
    pub tenant_id: String,
    pub description: String,
    /// Backend classification (dinheiro, cartao_credito, pix, ...).
    pub kind: String,
    pub active: bool,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    pub synced: bool,
}

// =============================================================================
// Sync State
// =============================================================================

/// Upload state of a locally originated row.
///
/// ```text
///   Pending ──parent accepted──► Partial ──all children accepted──► Synced
///      │                                                              ▲
///      └──────────────── no children / all accepted at once ──────────┘
/// ```
///
/// `Synced` is terminal: a synced row is never submitted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing acknowledged by the backend yet.
    #[default]
    Pending,
    /// Parent row accepted, some children still outstanding.
    Partial,
    /// Parent and every child acknowledged.
    Synced,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::Partial => "partial",
            SyncState::Synced => "synced",
        }
    }

    /// Whether the row still has something to upload.
    pub fn needs_push(&self) -> bool {
        !matches!(self, SyncState::Synced)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// Lifecycle status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Items still being added.
    #[default]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "aberta"))]
    Open,
    /// Paid and closed.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "fechada"))]
    Closed,
    /// Closed and a fiscal document was issued.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "faturada"))]
    Invoiced,
    /// Cancelled before closing.
    #[cfg_attr(feature = "sqlx", sqlx(rename = "cancelada"))]
    Cancelled,
}

impl SaleStatus {
    /// Storage / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Open => "aberta",
            SaleStatus::Closed => "fechada",
            SaleStatus::Invoiced => "faturada",
            SaleStatus::Cancelled => "cancelada",
        }
    }

    /// Only terminal, completed sales are uploaded.
    pub fn is_pushable(&self) -> bool {
        matches!(self, SaleStatus::Closed | SaleStatus::Invoiced)
    }

    /// Statuses eligible for push, as stored.
    pub fn pushable() -> [SaleStatus; 2] {
        [SaleStatus::Closed, SaleStatus::Invoiced]
    }
}

impl FromStr for SaleStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aberta" => Ok(SaleStatus::Open),
            "fechada" => Ok(SaleStatus::Closed),
            "faturada" => Ok(SaleStatus::Invoiced),
            "cancelada" => Ok(SaleStatus::Cancelled),
            other => Err(CoreError::UnknownValue {
                field: "sale status".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// A sale (venda) recorded on this terminal.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    /// Local row id.
    pub id: i64,
    /// Idempotency key, immutable.
    pub uuid: String,
    pub tenant_id: String,
    /// Sequential number shown on the receipt.
    pub number: i64,
    pub customer_id: Option<String>,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    /// True exactly when `sync_state` is `Synced`.
    pub synced: bool,
    /// Id assigned by the backend, set once.
    pub remote_id: Option<String>,
    pub sync_state: SyncState,
    pub sync_attempts: i64,
    pub sync_error: Option<String>,
}

impl Sale {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item of a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: i64,
    pub uuid: String,
    pub tenant_id: String,
    pub sale_id: i64,
    /// Catalog item id (remote id).
    pub product_id: String,
    /// Description frozen at time of sale.
    pub description: String,
    /// Fractional for weighed goods.
    pub quantity: f64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    /// Set together with `remote_id` once the backend accepted the line.
    pub synced: bool,
    pub remote_id: Option<String>,
}

/// A payment towards a sale. A sale may carry several (split tender).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SalePayment {
    pub id: i64,
    pub uuid: String,
    pub tenant_id: String,
    pub sale_id: i64,
    pub payment_method_id: String,
    pub amount_cents: i64,
    /// Change handed back (cash only).
    pub change_cents: i64,
    pub synced: bool,
    pub remote_id: Option<String>,
}

impl SalePayment {
    /// Amount that actually stays in the drawer.
    #[inline]
    pub fn net(&self) -> Money {
        Money::from_cents(self.amount_cents - self.change_cents)
    }
}

// =============================================================================
// Cash Movements
// =============================================================================

/// Kind of cash movement. A cash session is the sequence
/// `ABERTURA (ENTRADA|SAIDA)* FECHAMENTO` sharing one session number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashMovementKind {
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ABERTURA"))]
    #[serde(rename = "ABERTURA")]
    Opening,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "ENTRADA"))]
    #[serde(rename = "ENTRADA")]
    Entry,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "SAIDA"))]
    #[serde(rename = "SAIDA")]
    Exit,
    #[cfg_attr(feature = "sqlx", sqlx(rename = "FECHAMENTO"))]
    #[serde(rename = "FECHAMENTO")]
    Closing,
}

impl CashMovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CashMovementKind::Opening => "ABERTURA",
            CashMovementKind::Entry => "ENTRADA",
            CashMovementKind::Exit => "SAIDA",
            CashMovementKind::Closing => "FECHAMENTO",
        }
    }
}

impl fmt::Display for CashMovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the cash drawer ledger (movimento de caixa).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct CashMovement {
    pub id: i64,
    pub uuid: String,
    pub tenant_id: String,
    pub terminal_id: String,
    pub kind: CashMovementKind,
    pub amount_cents: i64,
    pub description: Option<String>,
    /// Calendar day the session belongs to.
    #[ts(as = "String")]
    pub business_day: NaiveDate,
    pub session_number: i64,
    /// False once the session's FECHAMENTO is written.
    pub session_open: bool,
    /// Counted minus expected; only on FECHAMENTO rows.
    pub variance_cents: Option<i64>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    pub synced: bool,
    pub remote_id: Option<String>,
    pub sync_state: SyncState,
    pub sync_attempts: i64,
    pub sync_error: Option<String>,
}

impl CashMovement {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sale_status_roundtrip_and_gate() {
        for status in [
            SaleStatus::Open,
            SaleStatus::Closed,
            SaleStatus::Invoiced,
            SaleStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SaleStatus>().unwrap(), status);
        }
        assert!(!SaleStatus::Open.is_pushable());
        assert!(!SaleStatus::Cancelled.is_pushable());
        assert!(SaleStatus::Closed.is_pushable());
        assert!(SaleStatus::Invoiced.is_pushable());
        assert!("desconhecida".parse::<SaleStatus>().is_err());
    }

    #[test]
    fn test_sync_state() {
        assert_eq!(SyncState::default(), SyncState::Pending);
        assert!(SyncState::Pending.needs_push());
        assert!(SyncState::Partial.needs_push());
        assert!(!SyncState::Synced.needs_push());
    }

    #[test]
    fn test_cash_movement_kind_wire_names() {
        let json = serde_json::to_string(&CashMovementKind::Closing).unwrap();
        assert_eq!(json, "\"FECHAMENTO\"");
        let kind: CashMovementKind = serde_json::from_str("\"SAIDA\"").unwrap();
        assert_eq!(kind, CashMovementKind::Exit);
    }

    #[test]
    fn test_idempotency_keys_are_unique() {
        assert_ne!(new_idempotency_key(), new_idempotency_key());
    }

    #[test]
    fn test_payment_net() {
        let payment = SalePayment {
            id: 1,
            uuid: new_idempotency_key(),
            tenant_id: "t1".into(),
            sale_id: 1,
            payment_method_id: "dinheiro".into(),
            amount_cents: 5000,
            change_cents: 350,
            synced: false,
            remote_id: None,
        };
        assert_eq!(payment.net().cents(), 4650);
    }
}
