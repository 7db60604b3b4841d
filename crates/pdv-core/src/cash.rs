//! # Cash Session Ledger
//!
//! Pure arithmetic over the movements of one cash session.
//!
//! ## Session Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caixa_numero = 1, tenant = T, day = 2026-03-01                         │
//! │                                                                         │
//! │   ABERTURA   +100,00   ─┐                                               │
//! │   ENTRADA    + 50,00    │  expected = opening + entries - exits         │
//! │   SAIDA      - 20,00   ─┘           = 130,00                            │
//! │   FECHAMENTO  130,00      variance = counted - expected = 0,00          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The store owns the rows; this module only folds them. Nothing here knows
//! whether the session is persisted or what day it is.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{CashMovement, CashMovementKind};

// =============================================================================
// Session Ledger
// =============================================================================

/// Running totals of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionLedger {
    pub opening: Money,
    pub entries: Money,
    pub exits: Money,
}

impl SessionLedger {
    /// Starts a ledger from the opening amount.
    pub fn opened_with(opening: Money) -> Self {
        SessionLedger {
            opening,
            ..Default::default()
        }
    }

    /// Folds the movements of a session.
    ///
    /// Fails with [`CoreError::NoOpenSession`] if the slice has no ABERTURA.
    /// A FECHAMENTO row carries the counted amount and does not change the
    /// expected balance.
    pub fn from_movements(movements: &[CashMovement]) -> CoreResult<Self> {
        let opening = movements
            .iter()
            .find(|m| m.kind == CashMovementKind::Opening)
            .ok_or(CoreError::NoOpenSession)?;

        let mut ledger = SessionLedger::opened_with(opening.amount());
        for movement in movements {
            ledger.apply(movement.kind, movement.amount());
        }
        Ok(ledger)
    }

    /// Applies one movement.
    pub fn apply(&mut self, kind: CashMovementKind, amount: Money) {
        match kind {
            CashMovementKind::Entry => self.entries += amount,
            CashMovementKind::Exit => self.exits += amount,
            CashMovementKind::Opening | CashMovementKind::Closing => {}
        }
    }

    /// opening + entries - exits
    pub fn expected_balance(&self) -> Money {
        self.opening + self.entries - self.exits
    }

    /// Counted amount minus expected balance. Negative means money is missing.
    pub fn variance(&self, counted: Money) -> Money {
        counted - self.expected_balance()
    }
}

// =============================================================================
// Status Projection
// =============================================================================

/// An open session as seen by the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenSession {
    pub session_number: i64,
    /// Local calendar day, `YYYY-MM-DD`.
    pub business_day: String,
    /// Timestamp of the ABERTURA row.
    pub opened_at: String,
    pub opening: Money,
    pub entries: Money,
    pub exits: Money,
    pub expected_balance: Money,
}

impl OpenSession {
    pub fn ledger(&self) -> SessionLedger {
        SessionLedger {
            opening: self.opening,
            entries: self.entries,
            exits: self.exits,
        }
    }
}

/// Current cash drawer state for a tenant and day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CashStatus {
    Closed,
    Open(OpenSession),
}

impl CashStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, CashStatus::Open(_))
    }

    pub fn open_session(&self) -> Option<&OpenSession> {
        match self {
            CashStatus::Open(session) => Some(session),
            CashStatus::Closed => None,
        }
    }
}

/// Result of closing a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionClosing {
    pub session_number: i64,
    pub expected_balance: Money,
    pub counted: Money,
    pub variance: Money,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncState;
    use chrono::{NaiveDate, Utc};

    fn movement(kind: CashMovementKind, cents: i64) -> CashMovement {
        CashMovement {
            id: 0,
            uuid: crate::types::new_idempotency_key(),
            tenant_id: "t1".into(),
            terminal_id: "pdv-01".into(),
            kind,
            amount_cents: cents,
            description: None,
            business_day: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            session_number: 1,
            session_open: true,
            variance_cents: None,
            created_at: Utc::now(),
            synced: false,
            remote_id: None,
            sync_state: SyncState::Pending,
            sync_attempts: 0,
            sync_error: None,
        }
    }

    #[test]
    fn test_expected_balance_and_zero_variance() {
        let movements = vec![
            movement(CashMovementKind::Opening, 10_000),
            movement(CashMovementKind::Entry, 5_000),
            movement(CashMovementKind::Exit, 2_000),
        ];
        let ledger = SessionLedger::from_movements(&movements).unwrap();

        assert_eq!(ledger.expected_balance().cents(), 13_000);
        assert!(ledger.variance(Money::from_cents(13_000)).is_zero());
        assert_eq!(ledger.variance(Money::from_cents(12_500)).cents(), -500);
    }

    #[test]
    fn test_closing_row_does_not_move_balance() {
        let movements = vec![
            movement(CashMovementKind::Opening, 10_000),
            movement(CashMovementKind::Closing, 9_000),
        ];
        let ledger = SessionLedger::from_movements(&movements).unwrap();
        assert_eq!(ledger.expected_balance().cents(), 10_000);
    }

    #[test]
    fn test_missing_opening_is_no_open_session() {
        let movements = vec![movement(CashMovementKind::Entry, 100)];
        assert!(matches!(
            SessionLedger::from_movements(&movements),
            Err(CoreError::NoOpenSession)
        ));
    }

    #[test]
    fn test_status_serializes_with_state_tag() {
        let json = serde_json::to_value(CashStatus::Closed).unwrap();
        assert_eq!(json["state"], "closed");
    }
}
