//! # Cash Session Manager
//!
//! Opens, moves and closes the cash drawer of a terminal.
//!
//! ## State Machine (per tenant and business day)
//! ```text
//!                open(amount)
//!   ┌────────┐ ─────────────────▶ ┌────────┐ ──┐ record_entry / record_exit
//!   │ CLOSED │                    │  OPEN  │ ◀─┘
//!   └────────┘ ◀───────────────── └────────┘
//!                close(counted)
//! ```
//!
//! Every transition is one write transaction: the open-session check, the
//! session number and the new movement are read and written under the
//! writer lock, so two callers can never open the same session twice.
//!
//! Sessions are numbered per day: the first drawer of the day is 1, a
//! reopening after a close is 2, and so on. Sessions left open on a previous
//! day are not carried over; the status only looks at today.
//!
//! After a successful transition, pending movements are pushed in the
//! background if a [`PushReconciler`] was attached. That push never affects
//! the result of the transition.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use pdv_core::validation::{validate_description, validate_movement_amount, validate_opening_amount};
use pdv_core::{
    timestamp, CashMovement, CashMovementKind, CashStatus, CoreError, Money, OpenSession,
    SessionClosing, SessionLedger,
};
use pdv_db::{CashMovementRepository, LocalStore, NewCashMovement};
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::push::PushReconciler;

pub struct CashSessionManager {
    store: LocalStore,
    tenant_id: String,
    terminal_id: String,
    push: Option<Arc<PushReconciler>>,
}

impl CashSessionManager {
    pub fn new(store: LocalStore, tenant_id: impl Into<String>, terminal_id: impl Into<String>) -> Self {
        CashSessionManager {
            store,
            tenant_id: tenant_id.into(),
            terminal_id: terminal_id.into(),
            push: None,
        }
    }

    /// Pushes pending cash movements after every transition.
    pub fn with_background_push(mut self, push: Arc<PushReconciler>) -> Self {
        self.push = Some(push);
        self
    }

    /// The local calendar day sessions are numbered in.
    pub fn business_day(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// Current drawer state. Read-only.
    pub async fn status(&self) -> SyncResult<CashStatus> {
        let day = self.business_day();
        let mut conn = self.store.acquire().await?;

        let Some(number) =
            CashMovementRepository::open_session_number_in(&mut conn, &self.tenant_id, day).await?
        else {
            return Ok(CashStatus::Closed);
        };

        let movements =
            CashMovementRepository::session_movements_in(&mut conn, &self.tenant_id, day, number)
                .await?;
        Ok(CashStatus::Open(project(number, day, &movements)?))
    }

    /// Movements of one of today's sessions, oldest first.
    pub async fn movements(&self, session_number: i64) -> SyncResult<Vec<CashMovement>> {
        Ok(self
            .store
            .cash_movements()
            .session_movements(&self.tenant_id, self.business_day(), session_number)
            .await?)
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Opens a new session with `amount` in the drawer.
    ///
    /// # Errors
    /// - `AlreadyOpen` if today's session is still open (nothing is written)
    /// - validation error if `amount` is negative
    pub async fn open(&self, amount: Money) -> SyncResult<OpenSession> {
        validate_opening_amount(amount)?;
        let day = self.business_day();

        let mut tx = self.store.begin_write().await?;
        if let Some(session_number) =
            CashMovementRepository::open_session_number_in(tx.conn(), &self.tenant_id, day).await?
        {
            tx.rollback().await?;
            return Err(CoreError::AlreadyOpen { session_number }.into());
        }

        let session_number =
            CashMovementRepository::next_session_number_in(tx.conn(), &self.tenant_id, day).await?;
        let opening = CashMovementRepository::insert_in(
            tx.conn(),
            &self.movement(CashMovementKind::Opening, amount, None, day, session_number),
        )
        .await?;
        tx.commit().await?;

        info!(session = session_number, amount = %amount, "Cash session opened");
        self.push_in_background();

        project(session_number, day, std::slice::from_ref(&opening))
    }

    /// Records money put into the drawer (ENTRADA).
    pub async fn record_entry(&self, amount: Money, description: Option<&str>) -> SyncResult<CashMovement> {
        self.record(CashMovementKind::Entry, amount, description).await
    }

    /// Records money taken out of the drawer (SAIDA).
    pub async fn record_exit(&self, amount: Money, description: Option<&str>) -> SyncResult<CashMovement> {
        self.record(CashMovementKind::Exit, amount, description).await
    }

    async fn record(
        &self,
        kind: CashMovementKind,
        amount: Money,
        description: Option<&str>,
    ) -> SyncResult<CashMovement> {
        validate_movement_amount(amount)?;
        let description = validate_description(description)?;
        let day = self.business_day();

        let mut tx = self.store.begin_write().await?;
        let Some(session_number) =
            CashMovementRepository::open_session_number_in(tx.conn(), &self.tenant_id, day).await?
        else {
            tx.rollback().await?;
            return Err(CoreError::NoOpenSession.into());
        };

        let movement = CashMovementRepository::insert_in(
            tx.conn(),
            &self.movement(kind, amount, description, day, session_number),
        )
        .await?;
        tx.commit().await?;

        debug!(session = session_number, kind = kind.as_str(), amount = %amount, "Cash movement recorded");
        self.push_in_background();
        Ok(movement)
    }

    /// Closes the open session with the `counted` amount.
    ///
    /// Writes a FECHAMENTO carrying the variance (counted - expected) and
    /// flags every movement of the session as closed.
    pub async fn close(&self, counted: Money) -> SyncResult<SessionClosing> {
        validate_opening_amount(counted)?;
        let day = self.business_day();

        let mut tx = self.store.begin_write().await?;
        let Some(session_number) =
            CashMovementRepository::open_session_number_in(tx.conn(), &self.tenant_id, day).await?
        else {
            tx.rollback().await?;
            return Err(CoreError::NoOpenSession.into());
        };

        let movements =
            CashMovementRepository::session_movements_in(tx.conn(), &self.tenant_id, day, session_number)
                .await?;
        let ledger = SessionLedger::from_movements(&movements)?;
        let expected_balance = ledger.expected_balance();
        let variance = ledger.variance(counted);

        let mut closing = self.movement(CashMovementKind::Closing, counted, None, day, session_number);
        closing.variance_cents = Some(variance.cents());
        CashMovementRepository::insert_in(tx.conn(), &closing).await?;
        let closed_rows =
            CashMovementRepository::close_session_in(tx.conn(), &self.tenant_id, day, session_number)
                .await?;
        tx.commit().await?;

        info!(
            session = session_number,
            expected = %expected_balance,
            counted = %counted,
            variance = %variance,
            rows = closed_rows,
            "Cash session closed"
        );
        self.push_in_background();

        Ok(SessionClosing {
            session_number,
            expected_balance,
            counted,
            variance,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn movement(
        &self,
        kind: CashMovementKind,
        amount: Money,
        description: Option<String>,
        business_day: NaiveDate,
        session_number: i64,
    ) -> NewCashMovement {
        NewCashMovement {
            tenant_id: self.tenant_id.clone(),
            terminal_id: self.terminal_id.clone(),
            kind,
            amount_cents: amount.cents(),
            description,
            business_day,
            session_number,
            variance_cents: None,
        }
    }

    fn push_in_background(&self) {
        let Some(push) = self.push.clone() else {
            return;
        };

        tokio::spawn(async move {
            match push.push_cash_movements().await {
                Ok(report) if report.failed > 0 => {
                    warn!(failed = report.failed, "Background cash push left rows pending");
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "Background cash push failed"),
            }
        });
    }
}

/// Builds the status view of an open session from its movements.
fn project(session_number: i64, day: NaiveDate, movements: &[CashMovement]) -> SyncResult<OpenSession> {
    let ledger = SessionLedger::from_movements(movements)?;
    let opened_at = movements
        .iter()
        .find(|m| m.kind == CashMovementKind::Opening)
        .map(|m| timestamp::format(m.created_at))
        .unwrap_or_default();

    Ok(OpenSession {
        session_number,
        business_day: day.format("%Y-%m-%d").to_string(),
        opened_at,
        opening: ledger.opening,
        entries: ledger.entries,
        exits: ledger.exits,
        expected_balance: ledger.expected_balance(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use pdv_db::DbConfig;

    async fn manager() -> CashSessionManager {
        let store = LocalStore::open(DbConfig::in_memory()).await.unwrap();
        CashSessionManager::new(store, "t1", "pdv-01")
    }

    #[tokio::test]
    async fn test_movements_require_open_session() {
        let cash = manager().await;
        let err = cash.record_entry(Money::from_cents(500), None).await.unwrap_err();
        assert!(matches!(err, SyncError::Core(CoreError::NoOpenSession)));
        assert!(matches!(
            cash.close(Money::zero()).await.unwrap_err(),
            SyncError::Core(CoreError::NoOpenSession)
        ));
    }

    #[tokio::test]
    async fn test_invalid_amounts_write_nothing() {
        let cash = manager().await;
        assert!(cash.open(Money::from_cents(-1)).await.is_err());
        assert_eq!(cash.status().await.unwrap(), CashStatus::Closed);

        cash.open(Money::zero()).await.unwrap();
        assert!(cash.record_exit(Money::zero(), Some("sangria")).await.is_err());
        assert_eq!(cash.movements(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_after_close_uses_next_number() {
        let cash = manager().await;
        cash.open(Money::from_cents(10_000)).await.unwrap();
        cash.close(Money::from_cents(10_000)).await.unwrap();

        let second = cash.open(Money::from_cents(5_000)).await.unwrap();
        assert_eq!(second.session_number, 2);
        assert_eq!(second.expected_balance, Money::from_cents(5_000));
    }

    #[tokio::test]
    async fn test_description_is_trimmed() {
        let cash = manager().await;
        cash.open(Money::from_cents(100)).await.unwrap();
        let movement = cash
            .record_entry(Money::from_cents(50), Some("  troco  "))
            .await
            .unwrap();
        assert_eq!(movement.description.as_deref(), Some("troco"));
        assert_eq!(movement.session_number, 1);
        assert!(movement.session_open);
    }
}
