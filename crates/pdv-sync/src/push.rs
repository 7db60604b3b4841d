//! # Push Reconciler
//!
//! Delivers locally recorded sales and cash movements to the backend, one
//! row at a time, continuing past row-level failures.
//!
//! ## Sale Push
//! ```text
//!   pending ──parent accepted──▶ partial ──every child accepted──▶ synced
//!      │                            │
//!      └── failure: attempts+1 ─────┘  (retries send only what is missing)
//! ```
//!
//! 1. Validate locally (items, positive payments, total covered). A sale
//!    that fails validation is never sent.
//! 2. Insert the parent into `vendas` unless it already has a remote id.
//! 3. Insert each item and payment that has no remote id yet.
//! 4. Mark the sale synced.
//!
//! ## Dedup
//! Every payload carries its idempotency key in `uuid`. When the backend's
//! unique index answers `Duplicate`, the existing row's id is looked up by
//! key and the insert counts as accepted. A lost acknowledgement therefore
//! never produces a second remote row.
//!
//! ## Batch Abort
//! Row failures are counted and the batch continues. The batch stops with an
//! error only when the credential is refused, or when the backend is
//! unreachable before any call of the batch succeeded.

use std::sync::Arc;

use pdv_core::validation::validate_sale_for_push;
use pdv_core::{CashMovement, Sale};
use pdv_db::LocalStore;
use serde::Serialize;
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::error::{GatewayError, GatewayResult, SyncResult};
use crate::gateway::{RemoteGateway, RemoteId, RemoteRow, IDEMPOTENCY_COLUMN};
use crate::mapping;

pub const SALES_TABLE: &str = "vendas";
pub const SALE_ITEMS_TABLE: &str = "venda_itens";
pub const SALE_PAYMENTS_TABLE: &str = "venda_pagamentos";
pub const CASH_MOVEMENTS_TABLE: &str = "movimentos_caixa";

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PushEntity {
    Sales,
    CashMovements,
}

impl PushEntity {
    pub fn label(&self) -> &'static str {
        match self {
            PushEntity::Sales => "sales",
            PushEntity::CashMovements => "cash movements",
        }
    }
}

/// Outcome of one push batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PushReport {
    pub entity: PushEntity,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Idempotency keys of the rows that failed.
    pub failed_keys: Vec<String>,
}

impl PushReport {
    fn new(entity: PushEntity) -> Self {
        PushReport {
            entity,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failed_keys: Vec::new(),
        }
    }

    fn record_failure(&mut self, key: &str) {
        self.failed += 1;
        self.failed_keys.push(key.to_string());
    }
}

/// Why a single row was not delivered.
enum RowFailure {
    /// Rejected before any remote call.
    Invalid(String),
    Remote(GatewayError),
}

impl RowFailure {
    fn message(&self) -> String {
        match self {
            RowFailure::Invalid(reason) => reason.clone(),
            RowFailure::Remote(err) => err.to_string(),
        }
    }
}

impl From<GatewayError> for RowFailure {
    fn from(err: GatewayError) -> Self {
        RowFailure::Remote(err)
    }
}

// =============================================================================
// Push Reconciler
// =============================================================================

pub struct PushReconciler {
    store: LocalStore,
    gateway: Arc<dyn RemoteGateway>,
    tenant_id: String,
}

impl PushReconciler {
    pub fn new(store: LocalStore, gateway: Arc<dyn RemoteGateway>, tenant_id: impl Into<String>) -> Self {
        PushReconciler {
            store,
            gateway,
            tenant_id: tenant_id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Pushes every closed or invoiced sale not yet synced.
    pub async fn push_sales(&self) -> SyncResult<PushReport> {
        let sales = self.store.sales().pending_push(&self.tenant_id).await?;
        let mut report = PushReport::new(PushEntity::Sales);
        if sales.is_empty() {
            debug!("No sales to push");
            return Ok(report);
        }

        let mut contacted = false;
        for sale in &sales {
            report.attempted += 1;
            match self.push_sale(sale, &mut contacted).await? {
                Ok(()) => report.succeeded += 1,
                Err(failure) => {
                    let message = failure.message();
                    warn!(sale = %sale.uuid, number = sale.number, error = %message, "Sale push failed");
                    self.store.sales().record_failure(sale.id, &message).await?;
                    report.record_failure(&sale.uuid);

                    if let RowFailure::Remote(err) = failure {
                        if aborts_batch(&err, contacted) {
                            return Err(err.into());
                        }
                    }
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Sales pushed"
        );
        Ok(report)
    }

    /// Pushes one sale. The outer error is local (database); the inner one
    /// is the row outcome.
    async fn push_sale(
        &self,
        sale: &Sale,
        contacted: &mut bool,
    ) -> SyncResult<Result<(), RowFailure>> {
        let sales = self.store.sales();
        let items = sales.items(sale.id).await?;
        let payments = sales.payments(sale.id).await?;

        if let Err(err) = validate_sale_for_push(sale, &items, &payments) {
            return Ok(Err(RowFailure::Invalid(err.to_string())));
        }

        let remote_sale_id = match &sale.remote_id {
            Some(id) => id.clone(),
            None => {
                let row = mapping::sale_row(sale);
                let id = match self.insert_deduplicated(SALES_TABLE, &row, &sale.uuid).await {
                    Ok(id) => id,
                    Err(err) => return Ok(Err(err.into())),
                };
                *contacted = true;
                sales.mark_parent_accepted(sale.id, &id).await?;
                debug!(sale = %sale.uuid, remote_id = %id, "Sale header accepted");
                id
            }
        };

        for item in items.iter().filter(|i| !i.synced) {
            let row = mapping::sale_item_row(item, &remote_sale_id);
            match self.insert_deduplicated(SALE_ITEMS_TABLE, &row, &item.uuid).await {
                Ok(id) => {
                    *contacted = true;
                    sales.set_item_remote_id(item.id, &id).await?;
                }
                Err(err) => return Ok(Err(err.into())),
            }
        }

        for payment in payments.iter().filter(|p| !p.synced) {
            let row = mapping::sale_payment_row(payment, &remote_sale_id);
            match self.insert_deduplicated(SALE_PAYMENTS_TABLE, &row, &payment.uuid).await {
                Ok(id) => {
                    *contacted = true;
                    sales.set_payment_remote_id(payment.id, &id).await?;
                }
                Err(err) => return Ok(Err(err.into())),
            }
        }

        if !sales.mark_synced(sale.id).await? {
            debug!(sale = %sale.uuid, "Sale was already synced");
        }
        Ok(Ok(()))
    }

    // =========================================================================
    // Cash Movements
    // =========================================================================

    /// Pushes every cash movement not yet synced, open sessions included.
    pub async fn push_cash_movements(&self) -> SyncResult<PushReport> {
        let movements = self.store.cash_movements().pending_push(&self.tenant_id).await?;
        let mut report = PushReport::new(PushEntity::CashMovements);
        if movements.is_empty() {
            debug!("No cash movements to push");
            return Ok(report);
        }

        let mut contacted = false;
        for movement in &movements {
            report.attempted += 1;
            match self.push_movement(movement).await {
                Ok(remote_id) => {
                    contacted = true;
                    self.store.cash_movements().mark_synced(movement.id, &remote_id).await?;
                    report.succeeded += 1;
                }
                Err(err) => {
                    warn!(
                        movement = %movement.uuid,
                        kind = movement.kind.as_str(),
                        error = %err,
                        "Cash movement push failed"
                    );
                    self.store
                        .cash_movements()
                        .record_failure(movement.id, &err.to_string())
                        .await?;
                    report.record_failure(&movement.uuid);

                    if aborts_batch(&err, contacted) {
                        return Err(err.into());
                    }
                }
            }
        }

        info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Cash movements pushed"
        );
        Ok(report)
    }

    async fn push_movement(&self, movement: &CashMovement) -> GatewayResult<RemoteId> {
        let row = mapping::cash_movement_row(movement);
        self.insert_deduplicated(CASH_MOVEMENTS_TABLE, &row, &movement.uuid).await
    }

    // =========================================================================
    // Remote Writes
    // =========================================================================

    /// Inserts a row, resolving a duplicate key to the existing remote id.
    async fn insert_deduplicated(
        &self,
        table: &str,
        row: &RemoteRow,
        key: &str,
    ) -> GatewayResult<RemoteId> {
        match self.gateway.insert(table, row).await {
            Ok(id) => Ok(id),
            Err(GatewayError::Duplicate { table: dup_table, message }) => {
                debug!(table, key, "Row already on the backend, resolving id");
                match self.gateway.find_by_key(table, IDEMPOTENCY_COLUMN, key).await? {
                    Some(id) => Ok(id),
                    None => Err(GatewayError::Duplicate {
                        table: dup_table,
                        message,
                    }),
                }
            }
            Err(err) => Err(err),
        }
    }
}

/// Whether a row failure stops the rest of the batch.
fn aborts_batch(err: &GatewayError, contacted: bool) -> bool {
    err.is_fatal() || (err.is_retryable() && !contacted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_rule() {
        let unavailable = GatewayError::Unavailable("connection refused".into());
        let rejected = GatewayError::Rejected {
            status: 400,
            message: "bad".into(),
        };

        assert!(aborts_batch(&GatewayError::Unauthorized("jwt expired".into()), true));
        assert!(aborts_batch(&unavailable, false));
        // Backend went away mid-batch: keep going, rows stay pending
        assert!(!aborts_batch(&unavailable, true));
        assert!(!aborts_batch(&rejected, false));
    }

    #[test]
    fn test_report_tracks_failed_keys() {
        let mut report = PushReport::new(PushEntity::Sales);
        report.attempted = 2;
        report.succeeded = 1;
        report.record_failure("k2");
        assert_eq!(report.failed, 1);
        assert_eq!(report.failed_keys, vec!["k2"]);
    }
}
