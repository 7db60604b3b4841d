//! # Sync Orchestrator
//!
//! Runs one full sync: a credential probe, then every phase in a fixed order.
//!
//! ## Run
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           sync_all()                                    │
//! │                                                                         │
//! │  preconditions ── store initialized? ── accessible_tenants() ── tenant  │
//! │        │          any failure here stops the run (success = false)      │
//! │        ▼                                                                │
//! │  1. pull payment methods      each phase is its own failure boundary:   │
//! │  2. pull catalog items        a failed phase is reported and the next   │
//! │  3. pull customers            one still runs                            │
//! │  4. push sales                                                          │
//! │  5. push cash movements       fatal errors (credential refused, store   │
//! │        │                      gone) stop the remaining phases           │
//! │        ▼                                                                │
//! │  SyncReport { success, message, phases }                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reference data comes first so sales pushed afterwards refer to payment
//! methods and items the terminal has already seen.
//!
//! Runs are single-flight: a second caller waits for the running sync to
//! finish and then runs its own.

use std::sync::Arc;

use pdv_db::LocalStore;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use ts_rs::TS;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use crate::pull::{EntityKind, PullOutcome, PullReconciler};
use crate::push::{PushReconciler, PushReport};

// =============================================================================
// Report Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    PullPaymentMethods,
    PullCatalogItems,
    PullCustomers,
    PushSales,
    PushCashMovements,
}

impl SyncPhase {
    /// Execution order.
    pub const ORDER: [SyncPhase; 5] = [
        SyncPhase::PullPaymentMethods,
        SyncPhase::PullCatalogItems,
        SyncPhase::PullCustomers,
        SyncPhase::PushSales,
        SyncPhase::PushCashMovements,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SyncPhase::PullPaymentMethods => "pull payment methods",
            SyncPhase::PullCatalogItems => "pull catalog items",
            SyncPhase::PullCustomers => "pull customers",
            SyncPhase::PushSales => "push sales",
            SyncPhase::PushCashMovements => "push cash movements",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Ok,
    /// Completed, but nothing ever arrived for the tenant.
    Warning,
    /// Some rows failed.
    Partial,
    Failed,
}

impl PhaseStatus {
    fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Ok => "ok",
            PhaseStatus::Warning => "warning",
            PhaseStatus::Partial => "partial",
            PhaseStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct PhaseReport {
    pub phase: SyncPhase,
    pub status: PhaseStatus,
    pub detail: String,
}

impl PhaseReport {
    fn line(&self) -> String {
        format!("{}: {} ({})", self.phase.label(), self.status.as_str(), self.detail)
    }
}

/// Aggregate result of `sync_all`, shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct SyncReport {
    /// False only when the run hit an unrecoverable error.
    pub success: bool,
    /// One line per phase, or the reason the run stopped.
    pub message: String,
    pub phases: Vec<PhaseReport>,
}

impl SyncReport {
    fn finish(success: bool, phases: Vec<PhaseReport>, stop_reason: Option<String>) -> Self {
        let mut lines: Vec<String> = phases.iter().map(PhaseReport::line).collect();
        if let Some(reason) = stop_reason {
            lines.push(format!("sync stopped: {}", reason));
        }
        SyncReport {
            success,
            message: lines.join("\n"),
            phases,
        }
    }

    pub fn phase(&self, phase: SyncPhase) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == phase)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct SyncOrchestrator {
    store: LocalStore,
    pull: Arc<PullReconciler>,
    push: Arc<PushReconciler>,
    running: Mutex<()>,
}

impl SyncOrchestrator {
    pub fn new(store: LocalStore, pull: Arc<PullReconciler>, push: Arc<PushReconciler>) -> Self {
        SyncOrchestrator {
            store,
            pull,
            push,
            running: Mutex::new(()),
        }
    }

    /// Wires reconcilers for the configured tenant.
    pub fn from_config(store: LocalStore, gateway: Arc<dyn RemoteGateway>, config: &SyncConfig) -> Self {
        let pull = PullReconciler::from_config(store.clone(), gateway.clone(), config);
        let push = PushReconciler::new(store.clone(), gateway, config.tenant_id());
        Self::new(store, Arc::new(pull), Arc::new(push))
    }

    pub fn pull(&self) -> &Arc<PullReconciler> {
        &self.pull
    }

    pub fn push(&self) -> &Arc<PushReconciler> {
        &self.push
    }

    /// Runs preconditions and every phase. Never returns an error; failures
    /// are folded into the report.
    pub async fn sync_all(&self) -> SyncReport {
        let _running = self.running.lock().await;
        info!(tenant = %self.pull.tenant_id(), "Sync started");

        if let Err(err) = self.check_preconditions().await {
            error!(error = %err, "Sync preconditions failed");
            return SyncReport::finish(false, Vec::new(), Some(err.to_string()));
        }

        let mut phases = Vec::with_capacity(SyncPhase::ORDER.len());
        for phase in SyncPhase::ORDER {
            match self.run_phase(phase).await {
                Ok(report) => {
                    if report.status != PhaseStatus::Ok {
                        warn!(phase = phase.label(), status = report.status.as_str(), detail = %report.detail, "Phase incomplete");
                    }
                    phases.push(report);
                }
                Err(err) if err.is_fatal() => {
                    error!(phase = phase.label(), error = %err, "Phase failed fatally");
                    phases.push(PhaseReport {
                        phase,
                        status: PhaseStatus::Failed,
                        detail: err.to_string(),
                    });
                    return SyncReport::finish(false, phases, Some(err.to_string()));
                }
                Err(err) => {
                    warn!(phase = phase.label(), error = %err, "Phase failed");
                    phases.push(PhaseReport {
                        phase,
                        status: PhaseStatus::Failed,
                        detail: err.to_string(),
                    });
                }
            }
        }

        let report = SyncReport::finish(true, phases, None);
        info!(
            failed = report.phases.iter().filter(|p| p.status == PhaseStatus::Failed).count(),
            "Sync finished"
        );
        report
    }

    /// Local store ready, credential accepted, tenant reachable.
    async fn check_preconditions(&self) -> SyncResult<()> {
        if !self.store.is_initialized() {
            return Err(pdv_db::DbError::NotInitialized.into());
        }

        let tenant_id = self.pull.tenant_id();
        let tenants = self.pull.refresh_tenants().await?;
        if !tenants.iter().any(|t| t.id == tenant_id) {
            return Err(SyncError::TenantNotAccessible {
                tenant_id: tenant_id.to_string(),
            });
        }
        Ok(())
    }

    async fn run_phase(&self, phase: SyncPhase) -> SyncResult<PhaseReport> {
        let report = match phase {
            SyncPhase::PullPaymentMethods => self.pull_phase(phase, EntityKind::PaymentMethods).await?,
            SyncPhase::PullCatalogItems => self.pull_phase(phase, EntityKind::CatalogItems).await?,
            SyncPhase::PullCustomers => self.pull_phase(phase, EntityKind::Customers).await?,
            SyncPhase::PushSales => push_phase(phase, self.push.push_sales().await?),
            SyncPhase::PushCashMovements => push_phase(phase, self.push.push_cash_movements().await?),
        };
        Ok(report)
    }

    async fn pull_phase(&self, phase: SyncPhase, kind: EntityKind) -> SyncResult<PhaseReport> {
        let report = match self.pull.pull(kind).await? {
            PullOutcome::NoData => PhaseReport {
                phase,
                status: PhaseStatus::Warning,
                detail: format!(
                    "no {} returned and none cached; check tenant access on the backend",
                    kind.label()
                ),
            },
            PullOutcome::Synced {
                fetched,
                upserted,
                skipped,
            } => PhaseReport {
                phase,
                status: if skipped > 0 {
                    PhaseStatus::Partial
                } else {
                    PhaseStatus::Ok
                },
                detail: format!("fetched {}, upserted {}, skipped {}", fetched, upserted, skipped),
            },
        };
        Ok(report)
    }
}

fn push_phase(phase: SyncPhase, report: PushReport) -> PhaseReport {
    let status = match (report.succeeded, report.failed) {
        (_, 0) => PhaseStatus::Ok,
        (0, _) => PhaseStatus::Failed,
        _ => PhaseStatus::Partial,
    };
    let mut detail = format!("{} succeeded, {} failed", report.succeeded, report.failed);
    if !report.failed_keys.is_empty() {
        detail.push_str(&format!(": {}", report.failed_keys.join(", ")));
    }
    PhaseReport {
        phase,
        status,
        detail,
    }
}
