//! # Sync Scheduler
//!
//! Background task running [`SyncOrchestrator::sync_all`] on an interval,
//! plus on demand.
//!
//! ## Loop
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  tokio::select! {                                                │
//! │      interval.tick()   → sync_all()                              │
//! │      trigger_rx.recv() → sync_all()   ("sincronizar agora")      │
//! │      shutdown_rx.recv() → break                                  │
//! │  }                                                               │
//! │                                                                  │
//! │  every report is published on a watch channel                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Triggers coalesce: while one is queued, further triggers are dropped.
//! The first interval run happens one period after start; callers that
//! want an immediate sync trigger one.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::orchestrator::{SyncOrchestrator, SyncReport};

/// Periodic sync runner.
pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    period: Duration,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
    report_tx: watch::Sender<Option<SyncReport>>,
}

/// Handle for controlling a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
    report_rx: watch::Receiver<Option<SyncReport>>,
}

impl SchedulerHandle {
    /// Requests a sync as soon as the current one (if any) finishes.
    pub fn trigger(&self) -> SyncResult<()> {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::ShuttingDown),
        }
    }

    /// Stops the scheduler after the running sync, if any.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }

    /// Report of the most recent run.
    pub fn last_report(&self) -> Option<SyncReport> {
        self.report_rx.borrow().clone()
    }

    /// Receiver notified after every run.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncReport>> {
        self.report_rx.clone()
    }
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, period: Duration) -> (Self, SchedulerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (report_tx, report_rx) = watch::channel(None);

        let scheduler = SyncScheduler {
            orchestrator,
            period,
            trigger_rx,
            shutdown_rx,
            report_tx,
        };
        let handle = SchedulerHandle {
            trigger_tx,
            shutdown_tx,
            report_rx,
        };
        (scheduler, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!(period_secs = self.period.as_secs(), "Sync scheduler starting");

        let mut interval = interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    debug!("Scheduled sync");
                    self.run_once().await;
                }

                trigger = self.trigger_rx.recv() => {
                    if trigger.is_none() {
                        break;
                    }
                    debug!("Triggered sync");
                    self.run_once().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Sync scheduler shutting down");
                    break;
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    async fn run_once(&self) {
        let report = self.orchestrator.sync_all().await;
        self.report_tx.send_replace(Some(report));
    }
}
