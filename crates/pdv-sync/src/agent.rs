//! # Sync Agent
//!
//! Owns every sync component of one terminal and wires them from a
//! [`SyncConfig`].
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent                                        │
//! │                                                                         │
//! │   SyncConfig ──▶ LocalStore (initialized)                               │
//! │              ──▶ PostgrestGateway (credential checked)                  │
//! │                          │                                              │
//! │         ┌────────────────┼──────────────────────┐                       │
//! │         ▼                ▼                      ▼                       │
//! │  ┌──────────────┐ ┌──────────────┐  ┌──────────────────────┐            │
//! │  │ PullReconciler│ │PushReconciler│◀─│ CashSessionManager   │            │
//! │  └──────┬───────┘ └──────┬───────┘  │ (background push)    │            │
//! │         └───────┬────────┘          └──────────────────────┘            │
//! │                 ▼                                                       │
//! │        SyncOrchestrator ◀── SyncScheduler (interval + trigger)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use pdv_db::LocalStore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cash_session::CashSessionManager;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{PostgrestGateway, RemoteGateway};
use crate::orchestrator::{SyncOrchestrator, SyncReport};
use crate::scheduler::{SchedulerHandle, SyncScheduler};

/// One terminal's sync engine.
pub struct SyncAgent {
    config: Arc<SyncConfig>,
    store: LocalStore,
    orchestrator: Arc<SyncOrchestrator>,
    cash: Arc<CashSessionManager>,
    scheduler: Option<(SchedulerHandle, JoinHandle<()>)>,
}

impl SyncAgent {
    /// Opens the configured store and connects to the configured backend.
    ///
    /// Fails before any remote call if the credential is missing or
    /// privileged.
    pub async fn open(config: SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        if !config.is_online() {
            return Err(SyncError::InvalidConfig("remote.url is not set".into()));
        }

        let gateway: Arc<dyn RemoteGateway> = Arc::new(PostgrestGateway::from_settings(&config.remote)?);

        let store = LocalStore::new(config.db_config());
        store.initialize().await?;
        info!(
            terminal = %config.terminal_id(),
            tenant = %config.tenant_id(),
            store = %config.store_path().display(),
            "Sync agent ready"
        );

        Ok(Self::with_gateway(config, store, gateway))
    }

    /// Builds an agent around an existing store and gateway.
    pub fn with_gateway(config: SyncConfig, store: LocalStore, gateway: Arc<dyn RemoteGateway>) -> Self {
        let orchestrator = Arc::new(SyncOrchestrator::from_config(store.clone(), gateway, &config));

        let mut cash = CashSessionManager::new(store.clone(), config.tenant_id(), config.terminal_id());
        if config.sync.push_on_cash_change {
            cash = cash.with_background_push(orchestrator.push().clone());
        }

        SyncAgent {
            config: Arc::new(config),
            store,
            orchestrator,
            cash: Arc::new(cash),
            scheduler: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn cash(&self) -> &Arc<CashSessionManager> {
        &self.cash
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Runs one full sync now.
    pub async fn sync_now(&self) -> SyncReport {
        self.orchestrator.sync_all().await
    }

    /// Starts the periodic scheduler and requests an immediate first run.
    ///
    /// Calling it again returns the running scheduler's handle.
    pub fn start(&mut self) -> SyncResult<SchedulerHandle> {
        if let Some((handle, _)) = &self.scheduler {
            return Ok(handle.clone());
        }
        if !self.config.sync.enabled {
            return Err(SyncError::InvalidConfig("sync.enabled is false".into()));
        }

        let (scheduler, handle) = SyncScheduler::new(self.orchestrator.clone(), self.config.sync.interval());
        let task = scheduler.spawn();
        handle.trigger()?;

        self.scheduler = Some((handle.clone(), task));
        Ok(handle)
    }

    /// Stops the scheduler and waits for its task to end.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        let Some((handle, task)) = self.scheduler.take() else {
            return Ok(());
        };

        if let Err(err) = handle.shutdown().await {
            warn!(error = %err, "Scheduler already stopped");
        }
        if let Err(err) = task.await {
            warn!(error = %err, "Scheduler task ended abnormally");
        }

        self.store.close().await;
        info!("Sync agent stopped");
        Ok(())
    }
}
