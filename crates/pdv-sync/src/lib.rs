//! # pdv-sync: Terminal ↔ Backend Reconciliation
//!
//! Moves data between the terminal's LocalStore and the backend (retaguarda),
//! and owns the cash drawer state machine.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          pdv-sync                                       │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │              SyncAgent (wires everything from SyncConfig)        │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ SyncScheduler  │  │SyncOrchestrator│  │  CashSessionManager    │    │
//! │  │                │  │                │  │                        │    │
//! │  │ interval +     │─►│ probe, then 5  │  │ open / entry / exit /  │    │
//! │  │ "sync now"     │  │ phases in order│  │ close, per business day│    │
//! │  └────────────────┘  └───────┬────────┘  └───────────┬────────────┘    │
//! │                              │                       │ background push  │
//! │                 ┌────────────┴─────────┐             │                  │
//! │                 ▼                      ▼             ▼                  │
//! │        ┌────────────────┐     ┌──────────────────────────┐             │
//! │        │ PullReconciler │     │     PushReconciler        │             │
//! │        │ cursor + upsert│     │ row by row, dedup by uuid │             │
//! │        └───────┬────────┘     └────────────┬──────────────┘             │
//! │                └──────────────┬────────────┘                            │
//! │                               ▼                                         │
//! │              RemoteGateway (PostgrestGateway | InMemoryGateway)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent`, component wiring
//! - [`cash_session`] - Cash drawer state machine
//! - [`config`] - Layered TOML/env configuration
//! - [`error`] - `SyncError`, `GatewayError` and their categories
//! - [`gateway`] - `RemoteGateway` trait and implementations
//! - [`mapping`] - Remote row decoding and push payloads
//! - [`orchestrator`] - `sync_all` and its report
//! - [`pull`] - Reference data mirroring
//! - [`push`] - Sale and cash movement delivery
//! - [`scheduler`] - Periodic runs
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pdv_core::Money;
//! use pdv_sync::{SyncAgent, SyncConfig};
//!
//! let config = SyncConfig::load(None)?;
//! let mut agent = SyncAgent::open(config).await?;
//!
//! agent.cash().open(Money::from_cents(10_000)).await?;
//!
//! let report = agent.sync_now().await;
//! println!("{}", report.message);
//!
//! let scheduler = agent.start()?;
//! scheduler.trigger()?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod cash_session;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mapping;
pub mod orchestrator;
pub mod pull;
pub mod push;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::SyncAgent;
pub use cash_session::CashSessionManager;
pub use config::SyncConfig;
pub use error::{GatewayError, GatewayResult, SyncError, SyncResult};
pub use gateway::{
    InMemoryGateway, PostgrestGateway, RemoteBatch, RemoteFilter, RemoteGateway, RemoteRow,
    RemoteTenant,
};
pub use orchestrator::{PhaseReport, PhaseStatus, SyncOrchestrator, SyncPhase, SyncReport};
pub use pull::{EntityKind, PullOutcome, PullReconciler};
pub use push::{PushEntity, PushReconciler, PushReport};
pub use scheduler::{SchedulerHandle, SyncScheduler};
