//! # Sync Error Types
//!
//! Error types for reconciliation, cash sessions and the backend gateway.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  FATAL (stop the whole run)        PHASE (abort one phase)              │
//! │  ──────────────────────────        ───────────────────────              │
//! │  MissingCredentials                Unavailable                          │
//! │  PrivilegedCredential              TableNotFound                        │
//! │  Unauthorized                      TableDiscoveryFailed                 │
//! │  TenantNotAccessible               InvalidResponse                      │
//! │  Database(NotInitialized)                                               │
//! │  InvalidConfig                                                          │
//! │                                                                         │
//! │  ROW (abort one row)               WARNING (surfaced, non-fatal)        │
//! │  ───────────────────               ─────────────────────────────        │
//! │  Rejected                          PullOutcome::NoData                  │
//! │  Duplicate (resolved by key)                                            │
//! │  Validation                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Row and phase errors are folded into reports by their boundary; only
//! fatal errors reach the caller of `sync_all` as `success = false` with no
//! phases run.

use pdv_core::CoreError;
use pdv_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Result type alias for gateway calls.
pub type GatewayResult<T> = Result<T, GatewayError>;

// =============================================================================
// Gateway Error
// =============================================================================

/// Failure of a single call to the backend.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No credential configured.
    #[error("Backend credentials are not configured")]
    MissingCredentials,

    /// The credential carries a server-side privileged role.
    ///
    /// A terminal must never hold such a secret; construction fails.
    #[error("Refusing privileged backend credential (role '{role}')")]
    PrivilegedCredential { role: String },

    /// Backend URL could not be parsed.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// 401/403: credential expired, revoked or not allowed.
    #[error("Backend rejected the credential: {0}")]
    Unauthorized(String),

    /// The table does not exist (or is not exposed) on the backend.
    #[error("Remote table '{table}' not found")]
    TableNotFound { table: String },

    /// Unique violation on insert. The row is already there.
    #[error("Duplicate row in '{table}': {message}")]
    Duplicate { table: String, message: String },

    /// The backend refused the request (validation, constraint, bad filter).
    #[error("Backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Network failure, timeout or 5xx.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The response body did not have the expected shape.
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Errors that make every further call pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingCredentials
                | GatewayError::PrivilegedCredential { .. }
                | GatewayError::InvalidUrl(_)
                | GatewayError::Unauthorized(_)
        )
    }

    /// Errors worth retrying later with the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }

    /// Errors that abort the remaining rows of a push batch.
    pub fn aborts_batch(&self) -> bool {
        self.is_fatal() || self.is_retryable()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::InvalidResponse(err.to_string())
    }
}

impl From<url::ParseError> for GatewayError {
    fn from(err: url::ParseError) -> Self {
        GatewayError::InvalidUrl(err.to_string())
    }
}

// =============================================================================
// Sync Error
// =============================================================================

/// Sync error type covering everything above a single gateway call.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),


    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// A gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// None of the candidate remote tables answered.
    #[error("Remote table for {entity} not found, tried: {}", tried.join(", "))]
    TableDiscoveryFailed { entity: String, tried: Vec<String> },

    /// The configured tenant is not among the tenants the credential can see.
    #[error("Tenant '{tenant_id}' is not accessible with the configured credential")]
    TenantNotAccessible { tenant_id: String },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// LocalStore failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Business rule violation (cash session state, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Failed to serialize a payload.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Scheduler is shutting down.
    #[error("Sync scheduler is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<pdv_core::ValidationError> for SyncError {
    fn from(err: pdv_core::ValidationError) -> Self {
        SyncError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the whole sync run must stop.
    ///
    /// ## Fatal Errors
    /// - Credential problems (missing, privileged, rejected)
    /// - Tenant not visible to the credential
    /// - LocalStore not initialized
    /// - Invalid configuration
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Gateway(err) => err.is_fatal(),
            SyncError::TenantNotAccessible { .. }
            | SyncError::InvalidConfig(_)
            | SyncError::Database(DbError::NotInitialized) => true,
            _ => false,
        }
    }

    /// Returns true if running the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Gateway(err) => err.is_retryable(),
            SyncError::Database(DbError::PoolExhausted) => true,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::Gateway(GatewayError::MissingCredentials)
                | SyncError::Gateway(GatewayError::PrivilegedCredential { .. })
                | SyncError::Gateway(GatewayError::InvalidUrl(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(SyncError::from(GatewayError::Unauthorized("jwt expired".into())).is_fatal());
        assert!(SyncError::from(GatewayError::PrivilegedCredential {
            role: "service_role".into()
        })
        .is_fatal());
        assert!(SyncError::Database(DbError::NotInitialized).is_fatal());
        assert!(SyncError::TenantNotAccessible { tenant_id: "t1".into() }.is_fatal());

        assert!(!SyncError::from(GatewayError::Unavailable("timeout".into())).is_fatal());
        assert!(!SyncError::Core(CoreError::NoOpenSession).is_fatal());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(GatewayError::Unavailable("503".into()).is_retryable());
        assert!(!GatewayError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(GatewayError::Unauthorized("401".into()).aborts_batch());
        assert!(!GatewayError::TableNotFound { table: "x".into() }.aborts_batch());
    }

    #[test]
    fn test_config_errors() {
        let parse = crate::config::SyncConfig::from_toml("[tenant\nid = 1").unwrap_err();
        assert!(matches!(parse, SyncError::ConfigLoadFailed(_)));
        assert!(parse.is_config_error());
        assert!(SyncError::from(GatewayError::MissingCredentials).is_config_error());
        assert!(!SyncError::from(GatewayError::Unavailable("timeout".into())).is_config_error());
    }

    #[test]
    fn test_discovery_error_names_every_candidate() {
        let err = SyncError::TableDiscoveryFailed {
            entity: "payment methods".into(),
            tried: vec!["formas_pagamento".into(), "payment_methods".into()],
        };
        let message = err.to_string();
        assert!(message.contains("formas_pagamento, payment_methods"));
    }
}
