//! # Error Types
//!
//! Domain-specific error types for pdv-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pdv-core errors (this file)                                            │
//! │  ├── CoreError        - Business rule violations (cash session, sale)   │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  pdv-db errors                                                          │
//! │  └── DbError          - Local store failures                            │
//! │                                                                         │
//! │  pdv-sync errors                                                        │
//! │  ├── GatewayError     - Remote call failures                            │
//! │  └── SyncError        - What callers of the engine see                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → caller       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A cash session is already open for this tenant today.
    ///
    /// ## User Workflow
    /// ```text
    /// Open drawer (R$ 100,00)
    ///      │
    ///      ▼
    /// status(): Open { session_number: 2 }
    ///      │
    ///      ▼
    /// AlreadyOpen { session_number: 2 }
    ///      │
    ///      ▼
    /// UI shows: "Caixa 2 já está aberto"
    /// ```
    #[error("Cash session {session_number} is already open")]
    AlreadyOpen { session_number: i64 },

    /// A movement or close was attempted with no open session.
    #[error("No open cash session")]
    NoOpenSession,

    /// Sale is not in a state that allows the requested operation.
    #[error("Sale {sale_uuid} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_uuid: String,
        current_status: String,
    },

    /// A stored value does not map to any known variant.
    #[error("Unknown {field}: '{value}'")]
    UnknownValue { field: String, value: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before anything touches the store or the network.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Payments do not cover the sale total.
    #[error("payments ({paid} centavos) do not cover total ({total} centavos)")]
    InsufficientPayment { paid: i64, total: i64 },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::AlreadyOpen { session_number: 2 };
        assert_eq!(err.to_string(), "Cash session 2 is already open");

        let err = ValidationError::InsufficientPayment {
            paid: 900,
            total: 1000,
        };
        assert_eq!(
            err.to_string(),
            "payments (900 centavos) do not cover total (1000 centavos)"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "items".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
