//! # Validation Module
//!
//! Business rule checks run before anything is written locally or sent to
//! the backend.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: UI                                                            │
//! │  └── Basic format checks, immediate feedback                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  ├── Cash amounts (opening, entries, exits, counted)                    │
//! │  └── Sale completeness before push                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite constraints, then backend constraints                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use pdv_core::money::Money;
//! use pdv_core::validation::{validate_movement_amount, validate_opening_amount};
//!
//! assert!(validate_opening_amount(Money::zero()).is_ok());
//! assert!(validate_movement_amount(Money::zero()).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Sale, SaleItem, SalePayment};
use crate::MAX_DESCRIPTION_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Cash Validators
// =============================================================================

/// Opening and counted amounts may be zero but never negative.
pub fn validate_opening_amount(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Entries and exits must move money.
pub fn validate_movement_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }
    Ok(())
}

/// Validates an optional free-text description.
///
/// ## Returns
/// The trimmed description, or `None` if it was blank.
pub fn validate_description(description: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(text) = description.map(str::trim) else {
        return Ok(None);
    };

    if text.is_empty() {
        return Ok(None);
    }

    if text.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: MAX_DESCRIPTION_LEN,
        });
    }

    Ok(Some(text.to_string()))
}

// =============================================================================
// Sale Validators
// =============================================================================

/// Checks that a sale is complete enough to be sent to the backend.
///
/// ## Rules
/// - At least one item
/// - Every payment amount is positive
/// - Payments, net of change, cover the total
pub fn validate_sale_for_push(
    sale: &Sale,
    items: &[SaleItem],
    payments: &[SalePayment],
) -> ValidationResult<()> {
    if items.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if payments.is_empty() {
        return Err(ValidationError::Required {
            field: "payments".to_string(),
        });
    }

    if let Some(bad) = payments.iter().find(|p| p.amount_cents <= 0) {
        return Err(ValidationError::InvalidFormat {
            field: "payment".to_string(),
            reason: format!("{} has non-positive amount {}", bad.uuid, bad.amount_cents),
        });
    }

    let paid: Money = payments.iter().map(SalePayment::net).sum();
    if paid < sale.total() {
        return Err(ValidationError::InsufficientPayment {
            paid: paid.cents(),
            total: sale.total_cents,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{new_idempotency_key, SaleStatus, SyncState};
    use chrono::Utc;

    fn sale(total: i64) -> Sale {
        Sale {
            id: 1,
            uuid: new_idempotency_key(),
            tenant_id: "t1".into(),
            number: 1,
            customer_id: None,
            status: SaleStatus::Closed,
            subtotal_cents: total,
            discount_cents: 0,
            total_cents: total,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            synced: false,
            remote_id: None,
            sync_state: SyncState::Pending,
            sync_attempts: 0,
            sync_error: None,
        }
    }

    fn item(total: i64) -> SaleItem {
        SaleItem {
            id: 1,
            uuid: new_idempotency_key(),
            tenant_id: "t1".into(),
            sale_id: 1,
            product_id: "p1".into(),
            description: "Café 500g".into(),
            quantity: 1.0,
            unit_price_cents: total,
            total_cents: total,
            synced: false,
            remote_id: None,
        }
    }

    fn payment(amount: i64, change: i64) -> SalePayment {
        SalePayment {
            id: 1,
            uuid: new_idempotency_key(),
            tenant_id: "t1".into(),
            sale_id: 1,
            payment_method_id: "dinheiro".into(),
            amount_cents: amount,
            change_cents: change,
            synced: false,
            remote_id: None,
        }
    }

    #[test]
    fn test_amounts() {
        assert!(validate_opening_amount(Money::from_cents(10_000)).is_ok());
        assert!(validate_opening_amount(Money::from_cents(-1)).is_err());
        assert!(validate_movement_amount(Money::from_cents(1)).is_ok());
        assert!(validate_movement_amount(Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_description() {
        assert_eq!(validate_description(None).unwrap(), None);
        assert_eq!(validate_description(Some("   ")).unwrap(), None);
        assert_eq!(
            validate_description(Some(" sangria ")).unwrap(),
            Some("sangria".to_string())
        );
        let long = "x".repeat(MAX_DESCRIPTION_LEN + 1);
        assert!(validate_description(Some(&long)).is_err());
    }

    #[test]
    fn test_sale_for_push() {
        let s = sale(1000);
        assert!(validate_sale_for_push(&s, &[item(1000)], &[payment(2000, 1000)]).is_ok());
        assert!(validate_sale_for_push(&s, &[], &[payment(1000, 0)]).is_err());
        assert!(validate_sale_for_push(&s, &[item(1000)], &[]).is_err());
        assert!(validate_sale_for_push(&s, &[item(1000)], &[payment(0, 0)]).is_err());
        assert!(matches!(
            validate_sale_for_push(&s, &[item(1000)], &[payment(900, 0)]),
            Err(ValidationError::InsufficientPayment { paid: 900, total: 1000 })
        ));
    }
}
