//! # Validation Module
//!
//! Input validation utilities for Till.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI (external)                                                │
//! │  ├── Basic format checks (empty, length)                               │
//! │  └── Immediate user feedback                                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: till-drawer                                                  │
//! │  ├── Config validation, draft lookup                                   │
//! │  └── THIS MODULE: field rules shared with the core                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: till-core business rules                                     │
//! │  ├── Session must be open                                              │
//! │  ├── Amounts positive, withdrawals covered                             │
//! │  └── Allocations sum to the order total                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest free-text note stored on a movement.
pub const MAX_NOTES_LEN: usize = 500;

/// Highest tip the terminal accepts, in basis points (100%).
pub const MAX_TIP_BPS: u32 = 10_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a cashier/user id supplied by the identity collaborator.
///
/// ## Rules
/// - Must not be empty
/// - At most 64 characters
///
/// ## Example
/// ```rust
/// use till_core::validation::validate_user_id;
///
/// assert!(validate_user_id("cashier-7").is_ok());
/// assert!(validate_user_id("  ").is_err());
/// ```
pub fn validate_user_id(user_id: &str) -> ValidationResult<()> {
    let user_id = user_id.trim();

    if user_id.is_empty() {
        return Err(ValidationError::Required {
            field: "user_id".to_string(),
        });
    }

    if user_id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "user_id".to_string(),
            max: 64,
        });
    }

    Ok(())
}

/// Validates movement notes. Empty notes are fine.
pub fn validate_notes(notes: &str) -> ValidationResult<()> {
    if notes.len() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        });
    }

    Ok(())
}

/// Validates a history search term.
///
/// ## Rules
/// - Can be empty (matches everything)
/// - Maximum 100 characters
///
/// ## Returns
/// The trimmed term.
pub fn validate_search_term(term: &str) -> ValidationResult<String> {
    let term = term.trim();

    if term.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "search_term".to_string(),
            max: 100,
        });
    }

    Ok(term.to_string())
}

/// Validates the last four digits of a card.
///
/// ## Example
/// ```rust
/// use till_core::validation::validate_card_last4;
///
/// assert!(validate_card_last4("4242").is_ok());
/// assert!(validate_card_last4("42a2").is_err());
/// assert!(validate_card_last4("424").is_err());
/// ```
pub fn validate_card_last4(last4: &str) -> ValidationResult<()> {
    if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "card last4".to_string(),
            reason: "must be exactly 4 digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a tip rate in basis points.
///
/// ## Rules
/// - Between 0 and 10000 (0% to 100%)
pub fn validate_tip_bps(bps: u32) -> ValidationResult<()> {
    if bps > MAX_TIP_BPS {
        return Err(ValidationError::OutOfRange {
            field: "tip".to_string(),
            min: 0,
            max: MAX_TIP_BPS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
