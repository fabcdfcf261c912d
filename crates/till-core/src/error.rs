//! # Error Types
//!
//! Domain-specific error types for till-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  till-core errors (this file)                                          │
//! │  ├── CoreError        - Ledger, session and settlement failures        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  till-drawer errors (separate crate)                                   │
//! │  ├── DrawerError      - Config, drafts, wrapped CoreError              │
//! │  └── ApiError         - What the UI layer sees (serialized)            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DrawerError → ApiError → UI       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (session id, amounts)
//! 3. Errors are enum variants, never String
//! 4. A failing call leaves the ledger exactly as it was

use thiserror::Error;

use crate::money::Money;
use crate::types::MovementType;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations in the drawer ledger or
/// the settlement engine. They are returned, never logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// `open()` was called while another session is still open.
    #[error("A cash session is already open: {session_id}")]
    SessionAlreadyOpen { session_id: String },

    /// A mutating ledger operation referenced a session that is not open.
    ///
    /// ## When This Occurs
    /// - Recording a sale after the Z-close
    /// - Running an X-cut on a closed session
    /// - No session has been opened yet on this drawer
    #[error("Cash session is not open: {0}")]
    SessionNotOpen(String),

    /// The session id does not exist on this drawer.
    #[error("Cash session not found: {0}")]
    SessionNotFound(String),

    /// Amount is zero or negative where a positive magnitude is required.
    #[error("{kind} amount must be positive, got {amount}")]
    NonPositiveAmount { kind: MovementType, amount: Money },

    /// A denomination count is negative or absurdly large.
    #[error("Invalid count {count} for denomination {denomination}")]
    InvalidCount { denomination: i64, count: i64 },

    /// Face value that is not part of the configured bill/coin set.
    #[error("Unknown denomination: {0}")]
    UnknownDenomination(i64),

    /// Open and CloseZ rows are written by the session lifecycle only.
    #[error("{0} movements are recorded by the session lifecycle only")]
    ReservedMovementType(MovementType),

    /// Cash leaving the drawer would exceed what the drawer holds.
    ///
    /// ## User Workflow
    /// ```text
    /// Drawer balance: 100,000
    ///      │
    ///      ▼
    /// Withdrawal request: 150,000
    ///      │
    ///      ▼
    /// WithdrawalExceedsBalance { requested: 150,000, available: 100,000 }
    ///      │
    ///      ▼
    /// UI asks a supervisor to recount or lower the amount
    /// ```
    #[error("Withdrawal of {requested} exceeds drawer balance {available}")]
    WithdrawalExceedsBalance { requested: Money, available: Money },

    /// Allocated payments do not add up to the order total.
    #[error("Payments total {actual} but order total is {expected}")]
    AllocationMismatch { expected: Money, actual: Money },

    /// The order has already been settled.
    #[error("Order {0} is already settled")]
    AlreadySettled(String),

    /// The order's stored total disagrees with its own lines.
    #[error("Order {order_id} total {total} does not equal subtotal + tax + tip ({expected})")]
    OrderTotalMismatch {
        order_id: String,
        expected: Money,
        total: Money,
    },

    /// Split-bill part count outside the allowed range.
    #[error("Cannot split a bill into {parts} parts")]
    InvalidSplit { parts: u32 },

    /// Pending allocation id does not exist.
    #[error("Payment allocation not found: {0}")]
    AllocationNotFound(String),

    /// A ledger snapshot handed back by persistence is inconsistent.
    #[error("Invalid ledger snapshot: {0}")]
    InvalidSnapshot(String),

    /// CSV export failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl From<csv::Error> for CoreError {
    fn from(err: csv::Error) -> Self {
        CoreError::Export(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., card suffix with letters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
