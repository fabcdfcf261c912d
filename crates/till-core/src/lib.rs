//! # till-core: Pure Cash-Control Logic for Till
//!
//! This crate is the **heart** of the Till drawer. It contains the ledger,
//! session lifecycle, settlement math and reconciliation reports as plain
//! synchronous code with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Till Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              UI / API layer (external collaborator)             │   │
//! │  │    Open Drawer ──► Take Orders ──► Split Bill ──► Close Z       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                till-drawer (single-writer lock)                 │   │
//! │  │    open_shift, confirm_settlement, close_shift, history         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │  denomination ─► ledger ─► session ─► settlement ─► report      │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO LOGGING • NO ASYNC • PURE FUNCTIONS               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`types`] - Domain types (CashSession, CashMovement, Order, PaymentAllocation)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation helpers
//! - [`denomination`] - Bill/coin counting
//! - [`ledger`] - Append-only movement journal
//! - [`session`] - Drawer session lifecycle (owns the ledger)
//! - [`settlement`] - Order totals, allocations, confirmation
//! - [`report`] - X/Z/audit reports, ticket text and CSV export
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::denomination::{DenominationCount, DenominationSet};
//! use till_core::session::SessionManager;
//! use till_core::{Money, MovementType};
//!
//! let mut drawer = SessionManager::new(DenominationSet::cop());
//!
//! let float = DenominationCount::new().with(100_000, 1).with(50_000, 1).with(20_000, 1);
//! let session = drawer.open("cashier-1", &float, None, None).unwrap();
//! assert_eq!(drawer.balance(&session.id), Money::from_units(170_000));
//!
//! drawer
//!     .append(&session.id, MovementType::Sale, Money::from_units(50_000), "cashier-1", "Table 4", None)
//!     .unwrap();
//! assert_eq!(drawer.balance(&session.id), Money::from_units(220_000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod denomination;
pub mod error;
pub mod ledger;
pub mod money;
pub mod report;
pub mod session;
pub mod settlement;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Upper bound on split-bill parts.
///
/// ## Business Reason
/// A table of more than 50 guests paying separately is almost certainly a
/// typing mistake (500 instead of 5).
pub const MAX_SPLIT_PARTS: u32 = 50;

/// Maximum unit count accepted for one denomination in a single count.
pub const MAX_DENOMINATION_COUNT: i64 = 100_000;
