//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Split bills:                                                           │
//! │    57,601 / 3 = 19,200.33 (×3 = 57,600.99) → drifting drawer!          │
//! │                                                                         │
//! │  OUR SOLUTION: Integer smallest units                                   │
//! │    57,601 / 3 = 19,200 (×2) + 19,201 for the last share                │
//! │    The remainder is placed explicitly, never lost                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//!
//! let opening = Money::from_units(170_000); // 170,000 COP
//! let after_sale = opening + Money::from_units(50_000);
//! assert_eq!(after_sale.units(), 220_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{TaxRate, TipRate};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit.
///
/// For COP that is the peso itself; for USD it would be the cent. The type
/// carries no currency: the drawer configuration decides how to display it.
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for discrepancies (short drawer)
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Derives**: Full serde support for JSON serialization
///
/// ## Where Money is Used
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                                                                         │
/// │  DenominationCount.total ──► Open movement ──► Ledger balance           │
/// │                                                                         │
/// │  Order.subtotal + tax + tip ──► Order.total ──► PaymentAllocation.amount│
/// │                                                                         │
/// │  Ledger balance vs counted drawer ──► Discrepancy                       │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from smallest currency units.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let bill = Money::from_units(50_000);
    /// assert_eq!(bill.units(), 50_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units)
    }

    /// Returns the value in smallest currency units.
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Calculates tax on this amount.
    ///
    /// ## Implementation
    /// Integer math: `(amount * bps + 5000) / 10000`, i.e. half rounds up.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    /// use till_core::types::TaxRate;
    ///
    /// let subtotal = Money::from_units(48_000);
    /// let tax = subtotal.calculate_tax(TaxRate::from_bps(1000)); // 10%
    /// assert_eq!(tax.units(), 4_800);
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        self.apply_bps(rate.bps())
    }

    /// Calculates a tip on this amount.
    ///
    /// ## User Workflow
    /// ```text
    /// Subtotal: 48,000
    ///      │
    ///      ▼
    /// Waiter selects 10% ──► calculate_tip(1000 bps) ← THIS FUNCTION
    ///      │
    ///      ▼
    /// Tip: 4,800 (rounded to the nearest unit)
    /// ```
    pub fn calculate_tip(&self, rate: TipRate) -> Money {
        self.apply_bps(rate.bps())
    }

    fn apply_bps(&self, bps: u32) -> Money {
        // i128 keeps large drawers from overflowing during the multiply
        let scaled = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money(scaled as i64)
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let unit_price = Money::from_units(12_000);
    /// assert_eq!(unit_price.multiply_quantity(3).units(), 36_000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display groups thousands with commas: `170,000`, `-1,500`.
///
/// ## Note
/// No currency symbol; `till-drawer` formats with the configured symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, c) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(c);
        }
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}", sign, grouped)
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by i64 (quantities, split shares).
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
