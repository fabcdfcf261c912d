//! # Denomination Counter
//!
//! Turns a physical drawer count (how many of each bill and coin) into a
//! monetary total. Used when opening, closing, auditing and X-cutting.
//!
//! ## Counting Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cashier counts the drawer                                              │
//! │                                                                         │
//! │   100,000 × 1  ─┐                                                       │
//! │    50,000 × 1  ─┤                                                       │
//! │    20,000 × 1  ─┼──► DenominationCounter::total() ──► 170,000           │
//! │       500 × 0  ─┤                                                       │
//! │     other: 0   ─┘   (loose coins weighed as a raw amount)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A count is a snapshot: it lives on the session (open/close) or on a report,
//! never as running state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::MAX_DENOMINATION_COUNT;

/// Face value used in [`CoreError::InvalidCount`] for the raw "other" amount.
pub const OTHER_DENOMINATION: i64 = 0;

// =============================================================================
// Denomination Set
// =============================================================================

/// The bills and coins a drawer accepts, by face value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DenominationSet {
    /// ISO 4217 code.
    pub currency: String,
    /// Bill face values, largest first.
    pub bills: Vec<i64>,
    /// Coin face values, largest first.
    pub coins: Vec<i64>,
}

impl DenominationSet {
    /// Colombian peso drawer.
    pub fn cop() -> Self {
        DenominationSet {
            currency: "COP".to_string(),
            bills: vec![100_000, 50_000, 20_000, 10_000, 5_000, 2_000],
            coins: vec![1_000, 500],
        }
    }

    /// Builds a custom set.
    ///
    /// Face values must be positive and unique across bills and coins.
    pub fn new(currency: impl Into<String>, mut bills: Vec<i64>, mut coins: Vec<i64>) -> CoreResult<Self> {
        let mut seen = Vec::with_capacity(bills.len() + coins.len());
        for face in bills.iter().chain(coins.iter()) {
            if *face <= 0 || seen.contains(face) {
                return Err(CoreError::UnknownDenomination(*face));
            }
            seen.push(*face);
        }
        bills.sort_unstable_by(|a, b| b.cmp(a));
        coins.sort_unstable_by(|a, b| b.cmp(a));
        Ok(DenominationSet {
            currency: currency.into(),
            bills,
            coins,
        })
    }

    /// Checks if the face value is a bill or coin of this set.
    pub fn contains(&self, face: i64) -> bool {
        self.bills.contains(&face) || self.coins.contains(&face)
    }

    /// All face values, bills first.
    pub fn faces(&self) -> impl Iterator<Item = i64> + '_ {
        self.bills.iter().chain(self.coins.iter()).copied()
    }
}

impl Default for DenominationSet {
    fn default() -> Self {
        DenominationSet::cop()
    }
}

// =============================================================================
// Denomination Count
// =============================================================================

/// Units counted per face value, plus a raw "other" amount.
///
/// Counts are signed so that malformed input can be represented and then
/// rejected by the counter instead of wrapping around.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DenominationCount {
    /// Face value → number of units.
    pub counts: BTreeMap<i64, i64>,
    /// Loose change entered as an amount rather than a unit count.
    #[serde(default)]
    pub other: Money,
}

impl DenominationCount {
    /// Creates an empty count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: sets the unit count for a face value.
    pub fn with(mut self, face: i64, count: i64) -> Self {
        self.counts.insert(face, count);
        self
    }

    /// Builder: sets the raw "other" amount.
    pub fn with_other(mut self, amount: Money) -> Self {
        self.other = amount;
        self
    }

    /// Units counted for a face value.
    pub fn count_of(&self, face: i64) -> i64 {
        self.counts.get(&face).copied().unwrap_or(0)
    }
}

// =============================================================================
// Denomination Counter
// =============================================================================

/// Pure counter bound to one currency's denomination set.
#[derive(Debug, Clone, Default)]
pub struct DenominationCounter {
    set: DenominationSet,
}

impl DenominationCounter {
    /// Creates a counter for the given set.
    pub fn new(set: DenominationSet) -> Self {
        DenominationCounter { set }
    }

    /// The configured denominations.
    pub fn set(&self) -> &DenominationSet {
        &self.set
    }

    /// Σ(count × face) + other.
    ///
    /// ## Errors
    /// - [`CoreError::InvalidCount`] for negative (or absurd) counts, and for
    ///   a negative "other" amount
    /// - [`CoreError::UnknownDenomination`] for faces outside the set
    ///
    /// ## Example
    /// ```rust
    /// use till_core::denomination::{DenominationCount, DenominationCounter, DenominationSet};
    ///
    /// let counter = DenominationCounter::new(DenominationSet::cop());
    /// let count = DenominationCount::new().with(100_000, 1).with(50_000, 1).with(20_000, 1);
    /// assert_eq!(counter.total(&count).unwrap().units(), 170_000);
    /// ```
    pub fn total(&self, count: &DenominationCount) -> CoreResult<Money> {
        let mut total = Money::zero();
        for (&face, &units) in &count.counts {
            if !self.set.contains(face) {
                return Err(CoreError::UnknownDenomination(face));
            }
            if !(0..=MAX_DENOMINATION_COUNT).contains(&units) {
                return Err(CoreError::InvalidCount {
                    denomination: face,
                    count: units,
                });
            }
            total += Money::from_units(face).multiply_quantity(units);
        }

        if count.other.is_negative() {
            return Err(CoreError::InvalidCount {
                denomination: OTHER_DENOMINATION,
                count: count.other.units(),
            });
        }

        Ok(total + count.other)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
