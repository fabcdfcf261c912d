//! # Movement Ledger
//!
//! Append-only journal of drawer movements. The ledger never edits or drops a
//! row; every balance is a fold over the rows of one session.
//!
//! ## Balance Fold
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  session s-1                                                            │
//! │                                                                         │
//! │  Open        170,000  (+)      balance   170,000                        │
//! │  Sale         50,000  (+)      balance   220,000                        │
//! │  Sale/Card    30,000  (card, not in drawer)  220,000                    │
//! │  CutX        220,000  (info)   balance   220,000                        │
//! │  Withdrawal   20,000  (-)      balance   200,000                        │
//! │  CloseZ      200,000  (-)      balance         0                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Writes go through [`SessionManager`](crate::session::SessionManager), which
//! owns the ledger and checks the session state first. This module only
//! stores and reads.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CashMovement, InstrumentType, MovementType};

// =============================================================================
// Filter
// =============================================================================

/// Inclusive range of calendar days (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub from: NaiveDate,
    #[ts(as = "String")]
    pub to: NaiveDate,
}

impl DateRange {
    /// A single day.
    pub fn day(date: NaiveDate) -> Self {
        DateRange { from: date, to: date }
    }

    /// Checks if the date falls inside the range.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// History screen filter. Every field is optional; an empty filter matches
/// every row of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MovementFilter {
    /// Case-insensitive match on id, notes or type label.
    pub search_term: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<MovementType>,
    pub date_range: Option<DateRange>,
}

impl MovementFilter {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Builder: free-text search.
    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    /// Builder: only one movement kind.
    pub fn of_kind(mut self, kind: MovementType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Builder: only rows inside the range.
    pub fn between(mut self, range: DateRange) -> Self {
        self.date_range = Some(range);
        self
    }

    fn needle(&self) -> Option<String> {
        self.search_term
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
    }
}

fn matches(movement: &CashMovement, filter: &MovementFilter, needle: Option<&str>) -> bool {
    if let Some(kind) = filter.kind {
        if movement.kind != kind {
            return false;
        }
    }

    if let Some(range) = filter.date_range {
        if !range.contains(movement.timestamp.date_naive()) {
            return false;
        }
    }

    match needle {
        None => true,
        Some(n) => {
            movement.id.to_lowercase().contains(n)
                || movement.notes.to_lowercase().contains(n)
                || movement.kind.label().to_lowercase().contains(n)
        }
    }
}

// =============================================================================
// Query Iterator
// =============================================================================

/// Lazy, finite view over one session's matching rows.
///
/// Cloning the query restarts it from where the clone was taken; calling
/// [`MovementLedger::query`] again restarts from the first row.
#[derive(Debug, Clone)]
pub struct MovementQuery<'a> {
    rows: std::slice::Iter<'a, CashMovement>,
    session_id: &'a str,
    filter: &'a MovementFilter,
    needle: Option<String>,
}

impl<'a> Iterator for MovementQuery<'a> {
    type Item = &'a CashMovement;

    fn next(&mut self) -> Option<Self::Item> {
        let session_id = self.session_id;
        let filter = self.filter;
        let needle = self.needle.as_deref();
        self.rows
            .by_ref()
            .find(|m| m.session_id == session_id && matches(m, filter, needle))
    }
}

// =============================================================================
// Ledger Store
// =============================================================================

/// The journal itself. Rows are kept in append order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementLedger {
    movements: Vec<CashMovement>,
}

impl MovementLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from persisted rows, keeping their order.
    pub(crate) fn from_rows(movements: Vec<CashMovement>) -> Self {
        MovementLedger { movements }
    }

    /// Appends a row. The only write path.
    pub(crate) fn push(&mut self, movement: CashMovement) {
        self.movements.push(movement);
    }

    /// Total number of rows across all sessions.
    pub fn len(&self) -> usize {
        self.movements.len()
    }

    /// Checks if nothing was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// All rows, oldest first.
    pub fn rows(&self) -> &[CashMovement] {
        &self.movements
    }

    /// Rows of one session, oldest first.
    pub fn for_session<'a>(&'a self, session_id: &'a str) -> impl Iterator<Item = &'a CashMovement> + 'a {
        self.movements.iter().filter(move |m| m.session_id == session_id)
    }

    /// Cash the drawer should hold for a session.
    ///
    /// Folds from zero with the sign table; the Open row supplies the opening
    /// float. Card and digital Sale/Refund rows do not touch the drawer.
    pub fn balance(&self, session_id: &str) -> Money {
        self.for_session(session_id).map(CashMovement::cash_delta).sum()
    }

    /// Filtered history for one session.
    pub fn query<'a>(&'a self, session_id: &'a str, filter: &'a MovementFilter) -> MovementQuery<'a> {
        MovementQuery {
            rows: self.movements.iter(),
            session_id,
            filter,
            needle: filter.needle(),
        }
    }

    /// Sum of one movement kind on a UTC calendar day, across sessions.
    ///
    /// Feeds the "sales today" / "refunds today" tiles.
    pub fn daily_total(&self, kind: MovementType, date: NaiveDate) -> Money {
        self.movements
            .iter()
            .filter(|m| m.kind == kind && m.timestamp.date_naive() == date)
            .map(|m| m.amount)
            .sum()
    }

    /// Sum of one kind in a session, optionally restricted to an instrument.
    pub fn session_total(
        &self,
        session_id: &str,
        kind: MovementType,
        instrument: Option<InstrumentType>,
    ) -> Money {
        self.for_session(session_id)
            .filter(|m| m.kind == kind)
            .filter(|m| instrument.map_or(true, |i| m.instrument() == i))
            .map(|m| m.amount)
            .sum()
    }

    /// Checks if a row of this kind already references `related_id`.
    pub fn has_related(&self, kind: MovementType, related_id: &str) -> bool {
        self.movements
            .iter()
            .any(|m| m.kind == kind && m.related_id.as_deref() == Some(related_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
