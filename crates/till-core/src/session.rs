//! # Session Manager
//!
//! Owns the drawer's session list and its movement ledger, and is the only
//! way to write to either.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │            open()                       close_z()                       │
//! │  Closed ───────────────► Open ──────────────────────► Closed            │
//! │    ▲                      │ ▲                            │              │
//! │    │                      │ │ cut_x() / audit()          │              │
//! │    │                      └─┘ append() / settlements     │              │
//! │    └──────────────── a new session may be opened ◄───────┘              │
//! │                                                                         │
//! │  At most ONE session is Open per manager (= per drawer).               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method validates before it writes, so a returned error means the
//! sessions and the ledger are exactly as they were.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::denomination::{DenominationCount, DenominationCounter, DenominationSet};
use crate::error::{CoreError, CoreResult};
use crate::ledger::{MovementFilter, MovementLedger, MovementQuery};
use crate::money::Money;
use crate::report::{self, ReconciliationReport, ReportKind, SessionSummary};
use crate::types::{
    CashMovement, CashSession, InstrumentType, MovementEffect, MovementType, SessionStatus,
};
use crate::validation::{validate_notes, validate_user_id};

/// Source of "now" for timestamps. Injected so replays and tests are
/// deterministic.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// =============================================================================
// New Movement
// =============================================================================

/// A movement request before it gets an id and a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub kind: MovementType,
    pub amount: Money,
    pub user_id: String,
    pub notes: String,
    pub related_id: Option<String>,
    pub method: Option<InstrumentType>,
}

impl NewMovement {
    /// Cash movement with no notes.
    pub fn new(kind: MovementType, amount: Money, user_id: impl Into<String>) -> Self {
        NewMovement {
            kind,
            amount,
            user_id: user_id.into(),
            notes: String::new(),
            related_id: None,
            method: None,
        }
    }

    /// Builder: free-text notes.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Builder: link to an order or settlement.
    pub fn related_to(mut self, related_id: impl Into<String>) -> Self {
        self.related_id = Some(related_id.into());
        self
    }

    /// Builder: instrument for Sale/Refund rows.
    pub fn paid_by(mut self, method: InstrumentType) -> Self {
        self.method = Some(method);
        self
    }
}

// =============================================================================
// Outcomes and Snapshots
// =============================================================================

/// Result of a Z-close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseOutcome {
    /// The session, now Closed.
    pub session: CashSession,
    /// counted − expected. Negative means the drawer is short.
    pub discrepancy: Money,
    /// Full Z report, built before the CloseZ row was written.
    pub report: ReconciliationReport,
    /// The CloseZ row.
    pub movement: CashMovement,
}

/// Result of an X-cut or audit: the report plus the informational row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub report: ReconciliationReport,
    pub movement: CashMovement,
}

/// Plain-data copy of the drawer state for the persistence collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub sessions: Vec<CashSession>,
    pub movements: Vec<CashMovement>,
    /// Orders confirmed on this drawer, including ones that wrote no row.
    #[serde(default)]
    pub settled_orders: BTreeSet<String>,
}

// =============================================================================
// Session Manager
// =============================================================================

/// One drawer: its sessions and its ledger.
pub struct SessionManager {
    counter: DenominationCounter,
    sessions: Vec<CashSession>,
    ledger: MovementLedger,
    settled_orders: BTreeSet<String>,
    clock: Clock,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("counter", &self.counter)
            .field("sessions", &self.sessions.len())
            .field("movements", &self.ledger.len())
            .finish()
    }
}

impl SessionManager {
    /// Creates an empty drawer using the system clock.
    pub fn new(set: DenominationSet) -> Self {
        Self::with_clock(set, Arc::new(Utc::now))
    }

    /// Creates an empty drawer with an injected clock.
    pub fn with_clock(set: DenominationSet, clock: Clock) -> Self {
        SessionManager {
            counter: DenominationCounter::new(set),
            sessions: Vec::new(),
            ledger: MovementLedger::new(),
            settled_orders: BTreeSet::new(),
            clock,
        }
    }

    /// Rebuilds a drawer from a persisted snapshot.
    ///
    /// ## Checks
    /// - At most one session is Open
    /// - Every movement belongs to a known session
    /// - Closed sessions carry a close time
    ///
    /// Orders with Sale rows count as settled even if the snapshot's
    /// `settled_orders` predates them.
    pub fn restore(set: DenominationSet, snapshot: LedgerSnapshot, clock: Clock) -> CoreResult<Self> {
        let open = snapshot.sessions.iter().filter(|s| s.is_open()).count();
        if open > 1 {
            return Err(CoreError::InvalidSnapshot(format!(
                "{} sessions are open, at most one allowed",
                open
            )));
        }

        if let Some(s) = snapshot
            .sessions
            .iter()
            .find(|s| !s.is_open() && s.closed_at.is_none())
        {
            return Err(CoreError::InvalidSnapshot(format!(
                "closed session {} has no close time",
                s.id
            )));
        }

        if let Some(m) = snapshot
            .movements
            .iter()
            .find(|m| !snapshot.sessions.iter().any(|s| s.id == m.session_id))
        {
            return Err(CoreError::InvalidSnapshot(format!(
                "movement {} references unknown session {}",
                m.id, m.session_id
            )));
        }

        let mut settled_orders = snapshot.settled_orders;
        settled_orders.extend(
            snapshot
                .movements
                .iter()
                .filter(|m| m.kind == MovementType::Sale)
                .filter_map(|m| m.related_id.clone()),
        );

        Ok(SessionManager {
            counter: DenominationCounter::new(set),
            sessions: snapshot.sessions,
            ledger: MovementLedger::from_rows(snapshot.movements),
            settled_orders,
            clock,
        })
    }

    /// Plain-data copy for persistence.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            sessions: self.sessions.clone(),
            movements: self.ledger.rows().to_vec(),
            settled_orders: self.settled_orders.clone(),
        }
    }

    // =========================================================================
    // Read Side
    // =========================================================================

    /// The denomination counter for this drawer's currency.
    pub fn counter(&self) -> &DenominationCounter {
        &self.counter
    }

    /// The ledger (read-only).
    pub fn ledger(&self) -> &MovementLedger {
        &self.ledger
    }

    /// Every session, oldest first.
    pub fn sessions(&self) -> &[CashSession] {
        &self.sessions
    }

    /// The open session, if any.
    pub fn current_session(&self) -> Option<&CashSession> {
        self.sessions.iter().find(|s| s.is_open())
    }

    /// Looks up a session by id.
    pub fn session(&self, session_id: &str) -> CoreResult<&CashSession> {
        self.sessions
            .iter()
            .find(|s| s.id == session_id)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()))
    }

    /// Whether an order has already been confirmed on this drawer.
    pub fn is_settled(&self, order_id: &str) -> bool {
        self.settled_orders.contains(order_id)
            || self.ledger.has_related(MovementType::Sale, order_id)
    }

    /// Every row of a session, oldest first.
    pub fn movements<'a>(&'a self, session_id: &'a str) -> Vec<&'a CashMovement> {
        self.ledger.for_session(session_id).collect()
    }

    /// Expected cash in the drawer for a session.
    pub fn balance(&self, session_id: &str) -> Money {
        self.ledger.balance(session_id)
    }

    /// Filtered history for a session.
    pub fn query<'a>(&'a self, session_id: &'a str, filter: &'a MovementFilter) -> MovementQuery<'a> {
        self.ledger.query(session_id, filter)
    }

    /// Cash, card and digital breakdown plus today's sale/refund totals.
    pub fn summary(&self, session_id: &str) -> CoreResult<SessionSummary> {
        self.session(session_id)?;
        let today = self.now().date_naive();
        Ok(report::summarize(&self.ledger, session_id, today))
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    pub(crate) fn require_open(&self, session_id: &str) -> CoreResult<&CashSession> {
        let session = self.session(session_id)?;
        if !session.is_open() {
            return Err(CoreError::SessionNotOpen(session_id.to_string()));
        }
        Ok(session)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens a new session with the counted float.
    ///
    /// ## Errors
    /// - [`CoreError::SessionAlreadyOpen`] if a session is still open
    /// - [`CoreError::InvalidCount`] / [`CoreError::UnknownDenomination`]
    ///   for a malformed count
    pub fn open(
        &mut self,
        cashier_id: &str,
        opening_count: &DenominationCount,
        supervisor_id: Option<&str>,
        device_id: Option<&str>,
    ) -> CoreResult<CashSession> {
        validate_user_id(cashier_id)?;

        if let Some(current) = self.current_session() {
            return Err(CoreError::SessionAlreadyOpen {
                session_id: current.id.clone(),
            });
        }

        let opening_amount = self.counter.total(opening_count)?;
        let now = self.now();

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            cashier_id: cashier_id.to_string(),
            supervisor_id: supervisor_id.map(str::to_string),
            device_id: device_id.map(str::to_string),
            opened_at: now,
            closed_at: None,
            opening_count: opening_count.clone(),
            opening_amount,
            closing_count: None,
            status: SessionStatus::Open,
        };

        // An empty float is allowed: the Open row still marks the start.
        self.push(
            &session.id,
            NewMovement::new(MovementType::Open, opening_amount, cashier_id).notes("Opening float"),
            now,
        );
        self.sessions.push(session.clone());

        Ok(session)
    }

    /// Z-close: reconciles the counted drawer and closes the session.
    ///
    /// The CloseZ row removes what the ledger expected, not what was
    /// counted; the difference is reported as `discrepancy` and never
    /// corrected or rejected here.
    pub fn close_z(
        &mut self,
        session_id: &str,
        closing_count: &DenominationCount,
        user_id: &str,
    ) -> CoreResult<CloseOutcome> {
        validate_user_id(user_id)?;
        self.require_open(session_id)?;
        let counted = self.counter.total(closing_count)?;

        let now = self.now();
        let report = self.build_report(ReportKind::CloseZ, session_id, Some(counted), user_id, now)?;
        let expected = report.expected;
        let discrepancy = counted - expected;

        let movement = self.push(
            session_id,
            NewMovement::new(MovementType::CloseZ, expected.max(Money::zero()), user_id)
                .notes(format!("Z close, counted {}", counted)),
            now,
        );

        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| CoreError::SessionNotFound(session_id.to_string()))?;
        session.status = SessionStatus::Closed;
        session.closed_at = Some(now);
        session.closing_count = Some(closing_count.clone());

        Ok(CloseOutcome {
            session: session.clone(),
            discrepancy,
            report,
            movement,
        })
    }

    /// X-cut: interim reconciliation. No state transition; repeatable.
    ///
    /// Without a count the report carries only the ledger side.
    pub fn cut_x(
        &mut self,
        session_id: &str,
        counted: Option<&DenominationCount>,
        user_id: &str,
    ) -> CoreResult<CheckOutcome> {
        validate_user_id(user_id)?;
        self.require_open(session_id)?;
        let counted = counted.map(|c| self.counter.total(c)).transpose()?;
        self.record_check(ReportKind::CutX, session_id, counted, user_id)
    }

    /// Ad hoc audit: same numbers as an X-cut, labelled as an audit.
    pub fn audit(
        &mut self,
        session_id: &str,
        counted: &DenominationCount,
        user_id: &str,
    ) -> CoreResult<CheckOutcome> {
        validate_user_id(user_id)?;
        self.require_open(session_id)?;
        let counted = self.counter.total(counted)?;
        self.record_check(ReportKind::Audit, session_id, Some(counted), user_id)
    }

    fn record_check(
        &mut self,
        kind: ReportKind,
        session_id: &str,
        counted: Option<Money>,
        user_id: &str,
    ) -> CoreResult<CheckOutcome> {
        let now = self.now();
        let report = self.build_report(kind, session_id, counted, user_id, now)?;

        let notes = match report.discrepancy {
            Some(d) => format!("{} expected {}, discrepancy {}", kind.label(), report.expected, d),
            None => format!("{} expected {}", kind.label(), report.expected),
        };
        let movement = self.push(
            session_id,
            NewMovement::new(kind.movement_type(), counted.unwrap_or(report.expected).max(Money::zero()), user_id)
                .notes(notes),
            now,
        );

        Ok(CheckOutcome { report, movement })
    }

    fn build_report(
        &self,
        kind: ReportKind,
        session_id: &str,
        counted: Option<Money>,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<ReconciliationReport> {
        let session = self.session(session_id)?;
        Ok(report::build(kind, session, &self.ledger, counted, user_id, at))
    }

    // =========================================================================
    // Ledger Writes
    // =========================================================================

    /// Appends a cash movement to an open session.
    ///
    /// Convenience over [`SessionManager::record`] for cash rows.
    pub fn append(
        &mut self,
        session_id: &str,
        kind: MovementType,
        amount: Money,
        user_id: &str,
        notes: &str,
        related_id: Option<&str>,
    ) -> CoreResult<CashMovement> {
        let mut request = NewMovement::new(kind, amount, user_id).notes(notes);
        request.related_id = related_id.map(str::to_string);
        self.record(session_id, request)
    }

    /// Appends a movement to an open session.
    ///
    /// ## Errors
    /// - [`CoreError::ReservedMovementType`] for Open / CloseZ
    /// - [`CoreError::SessionNotOpen`] unless the session is open
    /// - [`CoreError::NonPositiveAmount`] for amount ≤ 0 (CutX/Audit may be 0)
    /// - [`CoreError::WithdrawalExceedsBalance`] when cash leaving the drawer
    ///   exceeds the balance; rejected, never clamped
    pub fn record(&mut self, session_id: &str, request: NewMovement) -> CoreResult<CashMovement> {
        self.validate(session_id, &request)?;
        let now = self.now();
        Ok(self.push(session_id, request, now))
    }

    pub(crate) fn validate(&self, session_id: &str, request: &NewMovement) -> CoreResult<()> {
        if request.kind.is_lifecycle() {
            return Err(CoreError::ReservedMovementType(request.kind));
        }
        validate_user_id(&request.user_id)?;
        validate_notes(&request.notes)?;
        self.require_open(session_id)?;

        let zero_allowed = request.kind.is_informational();
        if request.amount.is_negative() || (request.amount.is_zero() && !zero_allowed) {
            return Err(CoreError::NonPositiveAmount {
                kind: request.kind,
                amount: request.amount,
            });
        }

        let is_cash = !request.kind.carries_instrument()
            || request.method.unwrap_or_default() == InstrumentType::Cash;
        if is_cash && request.kind.effect() == MovementEffect::Debit {
            let available = self.balance(session_id);
            if request.amount > available {
                return Err(CoreError::WithdrawalExceedsBalance {
                    requested: request.amount,
                    available,
                });
            }
        }

        Ok(())
    }

    /// Writes a validated row. Cannot fail.
    pub(crate) fn mark_settled(&mut self, order_id: &str) {
        self.settled_orders.insert(order_id.to_string());
    }

    pub(crate) fn push(&mut self, session_id: &str, request: NewMovement, at: DateTime<Utc>) -> CashMovement {
        let method = if request.kind.carries_instrument() {
            request.method
        } else {
            None
        };
        let movement = CashMovement {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            kind: request.kind,
            amount: request.amount,
            timestamp: at,
            notes: request.notes,
            user_id: request.user_id,
            related_id: request.related_id,
            method,
        };
        self.ledger.push(movement.clone());
        movement
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
