//! # Drawer
//!
//! The single-writer front door of one cash drawer.
//!
//! ## Thread Safety
//! All drawer state sits behind one `tokio::sync::Mutex`, so `open`,
//! `append`, `close_z` and `confirm` are serialized. Collaborators are only
//! called after the guard is dropped.
//!
//! ## Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Drawer Operations                                    │
//! │                                                                         │
//! │  UI Action             Drawer method            Ledger effect           │
//! │  ─────────             ─────────────            ─────────────           │
//! │                                                                         │
//! │  Count float ─────────► open_shift() ──────────► Open row               │
//! │  Pay a table ─────────► begin_settlement() ────► (none, draft only)     │
//! │  Split / tip ─────────► split_settlement() ────► (none, draft only)     │
//! │  Take payment ────────► confirm_settlement() ──► Sale rows              │
//! │  Petty cash ──────────► record_withdrawal() ───► Withdrawal row         │
//! │  Interim report ──────► cut_x() ───────────────► CutX row + ticket      │
//! │  End of shift ────────► close_shift() ─────────► CloseZ row + ticket    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use till_core::denomination::DenominationCount;
use till_core::ledger::MovementFilter;
use till_core::report::{export_csv, render_ticket, ReconciliationReport, SessionSummary};
use till_core::session::{CheckOutcome, Clock, CloseOutcome, LedgerSnapshot, NewMovement, SessionManager};
use till_core::settlement::{Settlement, SettlementDraft, Totals};
use till_core::validation::validate_search_term;
use till_core::{
    CashMovement, CashSession, CoreResult, InstrumentType, Money, MovementType, Order, PaymentAllocation,
};

use crate::collaborators::{CollaboratorResult, Collaborators, Journal, ReportPrinter, TableService};
use crate::config::DrawerConfig;
use crate::error::{DrawerError, DrawerResult};

/// Everything guarded by the drawer lock.
struct DrawerState {
    manager: SessionManager,
    /// Pending settlements keyed by order id.
    drafts: HashMap<String, SettlementDraft>,
}

impl DrawerState {
    fn current_session_id(&self) -> DrawerResult<String> {
        self.manager
            .current_session()
            .map(|s| s.id.clone())
            .ok_or(DrawerError::NoOpenSession)
    }
}

/// One cash drawer.
pub struct Drawer {
    config: Arc<DrawerConfig>,
    state: Arc<Mutex<DrawerState>>,
    collaborators: Collaborators,
}

impl Drawer {
    /// Creates an empty drawer with no-op collaborators.
    pub fn new(config: DrawerConfig) -> DrawerResult<Self> {
        DrawerBuilder::new(config).build()
    }

    /// Starts a builder for custom collaborators, clock or restored state.
    pub fn builder(config: DrawerConfig) -> DrawerBuilder {
        DrawerBuilder::new(config)
    }

    /// The configuration this drawer runs with.
    pub fn config(&self) -> &DrawerConfig {
        &self.config
    }

    /// Formats an amount in the drawer's currency.
    pub fn format(&self, amount: Money) -> String {
        self.config.format_currency(amount)
    }

    // =========================================================================
    // Shift Lifecycle
    // =========================================================================

    /// Opens a shift with the counted float.
    pub async fn open_shift(
        &self,
        cashier_id: &str,
        opening_count: &DenominationCount,
        supervisor_id: Option<&str>,
    ) -> DrawerResult<CashSession> {
        debug!(cashier_id, "open_shift");

        let (session, opening_row) = {
            let mut state = self.state.lock().await;
            let session = state.manager.open(
                cashier_id,
                opening_count,
                supervisor_id,
                Some(self.config.device_id()),
            )?;
            let opening_row = state.manager.movements(&session.id).first().map(|m| (*m).clone());
            (session, opening_row)
        };

        info!(
            session_id = %session.id,
            cashier_id,
            opening = %session.opening_amount,
            "Shift opened"
        );

        notify("journal session", self.collaborators.journal.record_session(&session));
        if let Some(row) = &opening_row {
            self.journal(row);
        }
        Ok(session)
    }

    /// Z-closes the open shift and prints the Z ticket.
    ///
    /// A non-zero discrepancy is logged and reported, never rejected.
    /// Settlement drafts still pending are discarded with the shift.
    pub async fn close_shift(
        &self,
        closing_count: &DenominationCount,
        user_id: &str,
    ) -> DrawerResult<CloseOutcome> {
        debug!(user_id, "close_shift");

        let (outcome, abandoned) = {
            let mut state = self.state.lock().await;
            let session_id = state.current_session_id()?;
            let outcome = state.manager.close_z(&session_id, closing_count, user_id)?;
            let abandoned: Vec<String> = state.drafts.drain().map(|(order_id, _)| order_id).collect();
            (outcome, abandoned)
        };

        let session_id = outcome.session.id.as_str();
        if !abandoned.is_empty() {
            warn!(
                session_id,
                orders = ?abandoned,
                "Pending settlements discarded at Z close"
            );
        }
        if outcome.discrepancy.is_zero() {
            info!(session_id, expected = %outcome.report.expected, "Shift closed, drawer balanced");
        } else {
            warn!(
                session_id,
                expected = %outcome.report.expected,
                discrepancy = %outcome.discrepancy,
                "Shift closed with discrepancy"
            );
        }

        self.journal(&outcome.movement);
        notify("journal session", self.collaborators.journal.record_session(&outcome.session));
        self.print(&outcome.movement, &outcome.report);
        Ok(outcome)
    }

    /// X-cut of the open shift. Repeatable.
    pub async fn cut_x(&self, counted: Option<&DenominationCount>, user_id: &str) -> DrawerResult<CheckOutcome> {
        debug!(user_id, counted = counted.is_some(), "cut_x");

        let outcome = {
            let mut state = self.state.lock().await;
            let session_id = state.current_session_id()?;
            state.manager.cut_x(&session_id, counted, user_id)?
        };

        info!(
            session_id = %outcome.report.session_id,
            expected = %outcome.report.expected,
            "X cut recorded"
        );
        self.journal(&outcome.movement);
        self.print(&outcome.movement, &outcome.report);
        Ok(outcome)
    }

    /// Supervisor audit of the open shift.
    pub async fn audit(&self, counted: &DenominationCount, user_id: &str) -> DrawerResult<CheckOutcome> {
        debug!(user_id, "audit");

        let outcome = {
            let mut state = self.state.lock().await;
            let session_id = state.current_session_id()?;
            state.manager.audit(&session_id, counted, user_id)?
        };

        info!(
            session_id = %outcome.report.session_id,
            discrepancy = ?outcome.report.discrepancy.map(|d| d.units()),
            "Audit recorded"
        );
        self.journal(&outcome.movement);
        self.print(&outcome.movement, &outcome.report);
        Ok(outcome)
    }

    // =========================================================================
    // Cash Movements
    // =========================================================================

    /// Takes cash out of the drawer (petty cash, bank drop).
    pub async fn record_withdrawal(&self, amount: Money, user_id: &str, notes: &str) -> DrawerResult<CashMovement> {
        self.record(NewMovement::new(MovementType::Withdrawal, amount, user_id).notes(notes))
            .await
    }

    /// Adds cash to the drawer (change top-up).
    pub async fn record_deposit(&self, amount: Money, user_id: &str, notes: &str) -> DrawerResult<CashMovement> {
        self.record(NewMovement::new(MovementType::Deposit, amount, user_id).notes(notes))
            .await
    }

    /// Refunds a customer. Cash refunds must be covered by the drawer.
    pub async fn record_refund(
        &self,
        amount: Money,
        method: InstrumentType,
        user_id: &str,
        notes: &str,
        related_id: Option<&str>,
    ) -> DrawerResult<CashMovement> {
        let mut request = NewMovement::new(MovementType::Refund, amount, user_id)
            .notes(notes)
            .paid_by(method);
        request.related_id = related_id.map(str::to_string);
        self.record(request).await
    }

    /// Appends any non-lifecycle movement to the open shift.
    pub async fn record(&self, request: NewMovement) -> DrawerResult<CashMovement> {
        debug!(kind = %request.kind, amount = %request.amount, "record movement");

        let movement = {
            let mut state = self.state.lock().await;
            let session_id = state.current_session_id()?;
            state.manager.record(&session_id, request)?
        };

        info!(
            session_id = %movement.session_id,
            movement_id = %movement.id,
            kind = %movement.kind,
            amount = %movement.amount,
            "Movement recorded"
        );
        self.journal(&movement);
        Ok(movement)
    }

    // =========================================================================
    // Settlements
    // =========================================================================

    /// Starts settling an order at the tip rate it arrived with.
    ///
    /// Totals are recomputed from the order's own lines and `tip_rate`.
    pub async fn begin_settlement(&self, order: Order) -> DrawerResult<SettlementDraft> {
        debug!(order_id = %order.id, tip_bps = order.tip_rate.bps(), "begin_settlement");

        let mut state = self.state.lock().await;
        if state.drafts.contains_key(&order.id) {
            return Err(DrawerError::DraftInProgress(order.id));
        }

        let tip_rate = order.tip_rate;
        let mut draft = SettlementDraft::new(order)?;
        draft.set_tip_rate(tip_rate)?;
        let order_id = draft.order().id.clone();
        state.drafts.insert(order_id, draft.clone());
        Ok(draft)
    }

    /// Applies the drawer's configured tip rate to a pending settlement.
    pub async fn apply_default_tip(&self, order_id: &str) -> DrawerResult<Totals> {
        let tip_rate = self.config.default_tip_rate();
        debug!(order_id, tip_bps = tip_rate.bps(), "apply_default_tip");
        self.with_draft_mut(order_id, |d| d.set_tip_rate(tip_rate)).await
    }

    /// Current state of a pending settlement.
    pub async fn draft(&self, order_id: &str) -> DrawerResult<SettlementDraft> {
        let state = self.state.lock().await;
        state
            .drafts
            .get(order_id)
            .cloned()
            .ok_or_else(|| DrawerError::DraftNotFound(order_id.to_string()))
    }

    /// Edits a pending settlement under the drawer lock.
    ///
    /// ## Usage
    /// ```rust,ignore
    /// drawer.with_draft_mut(&order_id, |d| d.set_tip_rate(TipRate::from_percent(15))).await?;
    /// ```
    pub async fn with_draft_mut<F, R>(&self, order_id: &str, f: F) -> DrawerResult<R>
    where
        F: FnOnce(&mut SettlementDraft) -> CoreResult<R>,
    {
        let mut state = self.state.lock().await;
        let draft = state
            .drafts
            .get_mut(order_id)
            .ok_or_else(|| DrawerError::DraftNotFound(order_id.to_string()))?;
        Ok(f(draft)?)
    }

    /// Splits a pending settlement into equal cash shares.
    pub async fn split_settlement(&self, order_id: &str, parts: u32) -> DrawerResult<Vec<PaymentAllocation>> {
        let max = self.config.settlement.max_split_parts;
        if parts > max {
            return Err(DrawerError::SplitLimit { parts, max });
        }
        self.with_draft_mut(order_id, |d| d.split_evenly(parts).map(<[_]>::to_vec))
            .await
    }

    /// Drops a pending settlement. No ledger effect.
    pub async fn discard_settlement(&self, order_id: &str) -> DrawerResult<()> {
        let mut state = self.state.lock().await;
        match state.drafts.remove(order_id) {
            Some(_) => {
                debug!(order_id, "Settlement draft discarded");
                Ok(())
            }
            None => Err(DrawerError::DraftNotFound(order_id.to_string())),
        }
    }

    /// Commits a pending settlement to the open shift.
    ///
    /// On failure the draft stays pending so the cashier can fix it.
    pub async fn confirm_settlement(&self, order_id: &str, user_id: &str) -> DrawerResult<Settlement> {
        debug!(order_id, user_id, "confirm_settlement");

        let settlement = {
            let mut state = self.state.lock().await;
            let session_id = state.current_session_id()?;
            let draft = state
                .drafts
                .get(order_id)
                .cloned()
                .ok_or_else(|| DrawerError::DraftNotFound(order_id.to_string()))?;
            let settlement = draft.confirm(&mut state.manager, &session_id, user_id)?;
            state.drafts.remove(order_id);
            settlement
        };

        info!(
            order_id,
            total = %settlement.order.total,
            payments = settlement.movements.len(),
            change = %settlement.change,
            "Order settled"
        );

        for movement in &settlement.movements {
            self.journal(movement);
        }
        if let Some(table) = &settlement.order.table_ref {
            notify(
                "release table",
                self.collaborators.tables.release_table(table, &settlement.order.id),
            );
        }
        Ok(settlement)
    }

    // =========================================================================
    // Read Side
    // =========================================================================

    /// The open session, if any.
    pub async fn current_session(&self) -> Option<CashSession> {
        self.state.lock().await.manager.current_session().cloned()
    }

    /// Expected cash in the drawer right now.
    pub async fn balance(&self) -> DrawerResult<Money> {
        let state = self.state.lock().await;
        let session_id = state.current_session_id()?;
        Ok(state.manager.balance(&session_id))
    }

    /// Dashboard tiles for the open shift.
    pub async fn summary(&self) -> DrawerResult<SessionSummary> {
        let state = self.state.lock().await;
        let session_id = state.current_session_id()?;
        Ok(state.manager.summary(&session_id)?)
    }

    /// Filtered movement history. Defaults to the open shift.
    pub async fn history(&self, session_id: Option<&str>, filter: &MovementFilter) -> DrawerResult<Vec<CashMovement>> {
        let mut filter = filter.clone();
        if let Some(term) = filter.search_term.take() {
            filter.search_term = Some(validate_search_term(&term).map_err(till_core::CoreError::from)?);
        }

        let state = self.state.lock().await;
        let session_id = match session_id {
            Some(id) => state.manager.session(id)?.id.clone(),
            None => state.current_session_id()?,
        };
        Ok(state.manager.query(&session_id, &filter).cloned().collect())
    }

    /// CSV export of a session's movements.
    pub async fn export_history_csv(&self, session_id: &str) -> DrawerResult<String> {
        let state = self.state.lock().await;
        state.manager.session(session_id)?;
        let csv = export_csv(state.manager.ledger().for_session(session_id))?;
        debug!(session_id, bytes = csv.len(), "History exported");
        Ok(csv)
    }

    /// Plain-data copy of the drawer for persistence.
    pub async fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().await.manager.snapshot()
    }

    // =========================================================================
    // Collaborator Calls
    // =========================================================================

    fn journal(&self, movement: &CashMovement) {
        notify("journal movement", self.collaborators.journal.record_movement(movement));
    }

    fn print(&self, movement: &CashMovement, report: &ReconciliationReport) {
        let ticket = render_ticket(movement, Some(report));
        notify("print ticket", self.collaborators.printer.print(&ticket));
    }
}

fn notify(what: &str, result: CollaboratorResult) {
    if let Err(e) = result {
        warn!(collaborator = what, error = %e, "Collaborator call failed, ledger unchanged");
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a Drawer with options.
pub struct DrawerBuilder {
    config: DrawerConfig,
    clock: Option<Clock>,
    snapshot: Option<LedgerSnapshot>,
    collaborators: Collaborators,
}

impl DrawerBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: DrawerConfig) -> Self {
        DrawerBuilder {
            config,
            clock: None,
            snapshot: None,
            collaborators: Collaborators::default(),
        }
    }

    /// Sets the clock used for timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Restores sessions and movements from persistence.
    pub fn with_snapshot(mut self, snapshot: LedgerSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// Sets the table service.
    pub fn with_tables(mut self, tables: Arc<dyn TableService>) -> Self {
        self.collaborators.tables = tables;
        self
    }

    /// Sets the persistence journal.
    pub fn with_journal(mut self, journal: Arc<dyn Journal>) -> Self {
        self.collaborators.journal = journal;
        self
    }

    /// Sets the ticket printer.
    pub fn with_printer(mut self, printer: Arc<dyn ReportPrinter>) -> Self {
        self.collaborators.printer = printer;
        self
    }

    /// Validates the config and builds the Drawer.
    pub fn build(self) -> DrawerResult<Drawer> {
        self.config.validate()?;
        let set = self.config.denomination_set()?;
        let clock: Clock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(chrono::Utc::now),
        };

        let manager = match self.snapshot {
            Some(snapshot) => {
                let manager = SessionManager::restore(set, snapshot, clock)?;
                info!(
                    sessions = manager.sessions().len(),
                    movements = manager.ledger().len(),
                    "Drawer restored from snapshot"
                );
                manager
            }
            None => SessionManager::with_clock(set, clock),
        };

        Ok(Drawer {
            config: Arc::new(self.config),
            state: Arc::new(Mutex::new(DrawerState {
                manager,
                drafts: HashMap::new(),
            })),
            collaborators: self.collaborators,
        })
    }
}
