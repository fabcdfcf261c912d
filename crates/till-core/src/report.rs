//! # Reconciliation Reports
//!
//! Pure builders for X-cut, Z-close and audit reports, plus the two outbound
//! text formats: the printed ticket and the CSV history export.
//!
//! ## Report Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  opening        170,000                                                 │
//! │  + cash sales    50,000     card / digital sales are listed but do     │
//! │  − cash refunds       0     not change the drawer                       │
//! │  − withdrawals   20,000                                                 │
//! │  + deposits       5,000                                                 │
//! │  ──────────────────────                                                 │
//! │  expected       205,000  ◄── ledger balance                             │
//! │  counted        200,000  ◄── DenominationCounter                        │
//! │  discrepancy     -5,000  (short)                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::ledger::MovementLedger;
use crate::money::Money;
use crate::types::{CashMovement, CashSession, InstrumentType, MovementType};

/// CSV header row for history exports.
pub const CSV_HEADER: [&str; 6] = ["ID", "Type", "Amount", "Date", "Notes", "UserID"];

const RULE: &str = "========================================";
const THIN_RULE: &str = "----------------------------------------";

// =============================================================================
// Report Types
// =============================================================================

/// Which reconciliation produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// Interim shift report.
    CutX,
    /// Final report written at close.
    CloseZ,
    /// Surprise count by a supervisor.
    Audit,
}

impl ReportKind {
    /// Title used on tickets and in movement notes.
    pub const fn label(&self) -> &'static str {
        match self {
            ReportKind::CutX => "X cut",
            ReportKind::CloseZ => "Z close",
            ReportKind::Audit => "Audit",
        }
    }

    /// Movement kind whose rows carry this report.
    pub const fn movement_type(&self) -> MovementType {
        match self {
            ReportKind::CutX => MovementType::CutX,
            ReportKind::CloseZ => MovementType::CloseZ,
            ReportKind::Audit => MovementType::Audit,
        }
    }

    /// The report kind a movement row announces, if any.
    pub const fn for_movement(kind: MovementType) -> Option<ReportKind> {
        match kind {
            MovementType::CutX => Some(ReportKind::CutX),
            MovementType::CloseZ => Some(ReportKind::CloseZ),
            MovementType::Audit => Some(ReportKind::Audit),
            _ => None,
        }
    }
}

/// Ledger totals for one session compared against a physical count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciliationReport {
    pub kind: ReportKind,
    pub session_id: String,
    pub cashier_id: String,
    /// Who requested the report.
    pub user_id: String,
    pub opening: Money,
    pub cash_sales: Money,
    pub card_sales: Money,
    pub digital_sales: Money,
    /// All refunds, any instrument.
    pub refunds: Money,
    pub withdrawals: Money,
    pub deposits: Money,
    /// Cash the ledger says the drawer holds.
    pub expected: Money,
    pub counted: Option<Money>,
    /// counted − expected.
    pub discrepancy: Option<Money>,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// Sales across every instrument, less refunds.
    pub fn net_sales(&self) -> Money {
        self.cash_sales + self.card_sales + self.digital_sales - self.refunds
    }

    /// Checks if the count matched the ledger (false when nothing was counted).
    pub fn is_balanced(&self) -> bool {
        self.discrepancy == Some(Money::zero())
    }
}

/// Builds a report from the ledger as it stands.
///
/// Reading only: calling this twice over the same ledger yields the same
/// numbers.
pub fn build(
    kind: ReportKind,
    session: &CashSession,
    ledger: &MovementLedger,
    counted: Option<Money>,
    user_id: &str,
    generated_at: DateTime<Utc>,
) -> ReconciliationReport {
    let id = session.id.as_str();
    let expected = ledger.balance(id);

    ReconciliationReport {
        kind,
        session_id: session.id.clone(),
        cashier_id: session.cashier_id.clone(),
        user_id: user_id.to_string(),
        opening: session.opening_amount,
        cash_sales: ledger.session_total(id, MovementType::Sale, Some(InstrumentType::Cash)),
        card_sales: ledger.session_total(id, MovementType::Sale, Some(InstrumentType::Card)),
        digital_sales: ledger.session_total(id, MovementType::Sale, Some(InstrumentType::Digital)),
        refunds: ledger.session_total(id, MovementType::Refund, None),
        withdrawals: ledger.session_total(id, MovementType::Withdrawal, None),
        deposits: ledger.session_total(id, MovementType::Deposit, None),
        expected,
        counted,
        discrepancy: counted.map(|c| c - expected),
        generated_at,
    }
}

// =============================================================================
// Session Summary
// =============================================================================

/// Sales per instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesByMethod {
    pub cash: Money,
    pub card: Money,
    pub digital: Money,
}

impl SalesByMethod {
    /// Sum across instruments.
    pub fn total(&self) -> Money {
        self.cash + self.card + self.digital
    }
}

/// Dashboard tiles for the open drawer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionSummary {
    pub cash_balance: Money,
    pub by_sales_method: SalesByMethod,
    /// Sales recorded today on any drawer session.
    pub daily_sales: Money,
    pub daily_refunds: Money,
}

pub fn summarize(ledger: &MovementLedger, session_id: &str, today: NaiveDate) -> SessionSummary {
    let sales = |i| ledger.session_total(session_id, MovementType::Sale, Some(i));
    SessionSummary {
        cash_balance: ledger.balance(session_id),
        by_sales_method: SalesByMethod {
            cash: sales(InstrumentType::Cash),
            card: sales(InstrumentType::Card),
            digital: sales(InstrumentType::Digital),
        },
        daily_sales: ledger.daily_total(MovementType::Sale, today),
        daily_refunds: ledger.daily_total(MovementType::Refund, today),
    }
}

// =============================================================================
// Ticket Text
// =============================================================================

/// Renders the printable ticket for a movement.
///
/// ## Layout
/// ```text
/// ========================================
/// CutX
/// ID:    3f0c…
/// Date:  2026-03-02 15:00:00 UTC
/// User:  cashier-1
/// ----------------------------------------
/// Type:   CutX
/// Amount: 220,000
/// Notes:  X cut expected 220,000
/// ----------------------------------------   (report rows only)
/// Cash sales:       50,000
/// ...
/// Total:            50,000
/// ========================================
/// ```
///
/// The summary block is printed only when a report is given and the
/// movement is a CutX, CloseZ or Audit row.
pub fn render_ticket(movement: &CashMovement, report: Option<&ReconciliationReport>) -> String {
    let mut out = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, "{}", movement.kind.label());
    let _ = writeln!(out, "ID:    {}", movement.id);
    let _ = writeln!(out, "Date:  {}", movement.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "User:  {}", movement.user_id);
    let _ = writeln!(out, "{}", THIN_RULE);

    let _ = writeln!(out, "Type:   {}", movement.kind.label());
    if movement.kind.carries_instrument() {
        let _ = writeln!(out, "Method: {}", movement.instrument());
    }
    let _ = writeln!(out, "Amount: {}", movement.amount);
    if !movement.notes.is_empty() {
        let _ = writeln!(out, "Notes:  {}", movement.notes);
    }

    let summary = report.filter(|_| ReportKind::for_movement(movement.kind).is_some());
    if let Some(r) = summary {
        let _ = writeln!(out, "{}", THIN_RULE);
        let rows = [
            ("Cash sales", r.cash_sales),
            ("Card sales", r.card_sales),
            ("Digital sales", r.digital_sales),
            ("Refunds", r.refunds),
            ("Withdrawals", r.withdrawals),
            ("Deposits", r.deposits),
            ("Total", r.net_sales()),
        ];
        for (label, amount) in rows {
            let _ = writeln!(out, "{:<16}{:>16}", format!("{}:", label), amount.to_string());
        }

        let _ = writeln!(out, "{}", THIN_RULE);
        let _ = writeln!(out, "{:<16}{:>16}", "Expected:", r.expected.to_string());
        if let (Some(counted), Some(diff)) = (r.counted, r.discrepancy) {
            let _ = writeln!(out, "{:<16}{:>16}", "Counted:", counted.to_string());
            let _ = writeln!(out, "{:<16}{:>16}", "Discrepancy:", diff.to_string());
        }
    }

    let _ = writeln!(out, "{}", RULE);
    out
}

// =============================================================================
// CSV Export
// =============================================================================

/// Writes movements as CSV: `ID,Type,Amount,Date,Notes,UserID`.
///
/// Amounts are raw smallest units (no grouping); dates are RFC 3339.
/// Quoting of commas, quotes and newlines in notes follows RFC 4180.
pub fn export_csv<'a, I>(movements: I) -> CoreResult<String>
where
    I: IntoIterator<Item = &'a CashMovement>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for m in movements {
        let amount = m.amount.units().to_string();
        let date = m.timestamp.to_rfc3339();
        writer.write_record([
            m.id.as_str(),
            m.kind.label(),
            amount.as_str(),
            date.as_str(),
            m.notes.as_str(),
            m.user_id.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| CoreError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CoreError::Export(e.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denomination::DenominationCount;
    use crate::types::SessionStatus;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
    }

    fn session() -> CashSession {
        CashSession {
            id: "s-1".to_string(),
            cashier_id: "cashier-1".to_string(),
            supervisor_id: None,
            device_id: None,
            opened_at: at(8),
            closed_at: None,
            opening_count: DenominationCount::new().with(100_000, 1),
            opening_amount: Money::from_units(100_000),
            closing_count: None,
            status: SessionStatus::Open,
        }
    }

    fn row(id: &str, kind: MovementType, amount: i64, method: Option<InstrumentType>) -> CashMovement {
        CashMovement {
            id: id.to_string(),
            session_id: "s-1".to_string(),
            kind,
            amount: Money::from_units(amount),
            timestamp: at(12),
            notes: String::new(),
            user_id: "cashier-1".to_string(),
            related_id: None,
            method,
        }
    }

    fn ledger() -> MovementLedger {
        let mut ledger = MovementLedger::new();
        ledger.push(row("m-1", MovementType::Open, 100_000, None));
        ledger.push(row("m-2", MovementType::Sale, 50_000, None));
        ledger.push(row("m-3", MovementType::Sale, 30_000, Some(InstrumentType::Card)));
        ledger.push(row("m-4", MovementType::Sale, 12_000, Some(InstrumentType::Digital)));
        ledger.push(row("m-5", MovementType::Refund, 2_000, None));
        ledger.push(row("m-6", MovementType::Withdrawal, 20_000, None));
        ledger.push(row("m-7", MovementType::Deposit, 5_000, None));
        ledger
    }

    #[test]
    fn test_build_report_totals() {
        let report = build(
            ReportKind::CutX,
            &session(),
            &ledger(),
            Some(Money::from_units(130_000)),
            "sup-1",
            at(13),
        );
        assert_eq!(report.cash_sales.units(), 50_000);
        assert_eq!(report.card_sales.units(), 30_000);
        assert_eq!(report.digital_sales.units(), 12_000);
        // 100,000 + 50,000 − 2,000 − 20,000 + 5,000
        assert_eq!(report.expected.units(), 133_000);
        assert_eq!(report.discrepancy, Some(Money::from_units(-3_000)));
        assert_eq!(report.net_sales().units(), 90_000);
        assert!(!report.is_balanced());
    }

    #[test]
    fn test_report_without_count() {
        let report = build(ReportKind::CutX, &session(), &ledger(), None, "sup-1", at(13));
        assert_eq!(report.counted, None);
        assert_eq!(report.discrepancy, None);
        assert!(!report.is_balanced());
    }

    #[test]
    fn test_summary_tiles() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let summary = summarize(&ledger(), "s-1", today);
        assert_eq!(summary.cash_balance.units(), 133_000);
        assert_eq!(summary.by_sales_method.total().units(), 92_000);
        assert_eq!(summary.daily_sales.units(), 92_000);
        assert_eq!(summary.daily_refunds.units(), 2_000);

        let tomorrow = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();
        assert_eq!(summarize(&ledger(), "s-1", tomorrow).daily_sales, Money::zero());
    }

    #[test]
    fn test_ticket_includes_summary_for_report_rows() {
        let report = build(ReportKind::CutX, &session(), &ledger(), None, "sup-1", at(13));
        let mut cut = row("m-8", MovementType::CutX, 133_000, None);
        cut.notes = "X cut expected 133,000".to_string();

        let text = render_ticket(&cut, Some(&report));
        assert!(text.contains("ID:    m-8"));
        assert!(text.contains("Date:  2026-03-02 12:00:00 UTC"));
        assert!(text.contains("Amount: 133,000"));
        assert!(text.contains("Card sales:"));
        assert!(text.contains("90,000"));
        assert!(!text.contains("Counted:"));
    }

    #[test]
    fn test_ticket_plain_movement_has_no_summary() {
        let report = build(ReportKind::CutX, &session(), &ledger(), None, "sup-1", at(13));
        let sale = row("m-2", MovementType::Sale, 50_000, Some(InstrumentType::Card));
        let text = render_ticket(&sale, Some(&report));
        assert!(text.contains("Method: Card"));
        assert!(!text.contains("Cash sales:"));
    }

    #[test]
    fn test_export_csv_quotes_notes() {
        let mut sale = row("m-2", MovementType::Sale, 50_000, None);
        sale.notes = "Table 4, \"VIP\"".to_string();
        let csv = export_csv([&sale]).unwrap();

        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ID,Type,Amount,Date,Notes,UserID"));
        assert_eq!(
            lines.next(),
            Some("m-2,Sale,50000,2026-03-02T12:00:00+00:00,\"Table 4, \"\"VIP\"\"\",cashier-1")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_export_csv_empty_has_header_only() {
        let csv = export_csv(std::iter::empty::<&CashMovement>()).unwrap();
        assert_eq!(csv, "ID,Type,Amount,Date,Notes,UserID\n");
    }
}
