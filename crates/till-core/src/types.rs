//! # Domain Types
//!
//! Core domain types used throughout Till.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  CashSession    │   │  CashMovement   │   │     Order       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  session_id     │   │  id             │       │
//! │  │  cashier_id     │   │  kind           │   │  items          │       │
//! │  │  status         │   │  amount (≥ 0)   │   │  subtotal/tax   │       │
//! │  │  opening_count  │   │  related_id ────┼──►│  tip/total      │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  MovementType   │   │ InstrumentType  │   │PaymentAllocation│       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Open/Sale/...  │   │  Cash           │   │  amount         │       │
//! │  │  sign table     │   │  Card           │   │  detail         │       │
//! │  └─────────────────┘   │  Digital        │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::denomination::DenominationCount;
use crate::money::Money;

// =============================================================================
// Rates
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 1900 bps = 19% (Colombian IVA)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

/// Tip rate in basis points (1000 = 10%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TipRate(u32);

impl TipRate {
    /// Creates a tip rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TipRate(bps)
    }

    /// Creates a tip rate from a whole percentage (the waiter's 10% button).
    #[inline]
    pub const fn from_percent(pct: u32) -> Self {
        TipRate(pct * 100)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// No tip.
    #[inline]
    pub const fn zero() -> Self {
        TipRate(0)
    }
}

// =============================================================================
// Cash Session
// =============================================================================

/// Lifecycle state of a drawer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Drawer is open and accepting movements.
    Open,
    /// Z-close done. Terminal for this session.
    #[default]
    Closed,
}

/// One cash drawer shift, from opening float to Z-close.
///
/// Created by [`SessionManager::open`](crate::session::SessionManager::open),
/// mutated only by `close_z`, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashSession {
    pub id: String,
    pub cashier_id: String,
    pub supervisor_id: Option<String>,
    pub device_id: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Bills and coins counted into the drawer at open.
    pub opening_count: DenominationCount,
    /// Total of `opening_count`, frozen at open.
    pub opening_amount: Money,
    /// Physical count at Z-close.
    pub closing_count: Option<DenominationCount>,
    pub status: SessionStatus,
}

impl CashSession {
    /// Checks if the session still accepts movements.
    #[inline]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

// =============================================================================
// Movement Type
// =============================================================================

/// How a movement kind affects the drawer balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementEffect {
    /// Cash comes into the drawer.
    Credit,
    /// Cash leaves the drawer.
    Debit,
    /// Recorded for reporting only.
    Informational,
}

/// The kind of a ledger row.
///
/// ## Sign Table
/// ```text
/// ┌──────────────┬───────────────┐
/// │ Open         │ credit        │
/// │ Sale         │ credit        │
/// │ Deposit      │ credit        │
/// │ Refund       │ debit         │
/// │ Withdrawal   │ debit         │
/// │ CloseZ       │ debit         │
/// │ CutX, Audit  │ informational │
/// └──────────────┴───────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Open,
    CloseZ,
    Sale,
    Refund,
    Withdrawal,
    Deposit,
    CutX,
    Audit,
}

impl MovementType {
    /// Every movement kind, in display order.
    pub const ALL: [MovementType; 8] = [
        MovementType::Open,
        MovementType::Sale,
        MovementType::Refund,
        MovementType::Withdrawal,
        MovementType::Deposit,
        MovementType::CutX,
        MovementType::Audit,
        MovementType::CloseZ,
    ];

    /// The sign table.
    pub const fn effect(&self) -> MovementEffect {
        match self {
            MovementType::Open | MovementType::Sale | MovementType::Deposit => {
                MovementEffect::Credit
            }
            MovementType::Refund | MovementType::Withdrawal | MovementType::CloseZ => {
                MovementEffect::Debit
            }
            MovementType::CutX | MovementType::Audit => MovementEffect::Informational,
        }
    }

    /// Label used in exports, ticket text and search.
    pub const fn label(&self) -> &'static str {
        match self {
            MovementType::Open => "Open",
            MovementType::CloseZ => "CloseZ",
            MovementType::Sale => "Sale",
            MovementType::Refund => "Refund",
            MovementType::Withdrawal => "Withdrawal",
            MovementType::Deposit => "Deposit",
            MovementType::CutX => "CutX",
            MovementType::Audit => "Audit",
        }
    }

    /// Open and CloseZ rows belong to the session lifecycle.
    #[inline]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, MovementType::Open | MovementType::CloseZ)
    }

    /// CutX and Audit rows carry a magnitude but no balance effect.
    #[inline]
    pub const fn is_informational(&self) -> bool {
        matches!(self.effect(), MovementEffect::Informational)
    }

    /// Sale and Refund rows may be paid by non-cash instruments.
    #[inline]
    pub const fn carries_instrument(&self) -> bool {
        matches!(self, MovementType::Sale | MovementType::Refund)
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Payment Instrument
// =============================================================================

/// The payment instrument behind a settlement share or a sale row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    /// Physical cash into the drawer.
    #[default]
    Cash,
    /// Card on an external terminal.
    Card,
    /// Wallet / transfer platform.
    Digital,
}

impl InstrumentType {
    /// Label used in movement notes and reports.
    pub const fn label(&self) -> &'static str {
        match self {
            InstrumentType::Cash => "Cash",
            InstrumentType::Card => "Card",
            InstrumentType::Digital => "Digital",
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Cash Movement
// =============================================================================

/// One row of the append-only drawer ledger.
///
/// `amount` is always a non-negative magnitude; the effect on the balance is
/// given by `kind.effect()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: MovementType,
    pub amount: Money,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
    pub notes: String,
    pub user_id: String,
    /// Order or settlement this row belongs to.
    pub related_id: Option<String>,
    /// Instrument for Sale/Refund rows. `None` means cash.
    pub method: Option<InstrumentType>,
}

impl CashMovement {
    /// Instrument this row was paid with (cash unless stated otherwise).
    #[inline]
    pub fn instrument(&self) -> InstrumentType {
        self.method.unwrap_or_default()
    }

    /// Checks if the row moves physical cash.
    pub fn is_cash(&self) -> bool {
        !self.kind.carries_instrument() || self.instrument() == InstrumentType::Cash
    }

    /// Effect of this row on the cash balance.
    pub fn cash_delta(&self) -> Money {
        if !self.is_cash() {
            return Money::zero();
        }
        match self.kind.effect() {
            MovementEffect::Credit => self.amount,
            MovementEffect::Debit => -self.amount,
            MovementEffect::Informational => Money::zero(),
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// Settlement status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Nothing allocated yet.
    #[default]
    Pending,
    /// Some, but not all, of the total is allocated.
    Partial,
    /// Settled. Terminal.
    Paid,
}

/// A priced line on an order, owned by the order-management collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrderItem {
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    /// Per-line discount amount.
    #[serde(default)]
    pub discount: Money,
}

impl OrderItem {
    /// Creates an undiscounted line.
    pub fn new(name: impl Into<String>, unit_price: Money, quantity: i64) -> Self {
        OrderItem {
            name: name.into(),
            unit_price,
            quantity,
            discount: Money::zero(),
        }
    }

    /// Applies a line discount.
    pub fn with_discount(mut self, discount: Money) -> Self {
        self.discount = discount;
        self
    }

    /// Line total after discount (never below zero).
    pub fn line_total(&self) -> Money {
        let gross = self.unit_price.multiply_quantity(self.quantity);
        (gross - self.discount).max(Money::zero())
    }
}

/// An order presented for settlement.
///
/// ## Invariant
/// `total == subtotal + tax + tip`, recomputed whenever `tip_rate` changes.
/// Item lines are never edited here; only tip, total and status move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Table or ticket the order is attached to.
    pub table_ref: Option<String>,
    pub items: Vec<OrderItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub tip: Money,
    pub tip_rate: TipRate,
    pub total: Money,
    pub status: OrderStatus,
}

impl Order {
    /// Creates a pending order from precomputed subtotal and tax.
    pub fn new(id: impl Into<String>, subtotal: Money, tax: Money) -> Self {
        Order {
            id: id.into(),
            table_ref: None,
            items: Vec::new(),
            subtotal,
            tax,
            tip: Money::zero(),
            tip_rate: TipRate::zero(),
            total: subtotal + tax,
            status: OrderStatus::Pending,
        }
    }

    /// Creates a pending order from its lines, deriving subtotal and tax.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::{Money, Order, OrderItem, TaxRate};
    ///
    /// let order = Order::from_items(
    ///     "order-1",
    ///     Some("T4".to_string()),
    ///     vec![OrderItem::new("Bandeja paisa", Money::from_units(24_000), 2)],
    ///     TaxRate::from_bps(1000),
    /// );
    /// assert_eq!(order.subtotal.units(), 48_000);
    /// assert_eq!(order.tax.units(), 4_800);
    /// assert_eq!(order.total.units(), 52_800);
    /// ```
    pub fn from_items(
        id: impl Into<String>,
        table_ref: Option<String>,
        items: Vec<OrderItem>,
        tax_rate: TaxRate,
    ) -> Self {
        let subtotal: Money = items.iter().map(OrderItem::line_total).sum();
        let tax = subtotal.calculate_tax(tax_rate);
        let mut order = Order::new(id, subtotal, tax);
        order.table_ref = table_ref;
        order.items = items;
        order
    }

    /// Attaches the order to a table.
    pub fn at_table(mut self, table_ref: impl Into<String>) -> Self {
        self.table_ref = Some(table_ref.into());
        self
    }

    /// Checks if the order is settled.
    #[inline]
    pub fn is_paid(&self) -> bool {
        self.status == OrderStatus::Paid
    }
}

// =============================================================================
// Payment Allocation
// =============================================================================

/// Instrument-specific data carried by an allocation.
///
/// None of these fields change the settled amount: card fees in particular
/// are recorded, not deducted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "instrument", rename_all = "snake_case")]
pub enum InstrumentDetail {
    Cash {
        /// What the customer handed over (for change).
        tendered: Option<Money>,
    },
    Card {
        last4: Option<String>,
        /// Processor fee in basis points, metadata only.
        fee_bps: u32,
    },
    Digital {
        /// Wallet or transfer platform name.
        platform: Option<String>,
        /// Platform transaction reference.
        reference: Option<String>,
    },
}

impl InstrumentDetail {
    /// Blank detail for an instrument type.
    pub fn blank(instrument: InstrumentType) -> Self {
        match instrument {
            InstrumentType::Cash => InstrumentDetail::Cash { tendered: None },
            InstrumentType::Card => InstrumentDetail::Card {
                last4: None,
                fee_bps: 0,
            },
            InstrumentType::Digital => InstrumentDetail::Digital {
                platform: None,
                reference: None,
            },
        }
    }

    /// The instrument this detail describes.
    pub fn instrument(&self) -> InstrumentType {
        match self {
            InstrumentDetail::Cash { .. } => InstrumentType::Cash,
            InstrumentDetail::Card { .. } => InstrumentType::Card,
            InstrumentDetail::Digital { .. } => InstrumentType::Digital,
        }
    }
}

/// One instrument's share of an order's total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentAllocation {
    pub id: String,
    pub amount: Money,
    pub detail: InstrumentDetail,
}

impl PaymentAllocation {
    /// Creates an allocation with a fresh id and blank detail.
    pub fn new(instrument: InstrumentType, amount: Money) -> Self {
        PaymentAllocation {
            id: uuid::Uuid::new_v4().to_string(),
            amount,
            detail: InstrumentDetail::blank(instrument),
        }
    }

    /// Cash allocation with the tendered amount.
    pub fn cash(amount: Money, tendered: Option<Money>) -> Self {
        PaymentAllocation {
            detail: InstrumentDetail::Cash { tendered },
            ..PaymentAllocation::new(InstrumentType::Cash, amount)
        }
    }

    /// Card allocation.
    pub fn card(amount: Money, last4: Option<String>, fee_bps: u32) -> Self {
        PaymentAllocation {
            detail: InstrumentDetail::Card { last4, fee_bps },
            ..PaymentAllocation::new(InstrumentType::Card, amount)
        }
    }

    /// Digital wallet allocation.
    pub fn digital(amount: Money, platform: Option<String>, reference: Option<String>) -> Self {
        PaymentAllocation {
            detail: InstrumentDetail::Digital {
                platform,
                reference,
            },
            ..PaymentAllocation::new(InstrumentType::Digital, amount)
        }
    }

    /// Instrument type of this allocation.
    #[inline]
    pub fn instrument(&self) -> InstrumentType {
        self.detail.instrument()
    }

    /// Note written on the Sale row for this allocation.
    pub fn describe(&self) -> String {
        match &self.detail {
            InstrumentDetail::Cash { .. } => "Cash payment".to_string(),
            InstrumentDetail::Card { last4: Some(l4), .. } => format!("Card payment ****{}", l4),
            InstrumentDetail::Card { .. } => "Card payment".to_string(),
            InstrumentDetail::Digital {
                platform: Some(p),
                reference,
            } => match reference {
                Some(r) => format!("Digital payment via {} ref {}", p, r),
                None => format!("Digital payment via {}", p),
            },
            InstrumentDetail::Digital { .. } => "Digital payment".to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: MovementType, amount: i64, method: Option<InstrumentType>) -> CashMovement {
        CashMovement {
            id: "m-1".to_string(),
            session_id: "s-1".to_string(),
            kind,
            amount: Money::from_units(amount),
            timestamp: Utc::now(),
            notes: String::new(),
            user_id: "u-1".to_string(),
            related_id: None,
            method,
        }
    }

    #[test]
    fn test_sign_table() {
        use MovementEffect::*;
        let expected = [
            (MovementType::Open, Credit),
            (MovementType::Sale, Credit),
            (MovementType::Deposit, Credit),
            (MovementType::Refund, Debit),
            (MovementType::Withdrawal, Debit),
            (MovementType::CloseZ, Debit),
            (MovementType::CutX, Informational),
            (MovementType::Audit, Informational),
        ];
        for (kind, effect) in expected {
            assert_eq!(kind.effect(), effect, "{}", kind);
        }
    }

    #[test]
    fn test_cash_delta_ignores_card_sales() {
        assert_eq!(movement(MovementType::Sale, 500, None).cash_delta().units(), 500);
        assert_eq!(
            movement(MovementType::Sale, 500, Some(InstrumentType::Card)).cash_delta(),
            Money::zero()
        );
        assert_eq!(movement(MovementType::Withdrawal, 200, None).cash_delta().units(), -200);
        assert_eq!(movement(MovementType::Audit, 900, None).cash_delta(), Money::zero());
    }

    #[test]
    fn test_order_item_discount_floors_at_zero() {
        let line = OrderItem::new("Limonada", Money::from_units(6_000), 2)
            .with_discount(Money::from_units(2_000));
        assert_eq!(line.line_total().units(), 10_000);

        let comped = OrderItem::new("Postre", Money::from_units(5_000), 1)
            .with_discount(Money::from_units(9_000));
        assert_eq!(comped.line_total(), Money::zero());
    }

    #[test]
    fn test_allocation_describe() {
        let card = PaymentAllocation::card(Money::from_units(10_000), Some("4242".into()), 350);
        assert_eq!(card.instrument(), InstrumentType::Card);
        assert_eq!(card.describe(), "Card payment ****4242");

        let wallet = PaymentAllocation::digital(
            Money::from_units(10_000),
            Some("Nequi".into()),
            Some("NQ-991".into()),
        );
        assert_eq!(wallet.describe(), "Digital payment via Nequi ref NQ-991");
    }

    #[test]
    fn test_movement_type_serializes_snake_case() {
        let json = serde_json::to_string(&MovementType::CloseZ).unwrap();
        assert_eq!(json, "\"close_z\"");
        assert_eq!(MovementType::CloseZ.to_string(), "CloseZ");
    }
}
