//! # Settlement Engine
//!
//! Order totals, split bills and multi-instrument payment, committed to the
//! drawer ledger as one all-or-nothing step.
//!
//! ## Settlement Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Order (subtotal + tax)                                                 │
//! │     │  set_tip_rate(10%)        total = subtotal + tax + tip           │
//! │     ▼                                                                   │
//! │  SettlementDraft ──► add / split / update / remove allocations         │
//! │     │                (pending, no ledger effect)                        │
//! │     ▼                                                                   │
//! │  confirm()                                                              │
//! │     ├── order already paid?          → AlreadySettled                   │
//! │     ├── session open?                → SessionNotOpen                   │
//! │     ├── Σ allocations == total?      → AllocationMismatch               │
//! │     └── all good: one Sale row per allocation, order → Paid            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every check runs before the first row is written, so a failed confirm
//! leaves both the ledger and the draft untouched.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::session::{NewMovement, SessionManager};
use crate::types::{
    CashMovement, InstrumentDetail, InstrumentType, MovementType, Order, OrderStatus,
    PaymentAllocation, TipRate,
};
use crate::validation::{validate_card_last4, validate_notes, validate_tip_bps, validate_user_id};
use crate::MAX_SPLIT_PARTS;

// =============================================================================
// Totals and Splits
// =============================================================================

/// Tip and grand total for an order at a given tip rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Totals {
    pub tip: Money,
    pub total: Money,
}

/// tip = round(subtotal × rate); total = subtotal + tax + tip.
///
/// ## Example
/// ```rust
/// use till_core::settlement::compute_totals;
/// use till_core::{Money, Order, TipRate};
///
/// let order = Order::new("order-1", Money::from_units(48_000), Money::from_units(4_800));
/// let totals = compute_totals(&order, TipRate::from_percent(10));
/// assert_eq!(totals.tip.units(), 4_800);
/// assert_eq!(totals.total.units(), 57_600);
/// ```
pub fn compute_totals(order: &Order, tip_rate: TipRate) -> Totals {
    let tip = order.subtotal.calculate_tip(tip_rate);
    Totals {
        tip,
        total: order.subtotal + order.tax + tip,
    }
}

/// Splits a total into `parts` shares that sum back exactly.
///
/// Every share is floor(total / parts); the last one absorbs the remainder.
///
/// ## Example
/// ```rust
/// use till_core::settlement::split_evenly;
/// use till_core::Money;
///
/// let shares = split_evenly(Money::from_units(57_601), 3).unwrap();
/// let units: Vec<i64> = shares.iter().map(|m| m.units()).collect();
/// assert_eq!(units, vec![19_200, 19_200, 19_201]);
/// ```
pub fn split_evenly(total: Money, parts: u32) -> CoreResult<Vec<Money>> {
    if !(2..=MAX_SPLIT_PARTS).contains(&parts) {
        return Err(CoreError::InvalidSplit { parts });
    }

    let n = i64::from(parts);
    let share = Money::from_units(total.units().div_euclid(n));
    let last = total - share * (n - 1);

    let mut shares = vec![share; (parts - 1) as usize];
    shares.push(last);
    Ok(shares)
}

/// Change owed back for a cash allocation: max(0, tendered − amount).
///
/// Non-cash allocations, and cash without a tendered amount, owe nothing.
pub fn change(allocation: &PaymentAllocation) -> Money {
    match allocation.detail {
        InstrumentDetail::Cash {
            tendered: Some(tendered),
        } => (tendered - allocation.amount).max(Money::zero()),
        _ => Money::zero(),
    }
}

// =============================================================================
// Draft
// =============================================================================

/// What `add_allocation` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// A new allocation for the remaining balance.
    Added(PaymentAllocation),
    /// Nothing left to allocate; no allocation was created.
    FullyCovered { remaining: Money },
}

/// Partial edit of a pending allocation. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPatch {
    pub amount: Option<Money>,
    /// Switching instrument resets the detail to a blank one.
    pub instrument: Option<InstrumentType>,
    pub detail: Option<InstrumentDetail>,
}

impl AllocationPatch {
    /// Patch that only changes the amount.
    pub fn amount(amount: Money) -> Self {
        AllocationPatch {
            amount: Some(amount),
            ..Default::default()
        }
    }

    /// Patch that only replaces the detail (and with it the instrument).
    pub fn detail(detail: InstrumentDetail) -> Self {
        AllocationPatch {
            detail: Some(detail),
            ..Default::default()
        }
    }
}

/// An order being paid, with its pending allocations.
///
/// Nothing here touches the ledger until [`SettlementDraft::confirm`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementDraft {
    order: Order,
    allocations: Vec<PaymentAllocation>,
}

impl SettlementDraft {
    /// Starts settling an order.
    pub fn new(order: Order) -> CoreResult<Self> {
        if order.is_paid() {
            return Err(CoreError::AlreadySettled(order.id));
        }
        let mut draft = SettlementDraft {
            order,
            allocations: Vec::new(),
        };
        draft.refresh_status();
        Ok(draft)
    }

    pub fn order(&self) -> &Order {
        &self.order
    }

    pub fn allocations(&self) -> &[PaymentAllocation] {
        &self.allocations
    }

    /// Σ pending allocation amounts.
    pub fn allocated(&self) -> Money {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// total − allocated. Negative when over-allocated.
    pub fn remaining(&self) -> Money {
        self.order.total - self.allocated()
    }

    /// Checks if the allocations cover the total exactly.
    pub fn is_balanced(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Total change owed back across cash allocations.
    pub fn change_due(&self) -> Money {
        self.allocations.iter().map(change).sum()
    }

    /// Applies a tip rate and recomputes the total.
    ///
    /// With exactly one allocation, that allocation follows the new total.
    pub fn set_tip_rate(&mut self, tip_rate: TipRate) -> CoreResult<Totals> {
        validate_tip_bps(tip_rate.bps())?;

        let totals = compute_totals(&self.order, tip_rate);
        self.order.tip_rate = tip_rate;
        self.order.tip = totals.tip;
        self.order.total = totals.total;

        if let [only] = self.allocations.as_mut_slice() {
            only.amount = totals.total;
        }
        self.refresh_status();
        Ok(totals)
    }

    /// Replaces all allocations with `parts` equal cash shares.
    pub fn split_evenly(&mut self, parts: u32) -> CoreResult<&[PaymentAllocation]> {
        let shares = split_evenly(self.order.total, parts)?;
        self.allocations = shares
            .into_iter()
            .map(|amount| PaymentAllocation::new(InstrumentType::Cash, amount))
            .collect();
        self.refresh_status();
        Ok(&self.allocations)
    }

    /// Adds a cash allocation for whatever is still owed.
    pub fn add_allocation(&mut self) -> AllocationOutcome {
        self.add_allocation_as(InstrumentType::Cash)
    }

    /// Adds an allocation of the given instrument for whatever is still owed.
    pub fn add_allocation_as(&mut self, instrument: InstrumentType) -> AllocationOutcome {
        let remaining = self.remaining();
        if !remaining.is_positive() {
            return AllocationOutcome::FullyCovered { remaining };
        }

        let allocation = PaymentAllocation::new(instrument, remaining);
        self.allocations.push(allocation.clone());
        self.refresh_status();
        AllocationOutcome::Added(allocation)
    }

    /// Adds a fully specified allocation (e.g. card with last-4).
    pub fn push_allocation(&mut self, allocation: PaymentAllocation) {
        self.allocations.push(allocation);
        self.refresh_status();
    }

    /// Drops a pending allocation.
    pub fn remove_allocation(&mut self, allocation_id: &str) -> CoreResult<PaymentAllocation> {
        let index = self.index_of(allocation_id)?;
        let removed = self.allocations.remove(index);
        self.refresh_status();
        Ok(removed)
    }

    /// Edits a pending allocation.
    pub fn update_allocation(
        &mut self,
        allocation_id: &str,
        patch: AllocationPatch,
    ) -> CoreResult<&PaymentAllocation> {
        let index = self.index_of(allocation_id)?;
        let allocation = &mut self.allocations[index];

        if let Some(amount) = patch.amount {
            allocation.amount = amount;
        }
        if let Some(instrument) = patch.instrument {
            if instrument != allocation.instrument() {
                allocation.detail = InstrumentDetail::blank(instrument);
            }
        }
        if let Some(detail) = patch.detail {
            allocation.detail = detail;
        }

        self.refresh_status();
        Ok(&self.allocations[index])
    }

    /// Commits the draft to the ledger. The draft itself is left as is, so a
    /// failed confirm can be corrected and retried.
    pub fn confirm(
        &self,
        manager: &mut SessionManager,
        session_id: &str,
        user_id: &str,
    ) -> CoreResult<Settlement> {
        confirm(manager, session_id, &self.order, &self.allocations, user_id)
    }

    fn index_of(&self, allocation_id: &str) -> CoreResult<usize> {
        self.allocations
            .iter()
            .position(|a| a.id == allocation_id)
            .ok_or_else(|| CoreError::AllocationNotFound(allocation_id.to_string()))
    }

    fn refresh_status(&mut self) {
        self.order.status = if self.allocated().is_positive() {
            OrderStatus::Partial
        } else {
            OrderStatus::Pending
        };
    }
}

// =============================================================================
// Confirm
// =============================================================================

/// A committed settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// The order, now Paid.
    pub order: Order,
    /// One Sale row per non-zero allocation, in allocation order.
    pub movements: Vec<CashMovement>,
    /// Change owed back in cash.
    pub change: Money,
}

/// Settles an order against the open session.
///
/// ## Errors
/// - [`CoreError::AlreadySettled`] if the order is Paid, or this drawer
///   already confirmed it
/// - [`CoreError::SessionNotOpen`] / [`CoreError::SessionNotFound`]
/// - [`CoreError::OrderTotalMismatch`] if total ≠ subtotal + tax + tip
/// - [`CoreError::NonPositiveAmount`] for a negative allocation
/// - [`CoreError::Validation`] for a bad card last-4 or an oversized note
/// - [`CoreError::AllocationMismatch`] if Σ allocations ≠ order total
///
/// Zero allocations are accepted and produce no row.
pub fn confirm(
    manager: &mut SessionManager,
    session_id: &str,
    order: &Order,
    allocations: &[PaymentAllocation],
    user_id: &str,
) -> CoreResult<Settlement> {
    if order.is_paid() || manager.is_settled(&order.id) {
        return Err(CoreError::AlreadySettled(order.id.clone()));
    }
    manager.require_open(session_id)?;
    validate_user_id(user_id)?;

    let expected = order.subtotal + order.tax + order.tip;
    if order.total != expected {
        return Err(CoreError::OrderTotalMismatch {
            order_id: order.id.clone(),
            expected,
            total: order.total,
        });
    }

    for allocation in allocations {
        if allocation.amount.is_negative() {
            return Err(CoreError::NonPositiveAmount {
                kind: MovementType::Sale,
                amount: allocation.amount,
            });
        }
        if let InstrumentDetail::Card {
            last4: Some(last4), ..
        } = &allocation.detail
        {
            validate_card_last4(last4)?;
        }
        validate_notes(&allocation.describe())?;
    }

    let actual: Money = allocations.iter().map(|a| a.amount).sum();
    if actual != order.total {
        return Err(CoreError::AllocationMismatch {
            expected: order.total,
            actual,
        });
    }

    // Validated: from here on nothing can fail.
    let now = manager.now();
    let movements = allocations
        .iter()
        .filter(|a| a.amount.is_positive())
        .map(|a| {
            let request = NewMovement::new(MovementType::Sale, a.amount, user_id)
                .notes(a.describe())
                .related_to(order.id.clone())
                .paid_by(a.instrument());
            manager.push(session_id, request, now)
        })
        .collect();

    manager.mark_settled(&order.id);

    let mut order = order.clone();
    order.status = OrderStatus::Paid;

    Ok(Settlement {
        order,
        movements,
        change: allocations.iter().map(change).sum(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denomination::{DenominationCount, DenominationSet};

    fn order() -> Order {
        // 48,000 + 4,800 tax; with 10% tip the total is 57,600
        Order::new("order-1", Money::from_units(48_000), Money::from_units(4_800))
    }

    fn open_drawer() -> (SessionManager, String) {
        let mut manager = SessionManager::new(DenominationSet::cop());
        let float = DenominationCount::new().with(50_000, 1);
        let session = manager.open("cashier-1", &float, None, None).unwrap();
        (manager, session.id)
    }

    #[test]
    fn test_compute_totals() {
        let totals = compute_totals(&order(), TipRate::from_percent(10));
        assert_eq!(totals.tip.units(), 4_800);
        assert_eq!(totals.total.units(), 57_600);

        let none = compute_totals(&order(), TipRate::zero());
        assert_eq!(none.total.units(), 52_800);
    }

    #[test]
    fn test_split_evenly_exact_and_remainder() {
        let even = split_evenly(Money::from_units(57_600), 3).unwrap();
        assert_eq!(even, vec![Money::from_units(19_200); 3]);

        let odd = split_evenly(Money::from_units(57_601), 3).unwrap();
        assert_eq!(odd.last().copied(), Some(Money::from_units(19_201)));
        assert_eq!(odd.iter().copied().sum::<Money>().units(), 57_601);
    }

    #[test]
    fn test_split_evenly_rejects_bad_parts() {
        assert_eq!(
            split_evenly(Money::from_units(100), 1),
            Err(CoreError::InvalidSplit { parts: 1 })
        );
        assert!(split_evenly(Money::from_units(100), MAX_SPLIT_PARTS + 1).is_err());
    }

    #[test]
    fn test_change() {
        let cash = PaymentAllocation::cash(Money::from_units(57_600), Some(Money::from_units(60_000)));
        assert_eq!(change(&cash).units(), 2_400);

        let short = PaymentAllocation::cash(Money::from_units(57_600), Some(Money::from_units(50_000)));
        assert_eq!(change(&short), Money::zero());

        let card = PaymentAllocation::card(Money::from_units(57_600), None, 0);
        assert_eq!(change(&card), Money::zero());
    }

    #[test]
    fn test_tip_change_resyncs_single_allocation() {
        let mut draft = SettlementDraft::new(order()).unwrap();
        assert!(matches!(draft.add_allocation(), AllocationOutcome::Added(_)));
        assert_eq!(draft.order().status, OrderStatus::Partial);

        draft.set_tip_rate(TipRate::from_percent(10)).unwrap();
        assert_eq!(draft.allocations()[0].amount.units(), 57_600);
        assert!(draft.is_balanced());
    }

    #[test]
    fn test_tip_change_leaves_split_alone() {
        let mut draft = SettlementDraft::new(order()).unwrap();
        draft.split_evenly(2).unwrap();
        draft.set_tip_rate(TipRate::from_percent(10)).unwrap();
        assert_eq!(draft.allocated().units(), 52_800);
        assert_eq!(draft.remaining().units(), 4_800);
    }

    #[test]
    fn test_add_allocation_when_covered() {
        let mut draft = SettlementDraft::new(order()).unwrap();
        draft.add_allocation();
        let outcome = draft.add_allocation_as(InstrumentType::Card);
        assert_eq!(outcome, AllocationOutcome::FullyCovered { remaining: Money::zero() });
        assert_eq!(draft.allocations().len(), 1);
    }

    #[test]
    fn test_update_and_remove_allocation() {
        let mut draft = SettlementDraft::new(order()).unwrap();
        let id = match draft.add_allocation() {
            AllocationOutcome::Added(a) => a.id,
            other => panic!("unexpected {:?}", other),
        };

        let patch = AllocationPatch {
            amount: Some(Money::from_units(20_000)),
            instrument: Some(InstrumentType::Card),
            detail: None,
        };
        let updated = draft.update_allocation(&id, patch).unwrap();
        assert_eq!(updated.instrument(), InstrumentType::Card);
        assert_eq!(updated.amount.units(), 20_000);

        assert_eq!(
            draft.update_allocation("nope", AllocationPatch::default()).unwrap_err(),
            CoreError::AllocationNotFound("nope".to_string())
        );

        draft.remove_allocation(&id).unwrap();
        assert!(draft.allocations().is_empty());
        assert_eq!(draft.order().status, OrderStatus::Pending);
    }

    #[test]
    fn test_confirm_mixed_instruments() {
        let (mut manager, session_id) = open_drawer();
        let mut draft = SettlementDraft::new(order()).unwrap();
        draft.set_tip_rate(TipRate::from_percent(10)).unwrap();
        draft.push_allocation(PaymentAllocation::cash(
            Money::from_units(20_000),
            Some(Money::from_units(25_000)),
        ));
        draft.push_allocation(PaymentAllocation::card(
            Money::from_units(30_000),
            Some("4242".to_string()),
            350,
        ));
        draft.push_allocation(PaymentAllocation::digital(
            Money::from_units(7_600),
            Some("Nequi".to_string()),
            None,
        ));

        let settlement = draft.confirm(&mut manager, &session_id, "cashier-1").unwrap();

        assert_eq!(settlement.order.status, OrderStatus::Paid);
        assert_eq!(settlement.movements.len(), 3);
        assert_eq!(settlement.change.units(), 5_000);
        assert!(settlement
            .movements
            .iter()
            .all(|m| m.related_id.as_deref() == Some("order-1")));
        // Only the cash share reaches the drawer
        assert_eq!(manager.balance(&session_id).units(), 70_000);

        let again = draft.confirm(&mut manager, &session_id, "cashier-1").unwrap_err();
        assert_eq!(again, CoreError::AlreadySettled("order-1".to_string()));
    }

    #[test]
    fn test_confirm_mismatch_writes_nothing() {
        let (mut manager, session_id) = open_drawer();
        let before = manager.ledger().len();

        let mut order = order();
        order.tip = Money::from_units(4_800);
        order.total = Money::from_units(57_600);
        let allocations = vec![PaymentAllocation::cash(Money::from_units(57_599), None)];

        let err = confirm(&mut manager, &session_id, &order, &allocations, "cashier-1").unwrap_err();
        assert_eq!(
            err,
            CoreError::AllocationMismatch {
                expected: Money::from_units(57_600),
                actual: Money::from_units(57_599),
            }
        );
        assert_eq!(manager.ledger().len(), before);
    }

    #[test]
    fn test_confirm_rejects_bad_last4_before_writing() {
        let (mut manager, session_id) = open_drawer();
        let order = order();
        let allocations = vec![PaymentAllocation::card(order.total, Some("42".to_string()), 0)];

        assert!(confirm(&mut manager, &session_id, &order, &allocations, "cashier-1").is_err());
        assert_eq!(manager.ledger().len(), 1);
    }

    #[test]
    fn test_confirm_skips_zero_allocations() {
        let (mut manager, session_id) = open_drawer();
        let order = order();
        let allocations = vec![
            PaymentAllocation::cash(order.total, None),
            PaymentAllocation::new(InstrumentType::Card, Money::zero()),
        ];
        let settlement = confirm(&mut manager, &session_id, &order, &allocations, "cashier-1").unwrap();
        assert_eq!(settlement.movements.len(), 1);
    }

    #[test]
    fn test_confirm_requires_open_session() {
        let (mut manager, session_id) = open_drawer();
        manager
            .close_z(&session_id, &DenominationCount::new().with(50_000, 1), "cashier-1")
            .unwrap();
        let order = order();
        let allocations = vec![PaymentAllocation::cash(order.total, None)];
        let err = confirm(&mut manager, &session_id, &order, &allocations, "cashier-1").unwrap_err();
        assert_eq!(err, CoreError::SessionNotOpen(session_id));
    }

    #[test]
    fn test_draft_rejects_paid_order() {
        let mut paid = order();
        paid.status = OrderStatus::Paid;
        assert_eq!(
            SettlementDraft::new(paid).unwrap_err(),
            CoreError::AlreadySettled("order-1".to_string())
        );
    }
    #[test]
    fn test_confirm_rejects_stale_total() {
        let (mut manager, session_id) = open_drawer();
        let mut stale = order();
        stale.total = Money::from_units(1);
        let allocations = vec![PaymentAllocation::cash(Money::from_units(1), None)];

        let err = confirm(&mut manager, &session_id, &stale, &allocations, "cashier-1").unwrap_err();
        assert_eq!(
            err,
            CoreError::OrderTotalMismatch {
                order_id: "order-1".to_string(),
                expected: Money::from_units(52_800),
                total: Money::from_units(1),
            }
        );
        assert_eq!(manager.ledger().len(), 1);
        assert!(!manager.is_settled("order-1"));
    }

    #[test]
    fn test_zero_total_order_settles_once() {
        let (mut manager, session_id) = open_drawer();
        let comped = Order::new("comped", Money::zero(), Money::zero());

        let settlement = confirm(&mut manager, &session_id, &comped, &[], "cashier-1").unwrap();
        assert!(settlement.movements.is_empty());
        assert!(settlement.order.is_paid());
        assert!(manager.is_settled("comped"));

        let err = confirm(&mut manager, &session_id, &comped, &[], "cashier-1").unwrap_err();
        assert_eq!(err, CoreError::AlreadySettled("comped".to_string()));
        assert_eq!(manager.ledger().len(), 1);
    }

    #[test]
    fn test_settled_orders_survive_restore() {
        let (mut manager, session_id) = open_drawer();
        let comped = Order::new("comped", Money::zero(), Money::zero());
        confirm(&mut manager, &session_id, &comped, &[], "cashier-1").unwrap();

        let snapshot = manager.snapshot();
        assert!(snapshot.settled_orders.contains("comped"));

        let mut restored =
            SessionManager::restore(DenominationSet::cop(), snapshot, std::sync::Arc::new(chrono::Utc::now)).unwrap();
        let err = confirm(&mut restored, &session_id, &comped, &[], "cashier-1").unwrap_err();
        assert_eq!(err, CoreError::AlreadySettled("comped".to_string()));
    }

    #[test]
    fn test_confirm_rejects_oversized_digital_reference() {
        let (mut manager, session_id) = open_drawer();
        let order = order();
        let allocations = vec![PaymentAllocation::digital(
            order.total,
            Some("Nequi".to_string()),
            Some("x".repeat(2_000)),
        )];

        let err = confirm(&mut manager, &session_id, &order, &allocations, "cashier-1").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(manager.ledger().len(), 1);
    }
}
