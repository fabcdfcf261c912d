//! Property tests for ledger conservation and settlement exactness.

use proptest::prelude::*;

use till_core::denomination::{DenominationCount, DenominationSet};
use till_core::session::SessionManager;
use till_core::settlement::{confirm, split_evenly};
use till_core::{CoreError, Money, MovementType, Order, PaymentAllocation, MAX_SPLIT_PARTS};

#[derive(Debug, Clone, Copy)]
enum Op {
    Sale(i64),
    Deposit(i64),
    Withdrawal(i64),
    Refund(i64),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..200_000).prop_map(Op::Sale),
        (1i64..50_000).prop_map(Op::Deposit),
        (1i64..300_000).prop_map(Op::Withdrawal),
        (1i64..100_000).prop_map(Op::Refund),
    ]
}

proptest! {
    /// balance == opening + sales + deposits − withdrawals − refunds, over
    /// accepted rows only, and never negative.
    #[test]
    fn balance_is_conserved(bills in 0i64..20, ops in prop::collection::vec(op(), 0..40)) {
        let mut drawer = SessionManager::new(DenominationSet::cop());
        let float = DenominationCount::new().with(10_000, bills);
        let session = drawer.open("cashier-1", &float, None, None).unwrap();

        let mut expected = bills * 10_000;
        for op in ops {
            let (kind, amount, sign) = match op {
                Op::Sale(a) => (MovementType::Sale, a, 1),
                Op::Deposit(a) => (MovementType::Deposit, a, 1),
                Op::Withdrawal(a) => (MovementType::Withdrawal, a, -1),
                Op::Refund(a) => (MovementType::Refund, a, -1),
            };
            let result = drawer.append(&session.id, kind, Money::from_units(amount), "cashier-1", "", None);
            match result {
                Ok(_) => expected += sign * amount,
                Err(CoreError::WithdrawalExceedsBalance { available, .. }) => {
                    prop_assert!(sign < 0);
                    prop_assert!(amount > available.units());
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
            prop_assert_eq!(drawer.balance(&session.id).units(), expected);
            prop_assert!(expected >= 0);
        }
    }

    #[test]
    fn split_shares_sum_to_total(total in 0i64..10_000_000, parts in 2u32..=MAX_SPLIT_PARTS) {
        let shares = split_evenly(Money::from_units(total), parts).unwrap();
        prop_assert_eq!(shares.len(), parts as usize);
        prop_assert_eq!(shares.iter().copied().sum::<Money>().units(), total);

        let first = shares[0];
        prop_assert!(shares[..shares.len() - 1].iter().all(|s| *s == first));
        prop_assert!(shares[shares.len() - 1] >= first);
    }

    /// Confirm succeeds iff allocations sum exactly to the total.
    #[test]
    fn settlement_is_exact(total in 2i64..1_000_000, cash_share in 0i64..1_000_000, delta in -1i64..=1) {
        let cash_share = cash_share.min(total - 1);
        let mut drawer = SessionManager::new(DenominationSet::cop());
        let session = drawer.open("cashier-1", &DenominationCount::new(), None, None).unwrap();

        let order = Order::new("order-1", Money::from_units(total), Money::zero());
        let allocations = vec![
            PaymentAllocation::cash(Money::from_units(cash_share), None),
            PaymentAllocation::card(Money::from_units(total - cash_share + delta), None, 0),
        ];

        let rows_before = drawer.ledger().len();
        let result = confirm(&mut drawer, &session.id, &order, &allocations, "cashier-1");
        if delta == 0 {
            prop_assert!(result.is_ok());
            prop_assert_eq!(drawer.balance(&session.id).units(), cash_share);
        } else {
            let is_mismatch = matches!(result, Err(CoreError::AllocationMismatch { .. }));
            prop_assert!(is_mismatch);
            prop_assert_eq!(drawer.ledger().len(), rows_before);
        }
    }
}
