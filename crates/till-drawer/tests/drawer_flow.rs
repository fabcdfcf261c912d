//! End-to-end drawer flows with recording collaborators.

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use till_core::denomination::DenominationCount;
use till_core::ledger::MovementFilter;
use till_core::settlement::AllocationPatch;
use till_core::{
    CashMovement, CashSession, CoreError, InstrumentDetail, Money, MovementType, Order,
    PaymentAllocation, TipRate,
};
use till_drawer::{
    ApiError, CollaboratorError, CollaboratorResult, Drawer, DrawerConfig, DrawerError, ErrorCode,
    Journal, ReportPrinter, TableService,
};

// =============================================================================
// Helpers
// =============================================================================

#[derive(Default)]
struct Recorder {
    movements: Mutex<Vec<CashMovement>>,
    sessions: Mutex<Vec<CashSession>>,
    tickets: Mutex<Vec<String>>,
    released: Mutex<Vec<(String, String)>>,
}

impl Journal for Recorder {
    fn record_movement(&self, movement: &CashMovement) -> CollaboratorResult {
        self.movements.lock().unwrap().push(movement.clone());
        Ok(())
    }

    fn record_session(&self, session: &CashSession) -> CollaboratorResult {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(())
    }
}

impl ReportPrinter for Recorder {
    fn print(&self, ticket: &str) -> CollaboratorResult {
        self.tickets.lock().unwrap().push(ticket.to_string());
        Ok(())
    }
}

impl TableService for Recorder {
    fn release_table(&self, table_ref: &str, order_id: &str) -> CollaboratorResult {
        self.released
            .lock()
            .unwrap()
            .push((table_ref.to_string(), order_id.to_string()));
        Ok(())
    }
}

struct OfflineTables;

impl TableService for OfflineTables {
    fn release_table(&self, _table_ref: &str, _order_id: &str) -> CollaboratorResult {
        Err(CollaboratorError("table service unreachable".to_string()))
    }
}

fn config() -> DrawerConfig {
    let mut config = DrawerConfig::default();
    config.device.id = "register-test".to_string();
    config
}

fn recorded_drawer() -> (Drawer, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let drawer = Drawer::builder(config())
        .with_journal(recorder.clone())
        .with_printer(recorder.clone())
        .with_tables(recorder.clone())
        .build()
        .unwrap();
    (drawer, recorder)
}

/// 100,000 float: two 50,000 bills.
fn float() -> DenominationCount {
    DenominationCount::new().with(50_000, 2)
}

/// 50,000 subtotal, no tax, 10% tip, at table T7: 55,000 once totalled.
fn table_order(id: &str) -> Order {
    let mut order = Order::new(id, Money::from_units(50_000), Money::zero()).at_table("T7");
    order.tip_rate = TipRate::from_percent(10);
    order
}

// =============================================================================
// Shift Lifecycle
// =============================================================================

#[tokio::test]
async fn test_open_shift_uses_device_and_journals() {
    let (drawer, recorder) = recorded_drawer();

    let session = drawer.open_shift("cashier-1", &float(), Some("sup-1")).await.unwrap();

    assert_eq!(session.device_id.as_deref(), Some("register-test"));
    assert_eq!(session.opening_amount.units(), 100_000);
    assert_eq!(drawer.balance().await.unwrap().units(), 100_000);

    assert_eq!(recorder.sessions.lock().unwrap().len(), 1);
    let movements = recorder.movements.lock().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].kind, MovementType::Open);
}

#[tokio::test]
async fn test_second_open_is_rejected() {
    let (drawer, _) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    let err = drawer.open_shift("cashier-2", &float(), None).await.unwrap_err();
    assert!(matches!(
        err,
        DrawerError::Core(CoreError::SessionAlreadyOpen { .. })
    ));
    assert_eq!(ApiError::from(err).code, ErrorCode::SessionState);
}

#[tokio::test]
async fn test_operations_need_an_open_shift() {
    let (drawer, _) = recorded_drawer();

    assert!(drawer.current_session().await.is_none());
    assert!(matches!(drawer.balance().await, Err(DrawerError::NoOpenSession)));

    let err = drawer
        .record_withdrawal(Money::from_units(1_000), "cashier-1", "Ice")
        .await
        .unwrap_err();
    assert!(matches!(err, DrawerError::NoOpenSession));
    assert_eq!(ApiError::from(err).code, ErrorCode::SessionState);
}

#[tokio::test]
async fn test_close_shift_prints_z_ticket() {
    let (drawer, recorder) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();
    drawer
        .record_withdrawal(Money::from_units(20_000), "cashier-1", "Bank drop")
        .await
        .unwrap();

    let count = DenominationCount::new().with(50_000, 1).with(20_000, 1).with(10_000, 1);
    let outcome = drawer.close_shift(&count, "cashier-1").await.unwrap();

    assert!(outcome.discrepancy.is_zero());
    assert_eq!(outcome.report.expected.units(), 80_000);
    assert!(outcome.session.closed_at.is_some());
    assert!(drawer.current_session().await.is_none());

    let tickets = recorder.tickets.lock().unwrap();
    assert_eq!(tickets.len(), 1);
    assert!(tickets[0].contains("CloseZ"));
    assert!(tickets[0].contains("Expected"));

    // Opened and closed
    assert_eq!(recorder.sessions.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_close_with_short_drawer_is_reported() {
    let (drawer, _) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    let count = DenominationCount::new().with(50_000, 1).with(20_000, 2);
    let outcome = drawer.close_shift(&count, "cashier-1").await.unwrap();

    assert_eq!(outcome.discrepancy.units(), -10_000);
    assert_eq!(drawer.format(outcome.discrepancy), "-$10,000");

    let err = drawer.close_shift(&count, "cashier-1").await.unwrap_err();
    assert!(matches!(err, DrawerError::NoOpenSession));
}

#[tokio::test]
async fn test_cut_x_and_audit_print_without_closing() {
    let (drawer, recorder) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    let cut = drawer.cut_x(None, "cashier-1").await.unwrap();
    assert_eq!(cut.report.expected.units(), 100_000);
    assert!(cut.report.discrepancy.is_none());

    let short = DenominationCount::new().with(50_000, 1).with(20_000, 2);
    let audit = drawer.audit(&short, "sup-1").await.unwrap();
    assert_eq!(audit.report.discrepancy.map(|d| d.units()), Some(-10_000));

    assert!(drawer.current_session().await.is_some());
    assert_eq!(drawer.balance().await.unwrap().units(), 100_000);
    assert_eq!(recorder.tickets.lock().unwrap().len(), 2);
}

// =============================================================================
// Cash Movements
// =============================================================================

#[tokio::test]
async fn test_withdrawal_over_balance_maps_to_insufficient_cash() {
    let (drawer, _) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    let err = drawer
        .record_withdrawal(Money::from_units(150_000), "cashier-1", "Rent")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DrawerError::Core(CoreError::WithdrawalExceedsBalance { .. })
    ));
    assert_eq!(ApiError::from(err).code, ErrorCode::InsufficientCash);
    assert_eq!(drawer.balance().await.unwrap().units(), 100_000);
}

#[tokio::test]
async fn test_history_filters_and_exports_csv() {
    let (drawer, _) = recorded_drawer();
    let session = drawer.open_shift("cashier-1", &float(), None).await.unwrap();
    drawer
        .record_deposit(Money::from_units(10_000), "cashier-1", "Change top-up")
        .await
        .unwrap();
    drawer
        .record_withdrawal(Money::from_units(5_000), "cashier-1", "Ice for the bar")
        .await
        .unwrap();

    let deposits = drawer
        .history(None, &MovementFilter::all().of_kind(MovementType::Deposit))
        .await
        .unwrap();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].notes, "Change top-up");

    let ice = drawer
        .history(Some(&session.id), &MovementFilter::all().search("  ICE "))
        .await
        .unwrap();
    assert_eq!(ice.len(), 1);
    assert_eq!(ice[0].kind, MovementType::Withdrawal);

    let too_long = MovementFilter::all().search("x".repeat(101));
    let err = drawer.history(None, &too_long).await.unwrap_err();
    assert_eq!(ApiError::from(err).code, ErrorCode::ValidationError);

    let csv = drawer.export_history_csv(&session.id).await.unwrap();
    assert_eq!(csv.lines().count(), 4);
    assert!(csv.contains("Ice for the bar"));
}

#[tokio::test]
async fn test_export_of_unknown_session_is_not_found() {
    let (drawer, _) = recorded_drawer();

    let err = drawer.export_history_csv("missing").await.unwrap_err();
    assert_eq!(ApiError::from(err).code, ErrorCode::NotFound);
}

// =============================================================================
// Settlements
// =============================================================================

#[tokio::test]
async fn test_split_settlement_releases_table() {
    let (drawer, recorder) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    let draft = drawer.begin_settlement(table_order("order-7")).await.unwrap();
    assert_eq!(draft.order().tip.units(), 5_000);
    assert_eq!(draft.order().total.units(), 55_000);

    let shares = drawer.split_settlement("order-7", 2).await.unwrap();
    assert_eq!(shares.len(), 2);
    let card_id = shares[1].id.clone();
    drawer
        .with_draft_mut("order-7", |d| {
            d.update_allocation(
                &card_id,
                AllocationPatch::detail(InstrumentDetail::Card {
                    last4: Some("4242".to_string()),
                    fee_bps: 350,
                }),
            )
            .map(|a| a.amount)
        })
        .await
        .unwrap();

    let settlement = drawer.confirm_settlement("order-7", "cashier-1").await.unwrap();
    assert_eq!(settlement.movements.len(), 2);
    assert!(settlement.order.is_paid());

    // Only the cash half lands in the drawer
    assert_eq!(drawer.balance().await.unwrap().units(), 127_500);
    let summary = drawer.summary().await.unwrap();
    assert_eq!(summary.by_sales_method.card.units(), 27_500);

    assert_eq!(
        *recorder.released.lock().unwrap(),
        vec![("T7".to_string(), "order-7".to_string())]
    );
    // Open + two Sale rows
    assert_eq!(recorder.movements.lock().unwrap().len(), 3);

    let err = drawer.draft("order-7").await.unwrap_err();
    assert!(matches!(err, DrawerError::DraftNotFound(_)));
}

#[tokio::test]
async fn test_table_failure_keeps_the_sale() {
    let drawer = Drawer::builder(config())
        .with_tables(Arc::new(OfflineTables))
        .build()
        .unwrap();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    drawer.begin_settlement(table_order("order-8")).await.unwrap();
    drawer
        .with_draft_mut("order-8", |d| {
            d.add_allocation();
            Ok(())
        })
        .await
        .unwrap();

    let settlement = drawer.confirm_settlement("order-8", "cashier-1").await.unwrap();
    assert_eq!(settlement.movements.len(), 1);
    assert_eq!(drawer.balance().await.unwrap().units(), 155_000);
}

#[tokio::test]
async fn test_mismatched_settlement_stays_pending() {
    let (drawer, recorder) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();

    drawer.begin_settlement(table_order("order-9")).await.unwrap();
    drawer
        .with_draft_mut("order-9", |d| {
            d.push_allocation(PaymentAllocation::cash(Money::from_units(30_000), None));
            Ok(())
        })
        .await
        .unwrap();

    let err = drawer.confirm_settlement("order-9", "cashier-1").await.unwrap_err();
    assert!(matches!(
        err,
        DrawerError::Core(CoreError::AllocationMismatch { .. })
    ));
    assert_eq!(ApiError::from(err).code, ErrorCode::PaymentError);

    // Draft survives, ledger and table untouched
    let draft = drawer.draft("order-9").await.unwrap();
    assert_eq!(draft.remaining().units(), 25_000);
    assert_eq!(drawer.balance().await.unwrap().units(), 100_000);
    assert!(recorder.released.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_split_limit_comes_from_config() {
    let (drawer, _) = recorded_drawer();
    drawer.begin_settlement(table_order("order-10")).await.unwrap();

    let err = drawer.split_settlement("order-10", 21).await.unwrap_err();
    assert!(matches!(err, DrawerError::SplitLimit { parts: 21, max: 20 }));
    assert_eq!(ApiError::from(err).code, ErrorCode::ValidationError);

    let err = drawer.split_settlement("order-10", 1).await.unwrap_err();
    assert!(matches!(err, DrawerError::Core(CoreError::InvalidSplit { parts: 1 })));
}

#[tokio::test]
async fn test_one_draft_per_order() {
    let (drawer, _) = recorded_drawer();

    drawer.begin_settlement(table_order("order-11")).await.unwrap();
    let err = drawer.begin_settlement(table_order("order-11")).await.unwrap_err();
    assert!(matches!(err, DrawerError::DraftInProgress(_)));

    drawer.discard_settlement("order-11").await.unwrap();
    let err = drawer.discard_settlement("order-11").await.unwrap_err();
    assert_eq!(ApiError::from(err).code, ErrorCode::NotFound);
}

#[tokio::test]
async fn test_declined_tip_is_kept() {
    let (drawer, _) = recorded_drawer();
    let order = Order::new("order-13", Money::from_units(48_000), Money::from_units(4_800));

    let draft = drawer.begin_settlement(order).await.unwrap();
    assert_eq!(draft.order().tip_rate, TipRate::zero());
    assert_eq!(draft.order().tip, Money::zero());
    assert_eq!(draft.order().total.units(), 52_800);
}

#[tokio::test]
async fn test_custom_tip_is_recomputed_from_lines() {
    let (drawer, _) = recorded_drawer();
    let mut order = Order::new("order-14", Money::from_units(48_000), Money::from_units(4_800));
    order.tip_rate = TipRate::from_percent(15);
    // Stale total from the ordering side
    order.total = Money::from_units(1);

    let draft = drawer.begin_settlement(order).await.unwrap();
    assert_eq!(draft.order().tip.units(), 7_200);
    assert_eq!(draft.order().total.units(), 60_000);
}

#[tokio::test]
async fn test_default_tip_only_on_request() {
    let (drawer, _) = recorded_drawer();
    let order = Order::new("order-15", Money::from_units(48_000), Money::from_units(4_800));
    drawer.begin_settlement(order).await.unwrap();

    let totals = drawer.apply_default_tip("order-15").await.unwrap();
    assert_eq!(totals.tip.units(), 4_800);
    assert_eq!(totals.total.units(), 57_600);
    assert_eq!(drawer.draft("order-15").await.unwrap().order().total.units(), 57_600);

    let err = drawer.apply_default_tip("missing").await.unwrap_err();
    assert!(matches!(err, DrawerError::DraftNotFound(_)));
}

#[tokio::test]
async fn test_comped_order_settles_once() {
    let (drawer, _) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();
    let comped = Order::new("comped", Money::zero(), Money::zero());

    drawer.begin_settlement(comped.clone()).await.unwrap();
    let settlement = drawer.confirm_settlement("comped", "cashier-1").await.unwrap();
    assert!(settlement.movements.is_empty());

    drawer.begin_settlement(comped).await.unwrap();
    let err = drawer.confirm_settlement("comped", "cashier-1").await.unwrap_err();
    assert!(matches!(err, DrawerError::Core(CoreError::AlreadySettled(_))));
    assert_eq!(ApiError::from(err).code, ErrorCode::PaymentError);
    assert!(drawer.snapshot().await.settled_orders.contains("comped"));
}

#[tokio::test]
async fn test_close_shift_discards_pending_drafts() {
    let (drawer, _) = recorded_drawer();
    drawer.open_shift("cashier-1", &float(), None).await.unwrap();
    drawer.begin_settlement(table_order("order-16")).await.unwrap();

    drawer.close_shift(&float(), "cashier-1").await.unwrap();
    let err = drawer.draft("order-16").await.unwrap_err();
    assert!(matches!(err, DrawerError::DraftNotFound(_)));

    // The next shift starts without it; the order is begun again from scratch
    drawer.open_shift("cashier-2", &float(), None).await.unwrap();
    let err = drawer.confirm_settlement("order-16", "cashier-2").await.unwrap_err();
    assert!(matches!(err, DrawerError::DraftNotFound(_)));
    drawer.begin_settlement(table_order("order-16")).await.unwrap();
}

#[tokio::test]
async fn test_confirm_without_shift_keeps_draft() {
    let (drawer, _) = recorded_drawer();
    drawer.begin_settlement(table_order("order-12")).await.unwrap();

    let err = drawer.confirm_settlement("order-12", "cashier-1").await.unwrap_err();
    assert!(matches!(err, DrawerError::NoOpenSession));
    assert!(drawer.draft("order-12").await.is_ok());
}

// =============================================================================
// Builder
// =============================================================================

#[tokio::test]
async fn test_restore_from_snapshot() {
    let (drawer, _) = recorded_drawer();
    let session = drawer.open_shift("cashier-1", &float(), None).await.unwrap();
    drawer
        .record_deposit(Money::from_units(10_000), "cashier-1", "Top-up")
        .await
        .unwrap();
    let snapshot = drawer.snapshot().await;

    let restored = Drawer::builder(config()).with_snapshot(snapshot).build().unwrap();

    let current = restored.current_session().await.unwrap();
    assert_eq!(current.id, session.id);
    assert_eq!(restored.balance().await.unwrap().units(), 110_000);

    let err = restored.open_shift("cashier-2", &float(), None).await.unwrap_err();
    assert!(matches!(
        err,
        DrawerError::Core(CoreError::SessionAlreadyOpen { .. })
    ));
}

#[tokio::test]
async fn test_injected_clock_stamps_rows() {
    let fixed = Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap();
    let drawer = Drawer::builder(config())
        .with_clock(Arc::new(move || fixed))
        .build()
        .unwrap();

    let session = drawer.open_shift("cashier-1", &float(), None).await.unwrap();
    assert_eq!(session.opened_at, fixed);

    let row = drawer
        .record_deposit(Money::from_units(1_000), "cashier-1", "Coins")
        .await
        .unwrap();
    assert_eq!(row.timestamp, fixed);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_at_build() {
    let mut bad = config();
    bad.currency.code = "pesos".to_string();

    let Err(err) = Drawer::new(bad) else {
        panic!("lowercase currency code must be rejected");
    };
    assert!(err.is_config_error());
    assert_eq!(ApiError::from(err).code, ErrorCode::ConfigError);
}
