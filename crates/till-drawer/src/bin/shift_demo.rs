//! # Shift Demo
//!
//! Runs one full drawer shift against the configured currency and prints
//! the X and Z tickets plus the CSV history.
//!
//! ## Usage
//! ```bash
//! # Defaults (COP drawer, 10% tip)
//! cargo run -p till-drawer --bin shift-demo
//!
//! # Custom config file
//! cargo run -p till-drawer --bin shift-demo -- --config ./till.toml
//!
//! # Snapshot as JSON instead of CSV
//! cargo run -p till-drawer --bin shift-demo -- --json
//! ```

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use till_core::denomination::DenominationCount;
use till_core::settlement::AllocationPatch;
use till_core::{InstrumentDetail, InstrumentType, Money, Order, OrderItem, TaxRate};
use till_drawer::{
    init_tracing, CollaboratorResult, Drawer, DrawerConfig, ReportPrinter, TableService,
};
use tracing::info;

/// Prints tickets to stdout.
struct StdoutPrinter;

impl ReportPrinter for StdoutPrinter {
    fn print(&self, ticket: &str) -> CollaboratorResult {
        println!("{}", ticket);
        Ok(())
    }
}

/// Logs released tables.
struct LoggingTables;

impl TableService for LoggingTables {
    fn release_table(&self, table_ref: &str, order_id: &str) -> CollaboratorResult {
        info!(table_ref, order_id, "Table released");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut as_json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--json" => as_json = true,
            "--help" | "-h" => {
                println!("Till shift demo");
                println!();
                println!("Usage: shift-demo [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --config <PATH>  Drawer config file (default: platform config dir)");
                println!("      --json           Print the ledger snapshot as JSON");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = DrawerConfig::load(config_path)?;
    info!(device_id = config.device_id(), currency = %config.currency.code, "Drawer config loaded");

    let drawer = Drawer::builder(config)
        .with_printer(Arc::new(StdoutPrinter))
        .with_tables(Arc::new(LoggingTables))
        .build()?;

    // Open with one of each of the two largest bills
    let set = drawer.config().denomination_set()?;
    let float = set
        .bills
        .iter()
        .take(2)
        .fold(DenominationCount::new(), |count, face| count.with(*face, 1));
    let session = drawer.open_shift("cashier-1", &float, Some("supervisor-1")).await?;
    println!("Opened shift {} with {}", session.id, drawer.format(session.opening_amount));

    // Table 4: two mains and a drink, split three ways, one guest by card
    let unit = set.bills.last().copied().unwrap_or(1);
    let order = Order::from_items(
        "order-1",
        Some("T4".to_string()),
        vec![
            OrderItem::new("Main course", Money::from_units(unit * 6), 2),
            OrderItem::new("Lemonade", Money::from_units(unit * 2), 1),
        ],
        TaxRate::from_bps(800),
    );
    let draft = drawer.begin_settlement(order).await?;
    // Guests accepted the house tip
    let totals = drawer.apply_default_tip("order-1").await?;
    println!(
        "Order {} total {} (tip {})",
        draft.order().id,
        drawer.format(totals.total),
        drawer.format(totals.tip)
    );

    let shares = drawer.split_settlement("order-1", 3).await?;
    let patch = AllocationPatch::detail(InstrumentDetail::Card {
        last4: Some("4242".to_string()),
        fee_bps: 350,
    });
    drawer
        .with_draft_mut("order-1", |d| d.update_allocation(&shares[1].id, patch).map(|_| ()))
        .await?;
    let settlement = drawer.confirm_settlement("order-1", "cashier-1").await?;
    println!("Settled with {} payments", settlement.movements.len());

    drawer
        .record_withdrawal(Money::from_units(unit), "cashier-1", "Ice for the bar")
        .await?;
    drawer
        .record_refund(
            Money::from_units(unit),
            InstrumentType::Card,
            "cashier-1",
            "Cold soup",
            Some("order-1"),
        )
        .await?;

    let cut = drawer.cut_x(None, "cashier-1").await?;
    let summary = drawer.summary().await?;
    println!(
        "Cash in drawer {}, card {}, digital {}",
        drawer.format(summary.cash_balance),
        drawer.format(summary.by_sales_method.card),
        drawer.format(summary.by_sales_method.digital)
    );

    // Count back exactly what the ledger expects, plus one coin too many
    let mut closing = DenominationCount::new().with_other(cut.report.expected);
    if let Some(coin) = set.coins.last() {
        closing = closing.with(*coin, 1);
    }
    let outcome = drawer.close_shift(&closing, "cashier-1").await?;
    println!("Z close discrepancy: {}", drawer.format(outcome.discrepancy));

    if as_json {
        println!("{}", serde_json::to_string_pretty(&drawer.snapshot().await)?);
    } else {
        print!("{}", drawer.export_history_csv(&session.id).await?);
    }

    Ok(())
}
