//! # till-drawer: Drawer Orchestration for Till
//!
//! Puts the pure `till-core` logic behind a single-writer async lock and
//! wires it to configuration, logging and the outside collaborators.
//!
//! ## Module Organization
//! ```text
//! till_drawer/
//! ├── lib.rs            ◄─── You are here (exports, tracing setup)
//! ├── config.rs         ◄─── till.toml + TILL_* environment overrides
//! ├── drawer.rs         ◄─── Drawer + DrawerBuilder (tokio Mutex)
//! ├── collaborators.rs  ◄─── TableService / Journal / ReportPrinter ports
//! └── error.rs          ◄─── DrawerError and the UI-facing ApiError
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use till_drawer::{Drawer, DrawerConfig};
//! use till_core::denomination::DenominationCount;
//!
//! # async fn run() -> till_drawer::DrawerResult<()> {
//! let drawer = Drawer::new(DrawerConfig::load_or_default(None))?;
//! let float = DenominationCount::new().with(50_000, 2);
//! let session = drawer.open_shift("cashier-1", &float, None).await?;
//! println!("opened {} with {}", session.id, drawer.format(session.opening_amount));
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod config;
pub mod drawer;
pub mod error;

pub use collaborators::{
    CollaboratorError, CollaboratorResult, Collaborators, Journal, NoOpCollaborator, ReportPrinter,
    TableService,
};
pub use config::DrawerConfig;
pub use drawer::{Drawer, DrawerBuilder};
pub use error::{ApiError, DrawerError, DrawerResult, ErrorCode};

use tracing_subscriber::EnvFilter;

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=till_drawer=trace` - Show trace for the drawer only
/// - Default: INFO, DEBUG for till crates
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,till=debug"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
