//! # Collaborator Ports
//!
//! Outbound hooks the drawer calls after a change has been committed:
//! releasing a table once its order is paid, journaling movements for
//! persistence, and printing X/Z/audit tickets.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Drawer::confirm_settlement                                             │
//! │     │                                                                   │
//! │     ├── lock ─► till-core confirm ─► unlock        (commit)            │
//! │     │                                                                   │
//! │     ├── Journal::record_movement   (each Sale row)                      │
//! │     └── TableService::release_table                                     │
//! │              │                                                          │
//! │              └── Err ─► warn!, ledger stays committed                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use till_core::{CashMovement, CashSession};

/// Failure reported by a collaborator. Logged, never propagated.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct CollaboratorError(pub String);

/// Result type alias for collaborator calls.
pub type CollaboratorResult = Result<(), CollaboratorError>;

/// Table/ticket management owned by the ordering side.
pub trait TableService: Send + Sync {
    /// Frees the table once its order is settled.
    fn release_table(&self, table_ref: &str, order_id: &str) -> CollaboratorResult;
}

/// Persistence sink for committed drawer state.
pub trait Journal: Send + Sync {
    /// A movement was appended to the ledger.
    fn record_movement(&self, movement: &CashMovement) -> CollaboratorResult;

    /// A session was opened or closed.
    fn record_session(&self, session: &CashSession) -> CollaboratorResult;
}

/// Ticket printer.
pub trait ReportPrinter: Send + Sync {
    fn print(&self, ticket: &str) -> CollaboratorResult;
}

/// No-op collaborator for tests and headless use.
pub struct NoOpCollaborator;

impl TableService for NoOpCollaborator {
    fn release_table(&self, _table_ref: &str, _order_id: &str) -> CollaboratorResult {
        Ok(())
    }
}

impl Journal for NoOpCollaborator {
    fn record_movement(&self, _movement: &CashMovement) -> CollaboratorResult {
        Ok(())
    }

    fn record_session(&self, _session: &CashSession) -> CollaboratorResult {
        Ok(())
    }
}

impl ReportPrinter for NoOpCollaborator {
    fn print(&self, _ticket: &str) -> CollaboratorResult {
        Ok(())
    }
}

/// The full set of ports a drawer talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub tables: Arc<dyn TableService>,
    pub journal: Arc<dyn Journal>,
    pub printer: Arc<dyn ReportPrinter>,
}

impl Default for Collaborators {
    fn default() -> Self {
        let noop = Arc::new(NoOpCollaborator);
        Collaborators {
            tables: noop.clone(),
            journal: noop.clone(),
            printer: noop,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
