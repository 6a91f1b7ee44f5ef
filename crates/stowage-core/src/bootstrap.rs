//! One-time schema bootstrap
//!
//! Bootstrap takes the very first ticket an orchestrator hands out and keeps
//! it until every bootstrap statement has run, so no user operation can reach
//! the store before the schema decision is resolved. The decision itself:
//!
//! - first run: create tables for every discovered type
//! - debug or upgrade requested: apply the upgrade manager's actions
//! - otherwise: nothing, the schema is assumed current
//!
//! A first run wins over the debug and upgrade flags.

use std::fmt;
use std::sync::OnceLock;
use std::time::Instant;

use stowage_core_types::RequestId;

use crate::collaborators::{Collaborators, UpgradeAction};
use crate::errors::{Result, StowageError};
use crate::log_op_start;
use crate::orchestrator::{finish, Inner, Orchestrator, TicketFetch};
use crate::queue::Ticket;
use crate::schema::EntityDef;

/// Schema lifecycle of an orchestrator
///
/// Moves forward exactly once: from `Uninitialized` to `Ready`, possibly
/// through `CreatingSchema` or `Upgrading`. A bootstrap that fails leaves the
/// orchestrator in the intermediate state for the rest of its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Uninitialized,
    CreatingSchema,
    Upgrading,
    Ready,
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaState::Uninitialized => "uninitialized",
            SchemaState::CreatingSchema => "creating_schema",
            SchemaState::Upgrading => "upgrading",
            SchemaState::Ready => "ready",
        };
        f.write_str(name)
    }
}

impl Orchestrator {
    /// Resolve the schema decision and admit user operations
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` on a second call. Any statement failure is
    /// returned as is and leaves the orchestrator unusable.
    pub fn bootstrap(&self) -> Result<()> {
        let request_id = RequestId::new();
        let started = Instant::now();
        log_op_start!("bootstrap", request_id = %request_id);

        let ticket = self.inner.queue.acquire_blocking();
        let result = self.inner.bootstrap_with_ticket(&ticket);
        self.inner.queue.release(ticket);

        finish("bootstrap", &request_id, started, result)
    }
}

/// Build an orchestrator and bootstrap it
///
/// The returned handle is `Ready`.
pub fn initialize(collaborators: Collaborators) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::new(collaborators)?;
    orchestrator.bootstrap()?;
    Ok(orchestrator)
}

/// Application-owned slot holding the one orchestrator of a process
///
/// ```
/// use stowage_core::OrchestratorCell;
///
/// static STORE: OrchestratorCell = OrchestratorCell::new();
///
/// assert!(STORE.get().is_err());
/// ```
#[derive(Debug, Default)]
pub struct OrchestratorCell {
    cell: OnceLock<Orchestrator>,
}

impl OrchestratorCell {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Initialize the orchestrator held by this cell
    ///
    /// # Errors
    ///
    /// `AlreadyInitialized` when the cell is already filled, or whatever
    /// bootstrap returned.
    pub fn initialize(&self, collaborators: Collaborators) -> Result<&Orchestrator> {
        if let Some(existing) = self.cell.get() {
            return Err(already_initialized(existing));
        }
        let orchestrator = initialize(collaborators)?;
        self.cell
            .set(orchestrator)
            .map_err(|lost| already_initialized(&lost))?;
        self.get()
    }

    /// The initialized orchestrator
    ///
    /// # Errors
    ///
    /// `NotInitialized` until [`initialize`](OrchestratorCell::initialize)
    /// has succeeded.
    pub fn get(&self) -> Result<&Orchestrator> {
        self.cell.get().ok_or_else(|| {
            StowageError::NotInitialized {
                state: SchemaState::Uninitialized.to_string(),
            }
            .into()
        })
    }
}

fn already_initialized(orchestrator: &Orchestrator) -> crate::errors::ExError {
    StowageError::AlreadyInitialized {
        state: orchestrator.state().to_string(),
    }
    .into()
}

enum Plan {
    Create,
    Upgrade,
    Nothing,
}

impl Inner {
    fn bootstrap_with_ticket(&self, ticket: &Ticket) -> Result<()> {
        let config = &*self.collab.config;
        let plan = {
            let mut state = self.state.write();
            if *state != SchemaState::Uninitialized {
                return Err(StowageError::AlreadyInitialized {
                    state: state.to_string(),
                }
                .into());
            }
            let (plan, next) = if config.first_run() {
                (Plan::Create, SchemaState::CreatingSchema)
            } else if config.in_debug() || config.upgrade_requested() {
                (Plan::Upgrade, SchemaState::Upgrading)
            } else {
                (Plan::Nothing, SchemaState::Ready)
            };
            *state = next;
            plan
        };

        match plan {
            Plan::Create => {
                let types = self.collab.finder.find_types(config);
                tracing::debug!(ticket = ticket.serial(), types = types.len(), "creating schema");
                self.transaction(ticket, || self.create_schema(ticket, &types))?;
            }
            Plan::Upgrade => {
                let types = self.collab.finder.find_types(config);
                tracing::debug!(ticket = ticket.serial(), types = types.len(), "upgrading schema");
                self.transaction(ticket, || self.upgrade_schema(ticket, &types))?;
            }
            Plan::Nothing => {
                tracing::debug!(ticket = ticket.serial(), "schema assumed current");
            }
        }

        *self.state.write() = SchemaState::Ready;
        Ok(())
    }

    fn create_schema(&self, ticket: &Ticket, types: &[&'static EntityDef]) -> Result<()> {
        for sql in self.collab.tables.generate_create_statements(types)? {
            self.execute_raw(ticket, &sql)?;
        }
        Ok(())
    }

    fn upgrade_schema(&self, ticket: &Ticket, types: &[&'static EntityDef]) -> Result<()> {
        let actions = {
            let mut fetch = TicketFetch {
                inner: self,
                ticket,
            };
            self.collab.upgrade.upgrade(types, &mut fetch)?
        };
        for action in actions {
            match action {
                UpgradeAction::Raw(sql) => self.execute_raw(ticket, &sql)?,
                UpgradeAction::CreateMissing(missing) => self.create_schema(ticket, &missing)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_state_display() {
        assert_eq!(SchemaState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(SchemaState::CreatingSchema.to_string(), "creating_schema");
        assert_eq!(SchemaState::Ready.to_string(), "ready");
    }

    #[test]
    fn test_empty_cell_is_not_initialized() {
        let cell = OrchestratorCell::new();
        let err = cell.get().unwrap_err();
        assert_eq!(err.code(), "ERR_NOT_INITIALIZED");
    }
}
