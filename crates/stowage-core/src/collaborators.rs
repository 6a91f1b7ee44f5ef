//! Collaborator interfaces the orchestrator delegates to
//!
//! The orchestrator never produces statement text, discovers types or talks
//! to a storage engine itself. Those concerns sit behind the traits below;
//! `stowage-store` supplies the SQLite implementations.

use std::any::TypeId;
use std::sync::Arc;

use stowage_core_types::schema::SQL_TARGET;

use crate::errors::Result;
use crate::identity::IdentityMap;
use crate::model::{Object, ResultRow};
use crate::queue::Ticket;
use crate::schema::EntityDef;

/// Bootstrap decision flags
pub trait Config: Send + Sync {
    /// The store has never been initialized
    fn first_run(&self) -> bool;

    fn in_debug(&self) -> bool;

    /// An explicit schema upgrade was asked for
    fn upgrade_requested(&self) -> bool;
}

/// Fixed set of bootstrap flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticConfig {
    pub first_run: bool,
    pub in_debug: bool,
    pub upgrade_requested: bool,
}

impl Config for StaticConfig {
    fn first_run(&self) -> bool {
        self.first_run
    }

    fn in_debug(&self) -> bool {
        self.in_debug
    }

    fn upgrade_requested(&self) -> bool {
        self.upgrade_requested
    }
}

/// Discovers the persistable types the store must hold
pub trait ClassFinder: Send + Sync {
    /// Entity definitions in discovery order
    fn find_types(&self, config: &dyn Config) -> Vec<&'static EntityDef>;
}

/// One step of saving an object
#[derive(Debug)]
pub enum SaveAction {
    /// Statement maintaining join-table rows
    Join(String),
    /// Statement updating a row whose id is already known
    Row(String),
    /// Statement inserting a new row; the id it yields belongs to `object`
    Insert { sql: String, object: Object },
}

/// One step of deleting an object
#[derive(Debug)]
pub enum DeleteAction {
    /// Statement removing join-table rows
    Join(String),
    /// Related object to delete first, on the same ticket
    Child(Object),
    /// Statement removing the object's own row, identified by exact type and id
    Row { sql: String, type_id: TypeId, id: i64 },
}

/// Lazily produced save steps
///
/// The orchestrator executes each step before pulling the next one, so ids
/// recorded by earlier inserts are visible when later steps are generated.
pub type SaveActions<'a> = Box<dyn Iterator<Item = Result<SaveAction>> + 'a>;

/// Produces the statements that save and delete objects
pub trait StatementGenerator: Send + Sync {
    fn generate_save_or_update<'a>(&'a self, object: &Object, ids: &'a IdentityMap)
        -> SaveActions<'a>;

    /// Delete steps in execution order; empty when the object was never persisted
    ///
    /// # Errors
    ///
    /// Fails when the object's entity or one of its relations is not registered.
    fn generate_delete(&self, object: &Object, ids: &IdentityMap) -> Result<Vec<DeleteAction>>;
}

/// Produces table creation statements
pub trait TableStatementGenerator: Send + Sync {
    /// Statements creating every listed type, in the order given
    ///
    /// # Errors
    ///
    /// Fails when a relation points at an entity outside the registry.
    fn generate_create_statements(&self, types: &[&'static EntityDef]) -> Result<Vec<String>>;
}

/// Read access to the store for the duration of one ticket
pub trait RowSource {
    /// # Errors
    ///
    /// Propagates the runner's failure for `sql`.
    fn fetch(&mut self, sql: &str) -> Result<Vec<ResultRow>>;
}

/// One step of a schema upgrade
#[derive(Debug, Clone, PartialEq)]
pub enum UpgradeAction {
    /// Statement to execute as is
    Raw(String),
    /// Types whose tables do not exist yet and go through schema creation
    CreateMissing(Vec<&'static EntityDef>),
}

/// Compares the stored schema with the declared types
pub trait UpgradeManager: Send + Sync {
    /// # Errors
    ///
    /// Propagates fetch failures.
    fn upgrade(
        &self,
        types: &[&'static EntityDef],
        source: &mut dyn RowSource,
    ) -> Result<Vec<UpgradeAction>>;
}

/// Objects built by one hydration pass
#[derive(Debug, Default)]
pub struct Hydration {
    /// Objects for the queried rows, in row order
    pub objects: Vec<Object>,
    /// Every object built during the pass, related ones included, with its row id
    pub discovered: Vec<(Object, i64)>,
}

/// Turns result rows into domain objects
pub trait ClassHydrator: Send + Sync {
    /// # Errors
    ///
    /// Fails when a row does not match `entity` or a related fetch fails.
    fn hydrate(
        &self,
        entity: &'static EntityDef,
        rows: Vec<ResultRow>,
        fetch: &mut dyn RowSource,
    ) -> Result<Hydration>;
}

/// Executes statements against the store
///
/// Every call requires the ticket, so the connection is only ever touched
/// by the current ticket holder.
pub trait StatementRunner: Send + Sync {
    /// # Errors
    ///
    /// Fails when the store cannot open a transaction.
    fn begin_transaction(&self, ticket: &Ticket) -> Result<()>;

    /// # Errors
    ///
    /// Fails when the store cannot commit.
    fn end_transaction(&self, ticket: &Ticket) -> Result<()>;

    /// # Errors
    ///
    /// Fails when the store cannot roll back.
    fn rollback_transaction(&self, ticket: &Ticket) -> Result<()>;

    /// # Errors
    ///
    /// Fails with `StatementExecution` when the store rejects `sql`.
    fn execute_raw(&self, ticket: &Ticket, sql: &str) -> Result<()>;

    /// # Errors
    ///
    /// Fails with `StatementExecution` when the store rejects `sql`.
    fn execute_query(&self, ticket: &Ticket, sql: &str) -> Result<Vec<ResultRow>>;

    /// # Errors
    ///
    /// Fails with `StatementExecution` when the store rejects `sql`.
    fn execute_insert_and_get_id(&self, ticket: &Ticket, sql: &str) -> Result<i64>;
}

/// Receives every statement immediately before it runs
pub trait SqlLogger: Send + Sync {
    fn log_sql(&self, sql: &str);
}

/// Emits statements as debug events on the `stowage::sql` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSqlLogger;

impl SqlLogger for TracingSqlLogger {
    fn log_sql(&self, sql: &str) {
        tracing::debug!(target: SQL_TARGET, sql = sql, "executing statement");
    }
}

/// Everything an orchestrator delegates to
#[derive(Clone)]
pub struct Collaborators {
    pub finder: Arc<dyn ClassFinder>,
    pub generator: Arc<dyn StatementGenerator>,
    pub tables: Arc<dyn TableStatementGenerator>,
    pub upgrade: Arc<dyn UpgradeManager>,
    pub hydrator: Arc<dyn ClassHydrator>,
    pub runner: Arc<dyn StatementRunner>,
    pub config: Arc<dyn Config>,
    pub logger: Arc<dyn SqlLogger>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("first_run", &self.config.first_run())
            .field("in_debug", &self.config.in_debug())
            .field("upgrade_requested", &self.config.upgrade_requested())
            .finish_non_exhaustive()
    }
}
