//! Stowage Core - Serialized persistence orchestration
//!
//! This crate coordinates every save, delete, load and schema operation
//! against a single-writer store:
//! - Operation queue handing out one ticket at a time, blocking or asynchronous
//! - Identity map from live objects to row ids, holding weak references
//! - Orchestrator running cascading saves and deletes inside one transaction
//! - One-time bootstrap choosing schema creation, upgrade or nothing
//!
//! Statement text, type discovery and the storage engine itself are
//! collaborators; `stowage-store` provides the SQLite ones.

pub mod bootstrap;
pub mod collaborators;
pub mod errors;
pub mod identity;
pub mod logging_facility;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod schema;

#[doc(hidden)]
pub use stowage_core_types as core_types;
#[doc(hidden)]
pub use tracing;

// Re-export commonly used types
pub use bootstrap::{initialize, OrchestratorCell, SchemaState};
pub use collaborators::{
    ClassFinder, ClassHydrator, Collaborators, Config, DeleteAction, Hydration, RowSource,
    SaveAction, SaveActions, SqlLogger, StatementGenerator, StatementRunner, StaticConfig,
    TableStatementGenerator, TracingSqlLogger, UpgradeAction, UpgradeManager,
};
pub use errors::{ExError, ExErrorKind, Result, StowageError};
pub use identity::IdentityMap;
pub use model::{downcast, object, type_of, HydratedRow, Object, Persistable, Related, ResultRow, Value};
pub use orchestrator::Orchestrator;
pub use queue::{OperationQueue, Ticket};
pub use schema::{ColumnDef, ColumnKind, Entity, EntityDef, EntityRegistry, RelationDef};
