//! SQLite-backed orchestrator assembly

use std::sync::Arc;

use stowage_core::{
    Collaborators, Config, Entity, EntityRegistry, Orchestrator, StaticConfig, TracingSqlLogger,
};

use crate::config::StoreConfig;
use crate::db;
use crate::errors::Result;
use crate::generator::{select_all, select_by_id, select_where, SqlStatementGenerator};
use crate::hydrator::RegistryHydrator;
use crate::runner::SqliteRunner;
use crate::tables::SqlTableStatementGenerator;
use crate::upgrade::SqliteUpgradeManager;

/// Default SQLite collaborators over one open connection
pub fn collaborators(
    conn: rusqlite::Connection,
    registry: Arc<EntityRegistry>,
    config: impl Config + 'static,
) -> Collaborators {
    Collaborators {
        finder: registry.clone(),
        generator: Arc::new(SqlStatementGenerator::new(registry.clone())),
        tables: Arc::new(SqlTableStatementGenerator::new(registry.clone())),
        upgrade: Arc::new(SqliteUpgradeManager::new()),
        hydrator: Arc::new(RegistryHydrator::new(registry)),
        runner: Arc::new(SqliteRunner::new(conn)),
        config: Arc::new(config),
        logger: Arc::new(TracingSqlLogger),
    }
}

/// A bootstrapped orchestrator over a SQLite database
#[derive(Clone, Debug)]
pub struct SqliteStore {
    orchestrator: Orchestrator,
    boot: StaticConfig,
}

impl SqliteStore {
    /// Open the configured database and bootstrap it
    pub fn initialize(config: &StoreConfig, registry: EntityRegistry) -> Result<Self> {
        let conn = if config.is_in_memory() {
            db::open_in_memory()?
        } else {
            db::open(&config.path)?
        };
        db::configure(&conn, !config.is_in_memory())?;
        let boot = config.resolve(&conn)?;
        tracing::info!(
            path = %config.path,
            first_run = boot.first_run,
            debug = boot.in_debug,
            upgrade = boot.upgrade_requested,
            entities = registry.len(),
            "opening store"
        );

        let orchestrator = stowage_core::initialize(collaborators(conn, Arc::new(registry), boot))?;
        Ok(Self { orchestrator, boot })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Bootstrap flags this store was opened with
    pub fn boot_config(&self) -> StaticConfig {
        self.boot
    }

    /// Every stored entity of type `T`, in id order
    pub fn load_all<T: Entity>(&self) -> Result<Vec<Arc<T>>> {
        self.orchestrator.load::<T>(&select_all(T::entity_def()))
    }

    pub fn load_by_id<T: Entity>(&self, id: i64) -> Result<Option<Arc<T>>> {
        Ok(self
            .orchestrator
            .load::<T>(&select_by_id(T::entity_def(), id))?
            .into_iter()
            .next())
    }

    /// Entities of type `T` matching a raw `WHERE` clause, in id order
    pub fn load_where<T: Entity>(&self, clause: &str) -> Result<Vec<Arc<T>>> {
        self.orchestrator
            .load::<T>(&select_where(T::entity_def(), clause))
    }
}

impl std::ops::Deref for SqliteStore {
    type Target = Orchestrator;

    fn deref(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
