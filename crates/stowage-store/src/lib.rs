//! Stowage Store - SQLite collaborators for the persistence orchestrator
//!
//! Provides:
//! - Connection management and a transaction-counting statement runner
//! - Statement text for saving, deleting and selecting registered entities
//! - Table creation and catalogue-driven schema upgrade
//! - Hydration of entities and their relations from stored rows
//! - TOML store configuration and one-call store assembly

pub mod config;
pub mod db;
pub mod errors;
pub mod generator;
pub mod hydrator;
pub mod runner;
pub mod sql;
pub mod store;
pub mod tables;
pub mod upgrade;

// Re-export key types
pub use config::StoreConfig;
pub use errors::Result;
pub use generator::SqlStatementGenerator;
pub use hydrator::RegistryHydrator;
pub use runner::SqliteRunner;
pub use store::SqliteStore;
pub use tables::SqlTableStatementGenerator;
pub use upgrade::SqliteUpgradeManager;
