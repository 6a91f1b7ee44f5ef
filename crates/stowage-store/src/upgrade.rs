//! Schema upgrade against the live SQLite catalogue
//!
//! Tables that do not exist are handed back for creation. Existing tables
//! gain added columns through `ALTER TABLE ... ADD COLUMN`; a table that lost
//! columns is rebuilt, keeping its ids and the columns it still shares with
//! the declaration.

use std::collections::HashSet;

use stowage_core::{EntityDef, RowSource, UpgradeAction, UpgradeManager, Value};

use crate::errors::Result;
use crate::sql::{column_type, literal, quote_ident};
use crate::tables::{create_join_table, create_table};

const TABLES_QUERY: &str = "SELECT name FROM sqlite_master WHERE type = 'table'";

/// Suffix of the temporary name a table carries while it is rebuilt
const REBUILD_SUFFIX: &str = "__stowage_old";

#[derive(Debug, Default)]
pub struct SqliteUpgradeManager;

impl SqliteUpgradeManager {
    pub fn new() -> Self {
        Self
    }
}

fn names(rows: Vec<stowage_core::ResultRow>) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get("name").and_then(Value::as_str).map(str::to_string))
        .collect()
}

fn stored_columns(entity: &EntityDef, source: &mut dyn RowSource) -> Result<Vec<String>> {
    let pragma = format!(
        "PRAGMA table_info({})",
        literal(&Value::from(entity.name))?
    );
    Ok(names(source.fetch(&pragma)?)
        .into_iter()
        .filter(|c| c != "id")
        .collect())
}

fn rebuild(entity: &EntityDef, stored: &[String]) -> Vec<UpgradeAction> {
    let table = quote_ident(entity.name);
    let old = quote_ident(&format!("{}{}", entity.name, REBUILD_SUFFIX));
    let shared: Vec<String> = std::iter::once("id".to_string())
        .chain(
            entity
                .columns
                .iter()
                .filter(|c| stored.iter().any(|s| s == c.name))
                .map(|c| quote_ident(c.name)),
        )
        .collect();
    let shared = shared.join(", ");

    vec![
        UpgradeAction::Raw(format!("ALTER TABLE {} RENAME TO {}", table, old)),
        UpgradeAction::Raw(create_table(entity)),
        UpgradeAction::Raw(format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            table, shared, shared, old
        )),
        UpgradeAction::Raw(format!("DROP TABLE {}", old)),
    ]
}

impl UpgradeManager for SqliteUpgradeManager {
    fn upgrade(
        &self,
        types: &[&'static EntityDef],
        source: &mut dyn RowSource,
    ) -> Result<Vec<UpgradeAction>> {
        let existing: HashSet<String> = names(source.fetch(TABLES_QUERY)?).into_iter().collect();
        let mut missing = Vec::new();
        let mut actions = Vec::new();

        for entity in types {
            if !existing.contains(entity.name) {
                missing.push(*entity);
                continue;
            }

            let stored = stored_columns(entity, source)?;
            let removed = stored
                .iter()
                .any(|s| entity.columns.iter().all(|c| c.name != s.as_str()));
            if removed {
                tracing::debug!(entity = entity.name, "rebuilding table without dropped columns");
                actions.extend(rebuild(entity, &stored));
            } else {
                for column in entity
                    .columns
                    .iter()
                    .filter(|c| !stored.iter().any(|s| s == c.name))
                {
                    actions.push(UpgradeAction::Raw(format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quote_ident(entity.name),
                        quote_ident(column.name),
                        column_type(column.kind)
                    )));
                }
            }

            for relation in entity.relations {
                if !existing.contains(&entity.join_table(relation)) {
                    actions.push(UpgradeAction::Raw(create_join_table(entity, relation)));
                }
            }
        }

        if !missing.is_empty() {
            actions.insert(0, UpgradeAction::CreateMissing(missing));
        }
        tracing::debug!(actions = actions.len(), "schema upgrade planned");
        Ok(actions)
    }
}
