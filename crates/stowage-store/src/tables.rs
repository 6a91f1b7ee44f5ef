//! Table creation statements

use std::sync::Arc;

use stowage_core::{EntityDef, EntityRegistry, RelationDef, TableStatementGenerator};

use crate::errors::Result;
use crate::sql::{column_type, quote_ident};

/// `CREATE TABLE` for an entity's own table
pub fn create_table(entity: &EntityDef) -> String {
    let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    columns.extend(
        entity
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c.name), column_type(c.kind))),
    );
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(entity.name),
        columns.join(", ")
    )
}

/// `CREATE TABLE` for the join table backing one relation
pub fn create_join_table(owner: &EntityDef, relation: &RelationDef) -> String {
    format!(
        "CREATE TABLE {} (id INTEGER PRIMARY KEY AUTOINCREMENT, parent INTEGER NOT NULL, child INTEGER NOT NULL)",
        quote_ident(&owner.join_table(relation))
    )
}

/// Creates entity tables followed by their join tables, type by type
pub struct SqlTableStatementGenerator {
    registry: Arc<EntityRegistry>,
}

impl SqlTableStatementGenerator {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }
}

impl TableStatementGenerator for SqlTableStatementGenerator {
    fn generate_create_statements(&self, types: &[&'static EntityDef]) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for entity in types {
            statements.push(create_table(entity));
            for relation in entity.relations {
                self.registry.by_name(relation.target)?;
                statements.push(create_join_table(entity, relation));
            }
        }
        Ok(statements)
    }
}
