//! Save, delete and select statements for registered entities
//!
//! Every entity owns a table named after it with an `id INTEGER PRIMARY KEY
//! AUTOINCREMENT` column followed by its declared columns. Every relation
//! owns a join table `<owner>_<relation>` with `parent` and `child` columns;
//! join row ids preserve member order.

use std::collections::HashSet;
use std::sync::Arc;

use stowage_core::errors::{ExError, ExErrorKind};
use stowage_core::{
    type_of, DeleteAction, EntityDef, EntityRegistry, IdentityMap, Object, RelationDef,
    SaveAction, SaveActions, StatementGenerator, StowageError,
};

use crate::errors::Result;
use crate::sql::{literal, quote_ident};

/// `SELECT` every row of an entity in id order
pub fn select_all(entity: &EntityDef) -> String {
    format!("SELECT * FROM {} ORDER BY id", quote_ident(entity.name))
}

/// `SELECT` one row of an entity by id
pub fn select_by_id(entity: &EntityDef, id: i64) -> String {
    format!("SELECT * FROM {} WHERE id = {}", quote_ident(entity.name), id)
}

/// `SELECT` rows of an entity matching a raw `WHERE` clause, in id order
pub fn select_where(entity: &EntityDef, clause: &str) -> String {
    format!(
        "SELECT * FROM {} WHERE {} ORDER BY id",
        quote_ident(entity.name),
        clause
    )
}

/// Members of one relation of one owner row, in join order
pub fn select_related(
    owner: &EntityDef,
    relation: &RelationDef,
    target: &EntityDef,
    parent: i64,
) -> String {
    format!(
        "SELECT t.* FROM {} t JOIN {} j ON j.child = t.id WHERE j.parent = {} ORDER BY j.id",
        quote_ident(target.name),
        quote_ident(&owner.join_table(relation)),
        parent
    )
}

/// SQLite statement generator backed by the entity registry
pub struct SqlStatementGenerator {
    registry: Arc<EntityRegistry>,
}

impl SqlStatementGenerator {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }

    fn row_action(&self, object: Object, ids: &IdentityMap) -> Option<Result<SaveAction>> {
        let entity = object.definition();
        let values = object.values();
        if values.len() != entity.columns.len() {
            return Some(Err(StowageError::ColumnCountMismatch {
                entity: entity.name.to_string(),
                expected: entity.columns.len(),
                found: values.len(),
            }
            .into()));
        }
        let table = quote_ident(entity.name);

        match ids.get(&object) {
            // nothing to update on a table without declared columns
            Some(_) if entity.columns.is_empty() => None,
            Some(id) => {
                let assignments = entity
                    .columns
                    .iter()
                    .zip(&values)
                    .map(|(column, value)| {
                        literal(value).map(|v| format!("{} = {}", quote_ident(column.name), v))
                    })
                    .collect::<Result<Vec<_>>>();
                let assignments = match assignments {
                    Ok(assignments) => assignments.join(", "),
                    Err(err) => return Some(Err(err.with_entity(entity.name))),
                };
                Some(Ok(SaveAction::Row(format!(
                    "UPDATE {} SET {} WHERE id = {}",
                    table, assignments, id
                ))))
            }
            None if entity.columns.is_empty() => Some(Ok(SaveAction::Insert {
                sql: format!("INSERT INTO {} DEFAULT VALUES", table),
                object,
            })),
            None => {
                let columns = entity
                    .columns
                    .iter()
                    .map(|c| quote_ident(c.name))
                    .collect::<Vec<_>>()
                    .join(", ");
                let literals = match values.iter().map(literal).collect::<Result<Vec<_>>>() {
                    Ok(literals) => literals.join(", "),
                    Err(err) => return Some(Err(err.with_entity(entity.name))),
                };
                Some(Ok(SaveAction::Insert {
                    sql: format!("INSERT INTO {} ({}) VALUES ({})", table, columns, literals),
                    object,
                }))
            }
        }
    }

    /// Rewrite the join rows of every relation the owner reports
    fn join_actions(&self, owner: &Object, ids: &IdentityMap) -> Vec<Result<SaveAction>> {
        let entity = owner.definition();
        let mut actions = Vec::new();
        for related in owner.related() {
            let Some(relation) = entity.relation(related.relation) else {
                actions.push(Err(undeclared_relation(entity, related.relation)));
                continue;
            };
            let Some(parent) = ids.get(owner) else {
                actions.push(Err(missing_id(entity, relation)));
                continue;
            };
            let table = quote_ident(&entity.join_table(relation));
            actions.push(Ok(SaveAction::Join(format!(
                "DELETE FROM {} WHERE parent = {}",
                table, parent
            ))));

            let children = related
                .objects
                .iter()
                .map(|child| ids.get(child).ok_or_else(|| missing_id(entity, relation)))
                .collect::<Result<Vec<_>>>();
            match children {
                Ok(children) if children.is_empty() => {}
                Ok(children) => {
                    let rows = children
                        .iter()
                        .map(|child| format!("({}, {})", parent, child))
                        .collect::<Vec<_>>()
                        .join(", ");
                    actions.push(Ok(SaveAction::Join(format!(
                        "INSERT INTO {} (parent, child) VALUES {}",
                        table, rows
                    ))));
                }
                Err(err) => actions.push(Err(err)),
            }
        }
        actions
    }
}

impl StatementGenerator for SqlStatementGenerator {
    /// Rows first, children before owners, then the join rows linking them
    fn generate_save_or_update<'a>(
        &'a self,
        object: &Object,
        ids: &'a IdentityMap,
    ) -> SaveActions<'a> {
        let mut order = Vec::new();
        children_first(object, &mut order, &mut HashSet::new());

        let rows = order
            .clone()
            .into_iter()
            .filter_map(move |o| self.row_action(o, ids));
        let joins = order
            .into_iter()
            .flat_map(move |o| self.join_actions(&o, ids));
        Box::new(rows.chain(joins))
    }

    fn generate_delete(&self, object: &Object, ids: &IdentityMap) -> Result<Vec<DeleteAction>> {
        let Some(id) = ids.get(object) else {
            return Ok(Vec::new());
        };
        let entity = object.definition();
        let mut actions = Vec::new();

        for (owner, relation) in self.registry.incoming(entity.name) {
            actions.push(DeleteAction::Join(format!(
                "DELETE FROM {} WHERE child = {}",
                quote_ident(&owner.join_table(relation)),
                id
            )));
        }

        let related = object.related();
        for relation in entity.relations {
            actions.push(DeleteAction::Join(format!(
                "DELETE FROM {} WHERE parent = {}",
                quote_ident(&entity.join_table(relation)),
                id
            )));
            if !relation.cascade_delete {
                continue;
            }
            if let Some(members) = related.iter().find(|r| r.relation == relation.name) {
                actions.extend(members.objects.iter().cloned().map(DeleteAction::Child));
            }
        }

        actions.push(DeleteAction::Row {
            sql: format!("DELETE FROM {} WHERE id = {}", quote_ident(entity.name), id),
            type_id: type_of(object),
            id,
        });
        Ok(actions)
    }
}

fn children_first(object: &Object, order: &mut Vec<Object>, seen: &mut HashSet<*const ()>) {
    if !seen.insert(Arc::as_ptr(object) as *const ()) {
        return;
    }
    for related in object.related() {
        for child in &related.objects {
            children_first(child, order, seen);
        }
    }
    order.push(Arc::clone(object));
}

fn missing_id(entity: &EntityDef, relation: &RelationDef) -> ExError {
    StowageError::MissingRelatedId {
        entity: entity.name.to_string(),
        relation: relation.name.to_string(),
    }
    .into()
}

fn undeclared_relation(entity: &EntityDef, relation: &str) -> ExError {
    ExError::new(ExErrorKind::InvalidInput)
        .with_entity(entity.name)
        .with_message(format!("Relation {} is not declared", relation))
}
