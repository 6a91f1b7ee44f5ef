//! Rebuilds registered entities from SQLite rows
//!
//! Stored values are converted back to their declared column kinds, then the
//! members of every relation are fetched through the join table and built
//! recursively. Within one pass a row is built at most once: a second
//! reference reuses the instance and a reference back into a row still being
//! built is left out.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use stowage_core::{
    ClassHydrator, ColumnDef, ColumnKind, EntityDef, EntityRegistry, HydratedRow, Hydration,
    Object, ResultRow, RowSource, StowageError, Value,
};

use crate::errors::Result;
use crate::generator::select_related;

pub struct RegistryHydrator {
    registry: Arc<EntityRegistry>,
}

impl RegistryHydrator {
    pub fn new(registry: Arc<EntityRegistry>) -> Self {
        Self { registry }
    }
}

impl ClassHydrator for RegistryHydrator {
    fn hydrate(
        &self,
        entity: &'static EntityDef,
        rows: Vec<ResultRow>,
        fetch: &mut dyn RowSource,
    ) -> Result<Hydration> {
        let mut pass = Pass {
            registry: &self.registry,
            fetch,
            built: HashMap::new(),
            building: HashSet::new(),
            discovered: Vec::new(),
        };
        let mut objects = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(object) = pass.build(entity, row)? {
                objects.push(object);
            }
        }
        Ok(Hydration {
            objects,
            discovered: pass.discovered,
        })
    }
}

type RowKey = (&'static str, i64);

struct Pass<'a, 'f> {
    registry: &'a EntityRegistry,
    fetch: &'a mut (dyn RowSource + 'f),
    built: HashMap<RowKey, Object>,
    building: HashSet<RowKey>,
    discovered: Vec<(Object, i64)>,
}

impl Pass<'_, '_> {
    fn build(&mut self, entity: &'static EntityDef, row: &ResultRow) -> Result<Option<Object>> {
        let id = row.id().ok_or_else(|| StowageError::MissingColumn {
            entity: entity.name.to_string(),
            column: "id".to_string(),
        })?;
        let key = (entity.name, id);
        if let Some(existing) = self.built.get(&key) {
            return Ok(Some(Arc::clone(existing)));
        }
        if !self.building.insert(key) {
            tracing::debug!(entity = entity.name, row_id = id, "skipping cyclic reference");
            return Ok(None);
        }

        let values = entity
            .columns
            .iter()
            .map(|column| convert(entity, column, row.get(column.name)))
            .collect::<Result<Vec<_>>>()?;
        let mut hydrated = HydratedRow::new(entity, id, values);

        for relation in entity.relations {
            let target = self.registry.by_name(relation.target)?.definition;
            let rows = self
                .fetch
                .fetch(&select_related(entity, relation, target, id))?;
            let mut members = Vec::with_capacity(rows.len());
            for member_row in &rows {
                if let Some(member) = self.build(target, member_row)? {
                    members.push(member);
                }
            }
            hydrated = hydrated.with_related(relation.name, members);
        }

        let object = self.registry.by_name(entity.name)?.build(hydrated)?;
        self.building.remove(&key);
        self.built.insert(key, Arc::clone(&object));
        self.discovered.push((Arc::clone(&object), id));
        Ok(Some(object))
    }
}

/// Convert a stored value to the declared kind of its column
///
/// Columns absent from the row are read as `Null`.
fn convert(entity: &EntityDef, column: &ColumnDef, stored: Option<&Value>) -> Result<Value> {
    let Some(stored) = stored else {
        return Ok(Value::Null);
    };
    let converted = match (column.kind, stored) {
        (_, Value::Null) => Some(Value::Null),
        (ColumnKind::Integer, Value::Integer(v)) => Some(Value::Integer(*v)),
        (ColumnKind::Real, Value::Real(v)) => Some(Value::Real(*v)),
        (ColumnKind::Real, Value::Integer(v)) => Some(Value::Real(*v as f64)),
        (ColumnKind::Text, Value::Text(s)) => Some(Value::Text(s.clone())),
        (ColumnKind::Boolean, Value::Integer(v)) => Some(Value::Boolean(*v != 0)),
        (ColumnKind::Blob, Value::Blob(b)) => Some(Value::Blob(b.clone())),
        (ColumnKind::Timestamp, Value::Integer(ns)) => Some(Value::Timestamp(Utc.timestamp_nanos(*ns))),
        _ => None,
    };
    converted.ok_or_else(|| {
        StowageError::InvalidColumnValue {
            entity: entity.name.to_string(),
            column: column.name.to_string(),
            reason: format!("cannot read {:?} as {:?}", stored, column.kind),
        }
        .into()
    })
}
