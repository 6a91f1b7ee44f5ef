//! Statically declared schema registry
//!
//! Every entity type declares its table once, as a `static` [`EntityDef`],
//! and registers with an [`EntityRegistry`] at configuration time. The
//! registry is what bootstrap discovers and what hydration builds from.

use std::any::TypeId;
use std::sync::Arc;

use crate::collaborators::{ClassFinder, Config};
use crate::errors::{Result, StowageError};
use crate::model::{HydratedRow, Object, Persistable};

/// Storage kind of a declared column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Real,
    Text,
    Boolean,
    Blob,
    /// UTC instant, stored as epoch nanoseconds
    Timestamp,
}

/// One declared column; the `id` column is implicit and never declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl ColumnDef {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// A to-many relation from an owner entity to a target entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationDef {
    pub name: &'static str,
    /// Entity name of the related objects
    pub target: &'static str,
    /// Delete related objects together with the owner
    pub cascade_delete: bool,
}

impl RelationDef {
    pub const fn new(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            target,
            cascade_delete: true,
        }
    }

    /// Relation whose members outlive the owner
    pub const fn detached(name: &'static str, target: &'static str) -> Self {
        Self {
            name,
            target,
            cascade_delete: false,
        }
    }
}

/// Table definition of an entity type
#[derive(Debug, PartialEq, Eq)]
pub struct EntityDef {
    /// Table name
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    pub relations: &'static [RelationDef],
}

impl EntityDef {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Name of the join table backing one of this entity's relations
    pub fn join_table(&self, relation: &RelationDef) -> String {
        format!("{}_{}", self.name, relation.name)
    }
}

/// A persistable type the registry knows how to rebuild from stored rows
pub trait Entity: Persistable + Sized {
    fn entity_def() -> &'static EntityDef;

    fn hydrate(row: HydratedRow) -> Result<Self>;
}

/// Registry entry for one entity type
#[derive(Clone)]
pub struct Registration {
    pub definition: &'static EntityDef,
    pub type_id: TypeId,
    pub type_name: &'static str,
    build: fn(HydratedRow) -> Result<Object>,
}

impl Registration {
    pub fn build(&self, row: HydratedRow) -> Result<Object> {
        (self.build)(row)
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("entity", &self.definition.name)
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn build_object<T: Entity>(row: HydratedRow) -> Result<Object> {
    let object: Object = Arc::new(T::hydrate(row)?);
    Ok(object)
}

/// Ordered set of registered entity types
///
/// Registration order is discovery order: bootstrap creates tables in the
/// order types were registered.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entries: Vec<Registration>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type; registering the same type twice is a no-op
    pub fn register<T: Entity>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if self.entries.iter().all(|e| e.type_id != type_id) {
            self.entries.push(Registration {
                definition: T::entity_def(),
                type_id,
                type_name: std::any::type_name::<T>(),
                build: build_object::<T>,
            });
        }
        self
    }

    pub fn definitions(&self) -> Vec<&'static EntityDef> {
        self.entries.iter().map(|e| e.definition).collect()
    }

    pub fn registrations(&self) -> &[Registration] {
        &self.entries
    }

    pub fn by_name(&self, name: &str) -> Result<&Registration> {
        self.entries
            .iter()
            .find(|e| e.definition.name == name)
            .ok_or_else(|| {
                StowageError::UnknownEntity {
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn by_type(&self, type_id: TypeId) -> Option<&Registration> {
        self.entries.iter().find(|e| e.type_id == type_id)
    }

    /// Relations of other entities whose members are of entity `target`
    pub fn incoming(&self, target: &str) -> Vec<(&'static EntityDef, &'static RelationDef)> {
        self.entries
            .iter()
            .flat_map(|e| {
                e.definition
                    .relations
                    .iter()
                    .filter(move |r| r.target == target)
                    .map(move |r| (e.definition, r))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ClassFinder for EntityRegistry {
    fn find_types(&self, _config: &dyn Config) -> Vec<&'static EntityDef> {
        self.definitions()
    }
}
