//! Persistable objects, column values and result rows
//!
//! Domain objects are shared as [`Object`] (`Arc<dyn Persistable>`). Their
//! identity is the allocation, so two `Arc`s to the same value are the same
//! object while two equal values in different allocations are not. The row id
//! of a persisted object lives in the [`IdentityMap`](crate::identity::IdentityMap),
//! never inside the object.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StowageError};
use crate::schema::EntityDef;

/// A column value as produced by a domain object or read back from the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Boolean(bool),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Boolean(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Objects related to an owner through one declared relation
#[derive(Clone)]
pub struct Related {
    /// Relation name, matching a [`RelationDef`](crate::schema::RelationDef) of the owner
    pub relation: &'static str,
    pub objects: Vec<Object>,
}

impl Related {
    pub fn new(relation: &'static str, objects: Vec<Object>) -> Self {
        Self { relation, objects }
    }
}

impl fmt::Debug for Related {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Related")
            .field("relation", &self.relation)
            .field("objects", &self.objects.len())
            .finish()
    }
}

/// A domain entity the orchestrator can save, delete and load
///
/// Implementations describe themselves through a statically declared
/// [`EntityDef`]; no runtime introspection is involved.
pub trait Persistable: Any + Send + Sync + fmt::Debug {
    /// Static table definition for this object's type
    fn definition(&self) -> &'static EntityDef;

    /// Column values in the order of `definition().columns`
    fn values(&self) -> Vec<Value>;

    /// Related objects, one entry per relation that currently has members
    fn related(&self) -> Vec<Related> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Shared handle to a persistable domain object
pub type Object = Arc<dyn Persistable>;

/// Wrap a concrete entity as an [`Object`]
pub fn object<T: Persistable>(value: T) -> Object {
    Arc::new(value)
}

/// Runtime type of the concrete value behind an object
pub fn type_of(object: &Object) -> TypeId {
    (**object).as_any().type_id()
}

/// Address identifying the allocation behind an object
pub(crate) fn address_of(object: &Object) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Downcast an object to its concrete type
pub fn downcast<T: Persistable>(object: Object) -> Result<Arc<T>> {
    let found = object.definition().name;
    object.into_any().downcast::<T>().map_err(|_| {
        StowageError::TypeMismatch {
            expected: std::any::type_name::<T>().to_string(),
            found: found.to_string(),
        }
        .into()
    })
}

/// One row returned by a query, columns addressed by name or position
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl ResultRow {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Build a row from (column, value) pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<Value>) =
            pairs.into_iter().map(|(c, v)| (c.into(), v)).unzip();
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Row id stored in the `id` column
    pub fn id(&self) -> Option<i64> {
        self.get("id").and_then(Value::as_i64)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A result row decoded against an entity definition, ready to build an entity
#[derive(Debug)]
pub struct HydratedRow {
    entity: &'static EntityDef,
    id: i64,
    values: Vec<Value>,
    related: HashMap<&'static str, Vec<Object>>,
}

impl HydratedRow {
    /// `values` must be in the order of `entity.columns`
    pub fn new(entity: &'static EntityDef, id: i64, values: Vec<Value>) -> Self {
        Self {
            entity,
            id,
            values,
            related: HashMap::new(),
        }
    }

    pub fn with_related(mut self, relation: &'static str, objects: Vec<Object>) -> Self {
        self.related.insert(relation, objects);
        self
    }

    pub fn entity(&self) -> &'static EntityDef {
        self.entity
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    /// Value of a declared column
    pub fn value(&self, column: &str) -> Result<&Value> {
        self.entity
            .column_index(column)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| {
                StowageError::MissingColumn {
                    entity: self.entity.name.to_string(),
                    column: column.to_string(),
                }
                .into()
            })
    }

    pub fn text(&self, column: &str) -> Result<Option<String>> {
        self.typed(column, "text", |v| v.as_str().map(str::to_string))
    }

    pub fn integer(&self, column: &str) -> Result<Option<i64>> {
        self.typed(column, "integer", Value::as_i64)
    }

    pub fn real(&self, column: &str) -> Result<Option<f64>> {
        self.typed(column, "real", Value::as_f64)
    }

    pub fn boolean(&self, column: &str) -> Result<Option<bool>> {
        self.typed(column, "boolean", Value::as_bool)
    }

    pub fn blob(&self, column: &str) -> Result<Option<Vec<u8>>> {
        self.typed(column, "blob", |v| v.as_bytes().map(<[u8]>::to_vec))
    }

    pub fn timestamp(&self, column: &str) -> Result<Option<DateTime<Utc>>> {
        self.typed(column, "timestamp", Value::as_timestamp)
    }

    /// Related objects of one relation, downcast to the child type
    ///
    /// A relation with no rows yields an empty vector.
    pub fn take_related<T: Persistable>(&mut self, relation: &str) -> Result<Vec<Arc<T>>> {
        self.related
            .remove(relation)
            .unwrap_or_default()
            .into_iter()
            .map(downcast::<T>)
            .collect()
    }

    fn typed<T>(
        &self,
        column: &str,
        expected: &str,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>> {
        let value = self.value(column)?;
        if value.is_null() {
            return Ok(None);
        }
        convert(value).map(Some).ok_or_else(|| {
            StowageError::InvalidColumnValue {
                entity: self.entity.name.to_string(),
                column: column.to_string(),
                reason: format!("expected {}, found {:?}", expected, value),
            }
            .into()
        })
    }
}
