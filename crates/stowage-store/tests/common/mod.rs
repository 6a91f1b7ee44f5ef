//! Entities shared by the SQLite store tests

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use stowage_core::{
    ColumnDef, ColumnKind, Entity, EntityDef, EntityRegistry, HydratedRow, Object, Persistable,
    RelationDef, Related, Result, Value,
};

pub static PROJECT: EntityDef = EntityDef {
    name: "project",
    columns: &[
        ColumnDef::new("title", ColumnKind::Text),
        ColumnDef::new("budget", ColumnKind::Real),
        ColumnDef::new("active", ColumnKind::Boolean),
        ColumnDef::new("created", ColumnKind::Timestamp),
    ],
    relations: &[
        RelationDef::new("tasks", "task"),
        RelationDef::detached("tags", "tag"),
    ],
};

pub static TASK: EntityDef = EntityDef {
    name: "task",
    columns: &[
        ColumnDef::new("summary", ColumnKind::Text),
        ColumnDef::new("done", ColumnKind::Boolean),
    ],
    relations: &[],
};

pub static TAG: EntityDef = EntityDef {
    name: "tag",
    columns: &[ColumnDef::new("label", ColumnKind::Text)],
    relations: &[],
};

#[derive(Debug)]
pub struct Project {
    pub title: String,
    pub budget: Option<f64>,
    pub active: bool,
    pub created: DateTime<Utc>,
    pub tasks: Vec<Arc<Task>>,
    pub tags: Vec<Arc<Tag>>,
}

impl Persistable for Project {
    fn definition(&self) -> &'static EntityDef {
        &PROJECT
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::from(self.title.as_str()),
            Value::from(self.budget),
            Value::from(self.active),
            Value::from(self.created),
        ]
    }

    fn related(&self) -> Vec<Related> {
        vec![
            Related::new("tasks", self.tasks.iter().map(|t| Arc::clone(t) as Object).collect()),
            Related::new("tags", self.tags.iter().map(|t| Arc::clone(t) as Object).collect()),
        ]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Entity for Project {
    fn entity_def() -> &'static EntityDef {
        &PROJECT
    }

    fn hydrate(mut row: HydratedRow) -> Result<Self> {
        Ok(Project {
            title: row.text("title")?.unwrap_or_default(),
            budget: row.real("budget")?,
            active: row.boolean("active")?.unwrap_or(false),
            created: row.timestamp("created")?.unwrap_or_default(),
            tasks: row.take_related("tasks")?,
            tags: row.take_related("tags")?,
        })
    }
}

#[derive(Debug)]
pub struct Task {
    pub summary: String,
    pub done: Mutex<bool>,
}

impl Persistable for Task {
    fn definition(&self) -> &'static EntityDef {
        &TASK
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.summary.as_str()), Value::from(*self.done.lock())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Entity for Task {
    fn entity_def() -> &'static EntityDef {
        &TASK
    }

    fn hydrate(row: HydratedRow) -> Result<Self> {
        Ok(Task {
            summary: row.text("summary")?.unwrap_or_default(),
            done: Mutex::new(row.boolean("done")?.unwrap_or(false)),
        })
    }
}

#[derive(Debug)]
pub struct Tag {
    pub label: String,
}

impl Persistable for Tag {
    fn definition(&self) -> &'static EntityDef {
        &TAG
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.label.as_str())]
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Entity for Tag {
    fn entity_def() -> &'static EntityDef {
        &TAG
    }

    fn hydrate(row: HydratedRow) -> Result<Self> {
        Ok(Tag {
            label: row.text("label")?.unwrap_or_default(),
        })
    }
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .register::<Project>()
        .register::<Task>()
        .register::<Tag>()
}

pub fn task(summary: &str) -> Arc<Task> {
    Arc::new(Task {
        summary: summary.to_string(),
        done: Mutex::new(false),
    })
}

pub fn tag(label: &str) -> Arc<Tag> {
    Arc::new(Tag {
        label: label.to_string(),
    })
}

pub fn project(title: &str, tasks: Vec<Arc<Task>>, tags: Vec<Arc<Tag>>) -> Arc<Project> {
    Arc::new(Project {
        title: title.to_string(),
        budget: Some(1250.5),
        active: true,
        created: Utc.timestamp_nanos(1_700_000_000_123_456_789),
        tasks,
        tags,
    })
}

pub fn obj<T: Persistable>(value: &Arc<T>) -> Object {
    Arc::clone(value) as Object
}

/// Row count of a table, read straight from the database file
pub fn count_rows(conn: &rusqlite::Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| row.get(0))
        .unwrap()
}
