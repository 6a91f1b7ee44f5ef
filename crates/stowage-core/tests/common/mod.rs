//! Recording collaborators for orchestrator tests
//!
//! The fakes produce readable pseudo statements and the runner records every
//! call together with the serial of the ticket it ran under.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;

use parking_lot::Mutex;
use stowage_core::{
    type_of, ClassFinder, ClassHydrator, Collaborators, Config, DeleteAction, Entity, EntityDef,
    EntityRegistry, ExError, HydratedRow, Hydration, IdentityMap, Object, Persistable, Related,
    ResultRow, RowSource, SaveAction, SaveActions, StatementGenerator, StatementRunner,
    StaticConfig, StowageError, TableStatementGenerator, Ticket, TracingSqlLogger,
    UpgradeAction, UpgradeManager, Value,
};
use stowage_core::{ColumnDef, ColumnKind, RelationDef, Result};

// ========== Entities ==========

pub static NOTE: EntityDef = EntityDef {
    name: "note",
    columns: &[ColumnDef::new("body", ColumnKind::Text)],
    relations: &[],
};

pub static FOLDER: EntityDef = EntityDef {
    name: "folder",
    columns: &[ColumnDef::new("name", ColumnKind::Text)],
    relations: &[RelationDef::new("notes", "note")],
};

#[derive(Debug)]
pub struct Note {
    pub body: String,
}

impl Note {
    pub fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }
}

impl Persistable for Note {
    fn definition(&self) -> &'static EntityDef {
        &NOTE
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.body.as_str())]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl Entity for Note {
    fn entity_def() -> &'static EntityDef {
        &NOTE
    }

    fn hydrate(row: HydratedRow) -> Result<Self> {
        Ok(Note {
            body: row.text("body")?.unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
pub struct Folder {
    pub name: String,
    pub notes: Vec<Object>,
}

impl Persistable for Folder {
    fn definition(&self) -> &'static EntityDef {
        &FOLDER
    }

    fn values(&self) -> Vec<Value> {
        vec![Value::from(self.name.as_str())]
    }

    fn related(&self) -> Vec<Related> {
        vec![Related::new("notes", self.notes.clone())]
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }
}

impl Entity for Folder {
    fn entity_def() -> &'static EntityDef {
        &FOLDER
    }

    fn hydrate(mut row: HydratedRow) -> Result<Self> {
        let notes = row
            .take_related::<Note>("notes")?
            .into_iter()
            .map(|note| note as Object)
            .collect();
        Ok(Folder {
            name: row.text("name")?.unwrap_or_default(),
            notes,
        })
    }
}

pub fn registry() -> EntityRegistry {
    EntityRegistry::new().register::<Folder>().register::<Note>()
}

// ========== Runner ==========

/// One call the runner received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub serial: u64,
    pub statement: String,
}

pub const BEGIN: &str = "BEGIN";
pub const COMMIT: &str = "COMMIT";
pub const ROLLBACK: &str = "ROLLBACK";

#[derive(Default)]
pub struct RecordingRunner {
    log: Mutex<Vec<Recorded>>,
    next_id: Mutex<i64>,
    fail_on: Mutex<Option<String>>,
    rows: Mutex<HashMap<String, Vec<ResultRow>>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn log(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }

    /// Statements only, without transaction markers
    pub fn statements(&self) -> Vec<String> {
        self.log
            .lock()
            .iter()
            .filter(|r| ![BEGIN, COMMIT, ROLLBACK].contains(&r.statement.as_str()))
            .map(|r| r.statement.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().iter().map(|r| r.statement.clone()).collect()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    /// Fail every statement containing `fragment`
    pub fn fail_on(&self, fragment: &str) {
        *self.fail_on.lock() = Some(fragment.to_string());
    }

    /// Stop injecting failures
    pub fn succeed(&self) {
        *self.fail_on.lock() = None;
    }

    /// Rows returned for an exact query text
    pub fn stub_query(&self, sql: &str, rows: Vec<ResultRow>) {
        self.rows.lock().insert(sql.to_string(), rows);
    }

    fn record(&self, ticket: &Ticket, statement: &str) -> Result<()> {
        self.log.lock().push(Recorded {
            serial: ticket.serial(),
            statement: statement.to_string(),
        });
        match self.fail_on.lock().as_deref() {
            Some(fragment) if statement.contains(fragment) => Err(StowageError::StatementFailed {
                sql: statement.to_string(),
                reason: "injected failure".to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }
}

impl StatementRunner for RecordingRunner {
    fn begin_transaction(&self, ticket: &Ticket) -> Result<()> {
        self.record(ticket, BEGIN)
    }

    fn end_transaction(&self, ticket: &Ticket) -> Result<()> {
        self.record(ticket, COMMIT)
    }

    fn rollback_transaction(&self, ticket: &Ticket) -> Result<()> {
        self.record(ticket, ROLLBACK)
    }

    fn execute_raw(&self, ticket: &Ticket, sql: &str) -> Result<()> {
        self.record(ticket, sql)
    }

    fn execute_query(&self, ticket: &Ticket, sql: &str) -> Result<Vec<ResultRow>> {
        self.record(ticket, sql)?;
        Ok(self.rows.lock().get(sql).cloned().unwrap_or_default())
    }

    fn execute_insert_and_get_id(&self, ticket: &Ticket, sql: &str) -> Result<i64> {
        self.record(ticket, sql)?;
        let mut next_id = self.next_id.lock();
        *next_id += 1;
        Ok(*next_id)
    }
}

// ========== Generators ==========

fn collect_children_first(object: &Object, order: &mut Vec<Object>, seen: &mut HashSet<usize>) {
    if !seen.insert(Arc::as_ptr(object) as *const () as usize) {
        return;
    }
    for related in object.related() {
        for child in &related.objects {
            collect_children_first(child, order, seen);
        }
    }
    order.push(object.clone());
}

pub struct FakeGenerator;

impl StatementGenerator for FakeGenerator {
    fn generate_save_or_update<'a>(
        &'a self,
        object: &Object,
        ids: &'a IdentityMap,
    ) -> SaveActions<'a> {
        let mut order = Vec::new();
        collect_children_first(object, &mut order, &mut HashSet::new());

        let rows = order.clone().into_iter().map(move |o| -> Result<SaveAction> {
            let def = o.definition();
            Ok(match ids.get(&o) {
                Some(id) => SaveAction::Row(format!("UPDATE {} {:?} id={}", def.name, o.values(), id)),
                None => SaveAction::Insert {
                    sql: format!("INSERT {} {:?}", def.name, o.values()),
                    object: o,
                },
            })
        });
        let joins = order.into_iter().flat_map(move |o| {
            o.related()
                .into_iter()
                .map(|related| -> Result<SaveAction> {
                    let owner = o.definition().name;
                    let parent = ids.get(&o).ok_or_else(|| missing_id(owner, related.relation))?;
                    let children = related
                        .objects
                        .iter()
                        .map(|child| ids.get(child).ok_or_else(|| missing_id(owner, related.relation)))
                        .collect::<Result<Vec<_>>>()?;
                    Ok(SaveAction::Join(format!(
                        "JOIN {}_{} parent={} children={:?}",
                        owner, related.relation, parent, children
                    )))
                })
                .collect::<Vec<_>>()
        });
        Box::new(rows.chain(joins))
    }

    fn generate_delete(&self, object: &Object, ids: &IdentityMap) -> Result<Vec<DeleteAction>> {
        let Some(id) = ids.get(object) else {
            return Ok(Vec::new());
        };
        let def = object.definition();
        let mut actions = Vec::new();
        for related in object.related() {
            actions.push(DeleteAction::Join(format!(
                "DELETE JOIN {}_{} parent={}",
                def.name, related.relation, id
            )));
            if def.relation(related.relation).is_some_and(|r| r.cascade_delete) {
                actions.extend(related.objects.into_iter().map(DeleteAction::Child));
            }
        }
        actions.push(DeleteAction::Row {
            sql: format!("DELETE {} id={}", def.name, id),
            type_id: type_of(object),
            id,
        });
        Ok(actions)
    }
}

fn missing_id(entity: &str, relation: &str) -> ExError {
    StowageError::MissingRelatedId {
        entity: entity.to_string(),
        relation: relation.to_string(),
    }
    .into()
}

pub struct FakeTables;

impl TableStatementGenerator for FakeTables {
    fn generate_create_statements(&self, types: &[&'static EntityDef]) -> Result<Vec<String>> {
        Ok(types.iter().map(|def| format!("CREATE {}", def.name)).collect())
    }
}

pub const UPGRADE_QUERY: &str = "INSPECT schema";

/// Inspects the schema once, alters `note`, then asks for `missing` to be created
pub struct FakeUpgrade {
    pub missing: Vec<&'static EntityDef>,
}

impl UpgradeManager for FakeUpgrade {
    fn upgrade(
        &self,
        _types: &[&'static EntityDef],
        source: &mut dyn RowSource,
    ) -> Result<Vec<UpgradeAction>> {
        source.fetch(UPGRADE_QUERY)?;
        let mut actions = vec![UpgradeAction::Raw("ALTER note ADD extra".to_string())];
        if !self.missing.is_empty() {
            actions.push(UpgradeAction::CreateMissing(self.missing.clone()));
        }
        Ok(actions)
    }
}

pub fn children_query(owner: &str, relation: &str, id: i64) -> String {
    format!("CHILDREN {}_{} parent={}", owner, relation, id)
}

/// Builds registered entities, fetching relation members with [`children_query`]
pub struct FakeHydrator {
    pub registry: EntityRegistry,
}

impl FakeHydrator {
    fn build(
        &self,
        def: &'static EntityDef,
        row: &ResultRow,
        fetch: &mut dyn RowSource,
        discovered: &mut Vec<(Object, i64)>,
    ) -> Result<Object> {
        let id = row.id().unwrap_or_default();
        let values = def
            .columns
            .iter()
            .map(|c| row.get(c.name).cloned().unwrap_or(Value::Null))
            .collect();
        let mut hydrated = HydratedRow::new(def, id, values);
        for relation in def.relations {
            let target = self.registry.by_name(relation.target)?.definition;
            let mut members = Vec::new();
            for child_row in fetch.fetch(&children_query(def.name, relation.name, id))? {
                members.push(self.build(target, &child_row, fetch, discovered)?);
            }
            hydrated = hydrated.with_related(relation.name, members);
        }
        let object = self.registry.by_name(def.name)?.build(hydrated)?;
        discovered.push((object.clone(), id));
        Ok(object)
    }
}

impl ClassHydrator for FakeHydrator {
    fn hydrate(
        &self,
        entity: &'static EntityDef,
        rows: Vec<ResultRow>,
        fetch: &mut dyn RowSource,
    ) -> Result<Hydration> {
        let mut hydration = Hydration::default();
        for row in &rows {
            let object = self.build(entity, row, fetch, &mut hydration.discovered)?;
            hydration.objects.push(object);
        }
        Ok(hydration)
    }
}

// ========== Finders ==========

/// Finder that parks inside bootstrap until the test lets it go
pub struct GatedFinder {
    pub inner: EntityRegistry,
    pub entered: Mutex<Sender<()>>,
    pub release: Mutex<Receiver<()>>,
}

impl ClassFinder for GatedFinder {
    fn find_types(&self, config: &dyn Config) -> Vec<&'static EntityDef> {
        let _ = self.entered.lock().send(());
        let _ = self.release.lock().recv();
        self.inner.find_types(config)
    }
}

// ========== Assembly ==========

pub fn collaborators(runner: Arc<RecordingRunner>, config: StaticConfig) -> Collaborators {
    let registry = registry();
    Collaborators {
        finder: Arc::new(registry.clone()),
        generator: Arc::new(FakeGenerator),
        tables: Arc::new(FakeTables),
        upgrade: Arc::new(FakeUpgrade {
            missing: Vec::new(),
        }),
        hydrator: Arc::new(FakeHydrator { registry }),
        runner,
        config: Arc::new(config),
        logger: Arc::new(TracingSqlLogger),
    }
}

/// A ready orchestrator over a fresh recording runner
pub fn ready() -> (stowage_core::Orchestrator, Arc<RecordingRunner>) {
    let runner = RecordingRunner::new();
    let orchestrator = stowage_core::initialize(collaborators(runner.clone(), StaticConfig::default()))
        .expect("bootstrap with no flags cannot fail");
    (orchestrator, runner)
}

pub fn note(body: &str) -> Object {
    Arc::new(Note::new(body))
}

pub fn folder(name: &str, notes: Vec<Object>) -> Object {
    Arc::new(Folder {
        name: name.to_string(),
        notes,
    })
}

pub fn text_row(id: i64, column: &str, text: &str) -> ResultRow {
    ResultRow::from_pairs([("id", Value::Integer(id)), (column, Value::from(text))])
}
