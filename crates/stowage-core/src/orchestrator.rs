//! Persistence orchestrator
//!
//! Every operation runs under one ticket from the [`OperationQueue`]: the
//! orchestrator acquires it, asks its collaborators for statements, runs them
//! through the [`StatementRunner`], keeps the [`IdentityMap`] current and
//! releases the ticket before reporting back. Save and delete wrap all of
//! their statements in a single transaction; on failure the runner rolls the
//! transaction back and the error goes to the caller unchanged.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use stowage_core_types::RequestId;
use tokio::sync::oneshot;

use crate::bootstrap::SchemaState;
use crate::collaborators::{Collaborators, DeleteAction, RowSource, SaveAction};
use crate::errors::{ExError, Result, StowageError};
use crate::identity::IdentityMap;
use crate::model::{address_of, downcast, Object, ResultRow};
use crate::queue::{OperationQueue, Ticket};
use crate::schema::{Entity, EntityDef};
use crate::{log_op_end, log_op_error, log_op_start};

/// Handle to a persistence orchestrator
///
/// Cloning yields another handle to the same queue, identity map and
/// collaborators.
#[derive(Clone)]
pub struct Orchestrator {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) queue: OperationQueue,
    pub(crate) ids: IdentityMap,
    pub(crate) state: RwLock<SchemaState>,
    pub(crate) collab: Collaborators,
}

impl Orchestrator {
    /// Create an orchestrator that has not bootstrapped yet
    ///
    /// Every operation fails with `NotInitialized` until
    /// [`bootstrap`](Orchestrator::bootstrap) completes. Most callers want
    /// [`initialize`](crate::bootstrap::initialize) instead.
    pub fn new(collaborators: Collaborators) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner {
                queue: OperationQueue::new()?,
                ids: IdentityMap::new(),
                state: RwLock::new(SchemaState::Uninitialized),
                collab: collaborators,
            }),
        })
    }

    pub fn state(&self) -> SchemaState {
        *self.inner.state.read()
    }

    pub fn identity_map(&self) -> &IdentityMap {
        &self.inner.ids
    }

    /// Row id of an object, if it has been saved or loaded through this orchestrator
    pub fn id_of(&self, object: &Object) -> Option<i64> {
        self.inner.ids.get(object)
    }

    /// Save objects in one transaction, blocking until done
    ///
    /// Objects without a known id are inserted and receive one; the others
    /// are updated in place.
    ///
    /// Ids are recorded as each insert returns and stay recorded when a later
    /// statement fails and the transaction rolls back. Retrying the same
    /// objects then updates rows that no longer exist, which SQLite accepts
    /// as a no-op. Recover by saving fresh instances or reopening the store.
    pub fn save(&self, objects: &[Object]) -> Result<()> {
        self.run_blocking("save", objects.len(), |inner, ticket| {
            inner.save_all(ticket, objects)
        })
    }

    /// Queue a save and return immediately
    ///
    /// `on_complete` runs on the queue's dispatcher thread after the ticket
    /// has been released.
    pub fn save_async<F>(&self, objects: Vec<Object>, on_complete: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let count = objects.len();
        self.submit("save", count, on_complete, move |inner, ticket| {
            inner.save_all(ticket, &objects)
        });
    }

    /// Queue a save and resolve when it completes
    ///
    /// The save is queued when this is called, not when the future is polled.
    pub fn save_future(&self, objects: Vec<Object>) -> impl Future<Output = Result<()>> + Send {
        let (tx, rx) = oneshot::channel();
        self.save_async(objects, move |result| {
            let _ = tx.send(result);
        });
        completion(rx)
    }

    /// Delete objects in one transaction, blocking until done
    ///
    /// Related objects declared as cascading are deleted first. Objects with
    /// no known id are skipped.
    pub fn delete(&self, objects: &[Object]) -> Result<()> {
        self.run_blocking("delete", objects.len(), |inner, ticket| {
            inner.delete_all(ticket, objects)
        })
    }

    /// Queue a delete and return immediately
    pub fn delete_async<F>(&self, objects: Vec<Object>, on_complete: F)
    where
        F: FnOnce(Result<()>) + Send + 'static,
    {
        let count = objects.len();
        self.submit("delete", count, on_complete, move |inner, ticket| {
            inner.delete_all(ticket, &objects)
        });
    }

    /// Queue a delete and resolve when it completes
    pub fn delete_future(&self, objects: Vec<Object>) -> impl Future<Output = Result<()>> + Send {
        let (tx, rx) = oneshot::channel();
        self.delete_async(objects, move |result| {
            let _ = tx.send(result);
        });
        completion(rx)
    }

    /// Run a query and build an entity from every returned row
    ///
    /// Results keep the order of the query's rows. Every object built along
    /// the way, related ones included, is recorded in the identity map.
    pub fn load<T: Entity>(&self, query: &str) -> Result<Vec<Arc<T>>> {
        let objects = self.load_objects(T::entity_def(), query)?;
        objects.into_iter().map(downcast::<T>).collect()
    }

    /// Untyped form of [`load`](Orchestrator::load)
    pub fn load_objects(&self, entity: &'static EntityDef, query: &str) -> Result<Vec<Object>> {
        self.run_blocking("load", 0, |inner, ticket| {
            inner.load_with_ticket(ticket, entity, query)
        })
    }

    fn run_blocking<T>(
        &self,
        op: &'static str,
        object_count: usize,
        work: impl FnOnce(&Inner, &Ticket) -> Result<T>,
    ) -> Result<T> {
        let request_id = RequestId::new();
        let started = Instant::now();
        log_op_start!(op, request_id = %request_id, object_count = object_count);

        let ticket = self.inner.queue.acquire_blocking();
        let result = self
            .inner
            .ensure_ready()
            .and_then(|()| work(&*self.inner, &ticket));
        self.inner.queue.release(ticket);

        finish(op, &request_id, started, result)
    }

    fn submit<F, W>(&self, op: &'static str, object_count: usize, on_complete: F, work: W)
    where
        F: FnOnce(Result<()>) + Send + 'static,
        W: FnOnce(&Inner, &Ticket) -> Result<()> + Send + 'static,
    {
        let request_id = RequestId::new();
        let started = Instant::now();
        log_op_start!(op, request_id = %request_id, object_count = object_count, mode = "async");

        let callback = Arc::new(Mutex::new(Some(on_complete)));
        let job_callback = Arc::clone(&callback);
        let job_request_id = request_id.clone();
        let inner = Arc::clone(&self.inner);

        let submitted = self.inner.queue.acquire_async(move |ticket| {
            let result = inner.ensure_ready().and_then(|()| work(&*inner, &ticket));
            inner.queue.release(ticket);
            let result = finish(op, &job_request_id, started, result);
            if let Some(on_complete) = job_callback.lock().take() {
                on_complete(result);
            }
        });

        if let Err(err) = submitted {
            let result = finish(op, &request_id, started, Err(err));
            if let Some(on_complete) = callback.lock().take() {
                on_complete(result);
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state())
            .field("queue", &self.inner.queue)
            .field("ids", &self.inner.ids)
            .finish()
    }
}

async fn completion(rx: oneshot::Receiver<Result<()>>) -> Result<()> {
    rx.await
        .unwrap_or_else(|_| Err(StowageError::OperationAbandoned.into()))
}

/// Close an operation's log boundary and stamp its error
pub(crate) fn finish<T>(
    op: &'static str,
    request_id: &RequestId,
    started: Instant,
    result: Result<T>,
) -> Result<T> {
    let duration_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(value) => {
            log_op_end!(op, duration_ms = duration_ms, request_id = %request_id);
            Ok(value)
        }
        Err(err) => {
            let err = if err.op().is_none() { err.with_op(op) } else { err };
            let err = err.with_request_id(request_id.clone());
            log_op_error!(op, err.clone(), duration_ms = duration_ms, request_id = %request_id);
            Err(err)
        }
    }
}

/// Fetches rows on behalf of a collaborator with the caller's ticket
pub(crate) struct TicketFetch<'a> {
    pub(crate) inner: &'a Inner,
    pub(crate) ticket: &'a Ticket,
}

impl RowSource for TicketFetch<'_> {
    fn fetch(&mut self, sql: &str) -> Result<Vec<ResultRow>> {
        self.inner.query(self.ticket, sql)
    }
}

impl Inner {
    pub(crate) fn ensure_ready(&self) -> Result<()> {
        let state = *self.state.read();
        if state == SchemaState::Ready {
            Ok(())
        } else {
            Err(StowageError::NotInitialized {
                state: state.to_string(),
            }
            .into())
        }
    }

    /// Run `work` inside one transaction, rolling back if it fails
    pub(crate) fn transaction<T>(
        &self,
        ticket: &Ticket,
        work: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let runner = &self.collab.runner;
        runner.begin_transaction(ticket)?;
        let result = work().and_then(|value| runner.end_transaction(ticket).map(|()| value));
        if let Err(err) = &result {
            tracing::debug!(ticket = ticket.serial(), err.code = err.code(), "rolling back");
            if let Err(rollback) = runner.rollback_transaction(ticket) {
                tracing::warn!(
                    ticket = ticket.serial(),
                    err.code = rollback.code(),
                    "rollback failed: {}",
                    rollback
                );
            }
        }
        result
    }

    pub(crate) fn execute_raw(&self, ticket: &Ticket, sql: &str) -> Result<()> {
        self.collab.logger.log_sql(sql);
        self.collab.runner.execute_raw(ticket, sql)
    }

    pub(crate) fn query(&self, ticket: &Ticket, sql: &str) -> Result<Vec<ResultRow>> {
        self.collab.logger.log_sql(sql);
        self.collab.runner.execute_query(ticket, sql)
    }

    fn insert(&self, ticket: &Ticket, sql: &str) -> Result<i64> {
        self.collab.logger.log_sql(sql);
        self.collab.runner.execute_insert_and_get_id(ticket, sql)
    }

    fn save_all(&self, ticket: &Ticket, objects: &[Object]) -> Result<()> {
        self.transaction(ticket, || {
            objects
                .iter()
                .try_for_each(|object| self.save_one(ticket, object))
        })
    }

    fn save_one(&self, ticket: &Ticket, object: &Object) -> Result<()> {
        let actions = self
            .collab
            .generator
            .generate_save_or_update(object, &self.ids);
        for action in actions {
            match action? {
                SaveAction::Join(sql) | SaveAction::Row(sql) => self.execute_raw(ticket, &sql)?,
                SaveAction::Insert { sql, object } => {
                    let id = self.insert(ticket, &sql)?;
                    self.ids.put(&object, id);
                    tracing::debug!(
                        entity = object.definition().name,
                        row_id = id,
                        "assigned row id"
                    );
                }
            }
        }
        Ok(())
    }

    fn delete_all(&self, ticket: &Ticket, objects: &[Object]) -> Result<()> {
        let mut visited = HashSet::new();
        self.transaction(ticket, || {
            objects
                .iter()
                .try_for_each(|object| self.delete_one(ticket, object, &mut visited))
        })
    }

    fn delete_one(
        &self,
        ticket: &Ticket,
        object: &Object,
        visited: &mut HashSet<usize>,
    ) -> Result<()> {
        if !visited.insert(address_of(object)) {
            return Ok(());
        }
        let actions = self.collab.generator.generate_delete(object, &self.ids)?;
        if actions.is_empty() {
            tracing::debug!(entity = object.definition().name, "object was never persisted");
        }
        for action in actions {
            match action {
                DeleteAction::Join(sql) => self.execute_raw(ticket, &sql)?,
                DeleteAction::Child(child) => self.delete_one(ticket, &child, visited)?,
                DeleteAction::Row { sql, type_id, id } => {
                    self.execute_raw(ticket, &sql)?;
                    let removed = self.ids.remove_matching(type_id, id);
                    tracing::debug!(
                        entity = object.definition().name,
                        row_id = id,
                        removed = removed,
                        "row deleted"
                    );
                }
            }
        }
        Ok(())
    }

    fn load_with_ticket(
        &self,
        ticket: &Ticket,
        entity: &'static EntityDef,
        query: &str,
    ) -> Result<Vec<Object>> {
        let rows = self.query(ticket, query)?;
        let mut fetch = TicketFetch {
            inner: self,
            ticket,
        };
        let hydration = self
            .collab
            .hydrator
            .hydrate(entity, rows, &mut fetch)
            .map_err(|err| with_entity(err, entity))?;
        for (object, id) in &hydration.discovered {
            self.ids.put(object, *id);
        }
        tracing::debug!(
            entity = entity.name,
            rows = hydration.objects.len(),
            discovered = hydration.discovered.len(),
            "hydrated"
        );
        Ok(hydration.objects)
    }
}

fn with_entity(err: ExError, entity: &EntityDef) -> ExError {
    if err.entity().is_none() {
        err.with_entity(entity.name)
    } else {
        err
    }
}
