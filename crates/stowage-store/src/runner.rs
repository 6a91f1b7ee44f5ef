//! Statement runner over a single SQLite connection

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use stowage_core::{ResultRow, StatementRunner, Ticket, Value};

use crate::errors::{from_rusqlite, statement_failed, Result};

struct Session {
    conn: Connection,
    depth: usize,
}

/// Runs statements for the current ticket holder
///
/// The mutex only exists because `Connection` is not `Sync`; the ticket
/// already guarantees a single caller. Transactions nest by depth: the
/// outermost begin opens the SQLite transaction, the matching end commits it
/// and a rollback at any depth aborts the whole thing.
pub struct SqliteRunner {
    session: Mutex<Session>,
}

impl SqliteRunner {
    pub fn new(conn: Connection) -> Self {
        Self {
            session: Mutex::new(Session { conn, depth: 0 }),
        }
    }

    /// Whether a transaction is currently open
    pub fn in_transaction(&self) -> bool {
        self.session.lock().depth > 0
    }
}

impl StatementRunner for SqliteRunner {
    fn begin_transaction(&self, ticket: &Ticket) -> Result<()> {
        let mut session = self.session.lock();
        if session.depth == 0 {
            session.conn.execute_batch("BEGIN").map_err(from_rusqlite)?;
            tracing::trace!(ticket = ticket.serial(), "transaction opened");
        }
        session.depth += 1;
        Ok(())
    }

    fn end_transaction(&self, ticket: &Ticket) -> Result<()> {
        let mut session = self.session.lock();
        match session.depth {
            0 => Ok(()),
            1 => {
                session.conn.execute_batch("COMMIT").map_err(from_rusqlite)?;
                session.depth = 0;
                tracing::trace!(ticket = ticket.serial(), "transaction committed");
                Ok(())
            }
            _ => {
                session.depth -= 1;
                Ok(())
            }
        }
    }

    fn rollback_transaction(&self, ticket: &Ticket) -> Result<()> {
        let mut session = self.session.lock();
        if session.depth == 0 {
            return Ok(());
        }
        session.depth = 0;
        // a failed COMMIT may already have ended the transaction
        if session.conn.is_autocommit() {
            return Ok(());
        }
        session
            .conn
            .execute_batch("ROLLBACK")
            .map_err(from_rusqlite)?;
        tracing::trace!(ticket = ticket.serial(), "transaction rolled back");
        Ok(())
    }

    fn execute_raw(&self, _ticket: &Ticket, sql: &str) -> Result<()> {
        let session = self.session.lock();
        session
            .conn
            .execute_batch(sql)
            .map_err(|e| statement_failed(sql, e))
    }

    fn execute_query(&self, _ticket: &Ticket, sql: &str) -> Result<Vec<ResultRow>> {
        let session = self.session.lock();
        query_rows(&session.conn, sql).map_err(|e| statement_failed(sql, e))
    }

    fn execute_insert_and_get_id(&self, _ticket: &Ticket, sql: &str) -> Result<i64> {
        let session = self.session.lock();
        session
            .conn
            .execute(sql, [])
            .map_err(|e| statement_failed(sql, e))?;
        Ok(session.conn.last_insert_rowid())
    }
}

fn query_rows(conn: &Connection, sql: &str) -> rusqlite::Result<Vec<ResultRow>> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Arc<[String]> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let width = columns.len();

    let mut rows = stmt.query([])?;
    let mut result = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..width)
            .map(|i| row.get_ref(i).map(to_value))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        result.push(ResultRow::new(Arc::clone(&columns), values));
    }
    Ok(result)
}

fn to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::OperationQueue;

    fn runner() -> SqliteRunner {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, v TEXT)")
            .unwrap();
        SqliteRunner::new(conn)
    }

    #[test]
    fn test_insert_returns_new_id_and_query_reads_it() {
        let queue = OperationQueue::new().unwrap();
        let ticket = queue.acquire_blocking();
        let runner = runner();

        let first = runner
            .execute_insert_and_get_id(&ticket, "INSERT INTO t (v) VALUES ('a')")
            .unwrap();
        let second = runner
            .execute_insert_and_get_id(&ticket, "INSERT INTO t (v) VALUES (NULL)")
            .unwrap();
        assert_eq!((first, second), (1, 2));

        let rows = runner
            .execute_query(&ticket, "SELECT id, v FROM t ORDER BY id")
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("v"), Some(&Value::Text("a".to_string())));
        assert_eq!(rows[1].get("v"), Some(&Value::Null));
    }

    #[test]
    fn test_nested_transactions_commit_once() {
        let queue = OperationQueue::new().unwrap();
        let ticket = queue.acquire_blocking();
        let runner = runner();

        runner.begin_transaction(&ticket).unwrap();
        runner.begin_transaction(&ticket).unwrap();
        runner
            .execute_raw(&ticket, "INSERT INTO t (v) VALUES ('x')")
            .unwrap();
        runner.end_transaction(&ticket).unwrap();
        assert!(runner.in_transaction());
        runner.end_transaction(&ticket).unwrap();
        assert!(!runner.in_transaction());

        let rows = runner.execute_query(&ticket, "SELECT * FROM t").unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_rollback_discards_work() {
        let queue = OperationQueue::new().unwrap();
        let ticket = queue.acquire_blocking();
        let runner = runner();

        runner.begin_transaction(&ticket).unwrap();
        runner
            .execute_raw(&ticket, "INSERT INTO t (v) VALUES ('gone')")
            .unwrap();
        runner.rollback_transaction(&ticket).unwrap();

        assert!(!runner.in_transaction());
        assert!(runner.execute_query(&ticket, "SELECT * FROM t").unwrap().is_empty());
    }

    #[test]
    fn test_failure_carries_statement() {
        let queue = OperationQueue::new().unwrap();
        let ticket = queue.acquire_blocking();
        let runner = runner();

        let err = runner
            .execute_raw(&ticket, "INSERT INTO missing VALUES (1)")
            .unwrap_err();

        assert_eq!(err.code(), "ERR_STATEMENT_EXECUTION");
        assert_eq!(err.statement(), Some("INSERT INTO missing VALUES (1)"));
    }
}
