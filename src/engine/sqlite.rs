//! Embedded relational backend on SQLite.
//!
//! In-memory databases have a single connection shared by the engine and its sessions. File-backed
//! databases open a dedicated connection per session with `BEGIN IMMEDIATE`, so a session holds
//! the write lock from its first statement.

use super::{Backend, BackendKind, Row};
use crate::{
    Error, Result, Value,
    config::EmbeddedConfig,
    context::Context,
    cursor::RawCursor,
    identity::ObjectId,
    schema::utils::{is_zero, value_to_string},
    translate::{SqlQuery, SqlTranslator, sql::quote},
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use rusqlite::{
    Connection, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tracing::{debug, error, info, warn};

/// Rows fetched per round trip by a cursor
const CURSOR_BATCH: usize = 256;

/// Column carrying the rowid of each row a cursor fetches, removed before the row is handed out
const CURSOR_ROWID: &str = "__lupaorm_rowid";

#[derive(Clone, Debug)]
pub struct SqliteEngine {
    /// `None` for in-memory databases
    path: Option<PathBuf>,
    busy_timeout: Duration,
    connection: Arc<Mutex<Connection>>,
}

fn is_memory_path(path: &str) -> bool {
    return path == ":memory:" || path.is_empty() || path.contains("mode=memory");
}

impl SqliteEngine {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        return Self::open_with(&EmbeddedConfig {
            file_path: path.display().to_string(),
            ..Default::default()
        });
    }

    pub fn open_in_memory() -> Result<Self> { Self::open_with(&EmbeddedConfig::default()) }

    pub fn open_with(config: &EmbeddedConfig) -> Result<Self> {
        let busy_timeout = config.busy_timeout()?;

        let (path, connection) = match is_memory_path(&config.file_path) {
            true => (None, Connection::open_in_memory()?),
            false => {
                let path = PathBuf::from(&config.file_path);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    crate::utils::try_create_dir(parent)?;
                }
                (Some(path.clone()), Connection::open(&path)?)
            }
        };
        connection.busy_timeout(busy_timeout)?;

        info!(
            "Opened SQLite database at [{}].",
            path.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| String::from(":memory:"))
        );

        return Ok(Self {
            path,
            busy_timeout,
            connection: Arc::new(Mutex::new(connection)),
        });
    }

    pub fn is_in_memory(&self) -> bool { self.path.is_none() }

    /// Runs one or more `;`-separated statements, such as schema migrations.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!("{sql}");
        return Ok(self.connection.lock().execute_batch(sql)?);
    }

    pub fn handle(&self) -> SqliteHandle {
        return SqliteHandle {
            engine: self.clone(),
            transaction: None,
        };
    }

    pub fn close(self) -> Result<()> {
        let Ok(connection) = Arc::try_unwrap(self.connection) else {
            info!("SQLite connection still shared, it closes with its last handle.");
            return Ok(());
        };

        return connection
            .into_inner()
            .close()
            .map_err(|(_, e)| Error::Sqlite(e));
    }
}

/// An open transaction; rolled back on drop unless finalized.
#[derive(Debug)]
struct SqliteTransaction {
    connection: Arc<Mutex<Connection>>,
    finalized: AtomicBool,
}

impl SqliteTransaction {
    fn finish(&self, statement: &str) -> Result<()> {
        if self.finalized.swap(true, Ordering::AcqRel) {
            return Err(Error::TransactionFinalized);
        }

        return Ok(self.connection.lock().execute_batch(statement)?);
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.finalized.load(Ordering::Acquire) {
            return;
        }

        warn!("Transaction dropped without being finalized, rolling back.");
        if let Err(e) = self.connection.lock().execute_batch("ROLLBACK") {
            error!("Rollback of a dropped transaction failed, caused by: [{e}]");
        }
    }
}

#[derive(Clone, Debug)]
pub struct SqliteHandle {
    engine: SqliteEngine,
    transaction: Option<Arc<SqliteTransaction>>,
}

fn to_sql_value(value: &Value) -> SqlValue {
    if let Some(id) = ObjectId::from_value(value) {
        return SqlValue::Text(id.to_hex());
    }

    return match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    };
}

fn from_sql_value(value: ValueRef<'_>) -> Value {
    return match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    };
}

fn logged<T>(sql: &str, result: rusqlite::Result<T>) -> Result<T> {
    return result.map_err(|e| {
        error!("SQLite statement [{sql}] failed, caused by: [{e}]");
        return Error::Sqlite(e);
    });
}

fn execute(connection: &Connection, sql: &str, params: &[Value]) -> Result<u64> {
    debug!(params = ?params, "{sql}");
    let changed = logged(
        sql,
        connection.execute(sql, params_from_iter(params.iter().map(to_sql_value))),
    )?;

    return Ok(changed as u64);
}

fn query_rows(connection: &Connection, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
    debug!(params = ?params, "{sql}");
    let mut statement = logged(sql, connection.prepare(sql))?;
    let columns = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();

    let mut rows = logged(
        sql,
        statement.query(params_from_iter(params.iter().map(to_sql_value))),
    )?;

    let mut collected = Vec::new();
    while let Some(row) = logged(sql, rows.next())? {
        let mut record = Row::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            let value = logged(sql, row.get_ref(index))?;
            record.insert(column.clone(), from_sql_value(value));
        }
        collected.push(record);
    }

    return Ok(collected);
}

fn query_rowids(connection: &Connection, sql: &str, params: &[Value]) -> Result<Vec<i64>> {
    debug!(params = ?params, "{sql}");
    let mut statement = logged(sql, connection.prepare(sql))?;
    let rowids = logged(
        sql,
        statement
            .query_map(params_from_iter(params.iter().map(to_sql_value)), |row| {
                row.get::<_, i64>(0)
            })
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
    )?;

    return Ok(rowids);
}

impl SqliteHandle {
    /// Connection verbs run on, refused once the bound transaction is finalized.
    fn connection(&self) -> Result<&Arc<Mutex<Connection>>> {
        return match &self.transaction {
            Some(transaction) if transaction.finalized.load(Ordering::Acquire) => {
                Err(Error::TransactionFinalized)
            }
            Some(transaction) => Ok(&transaction.connection),
            None => Ok(&self.engine.connection),
        };
    }

    /// Runs a savepoint statement on the open transaction's connection.
    fn savepoint_statement(&self, statement: &str) -> Result<()> {
        self.transaction()?;
        debug!("{statement}");

        let connection = self.connection()?.lock();
        return logged(statement, connection.execute_batch(statement));
    }

    fn transaction(&self) -> Result<&SqliteTransaction> {
        return self.transaction.as_deref().ok_or(Error::Execution {
            backend: Self::NAME,
            reason: String::from("no transaction in progress"),
        });
    }
}

impl Backend for SqliteHandle {
    const NAME: &'static str = "SQLite";
    const KIND: BackendKind = BackendKind::Relational;

    type Translator = SqlTranslator;

    fn insert(&self, context: &Context, table: &str, row: Row, identity: &str) -> Result<String> {
        context.check()?;

        let (sql, params) = SqlQuery::insert(table, &row);
        let connection = self.connection()?.lock();
        execute(&connection, &sql, &params)?;

        return Ok(match row.get(identity) {
            Some(id) if !is_zero(id) => value_to_string(id),
            _ => connection.last_insert_rowid().to_string(),
        });
    }

    fn update(&self, context: &Context, table: &str, query: &SqlQuery, delta: Row) -> Result<u64> {
        context.check()?;

        let (sql, params) = query.update(table, &delta);
        return execute(&self.connection()?.lock(), &sql, &params);
    }

    fn delete(&self, context: &Context, table: &str, query: &SqlQuery) -> Result<u64> {
        context.check()?;

        let (sql, params) = query.delete(table);
        return execute(&self.connection()?.lock(), &sql, &params);
    }

    fn count(&self, context: &Context, table: &str, query: &SqlQuery) -> Result<u64> {
        context.check()?;

        let (sql, params) = query.count(table);
        debug!(params = ?params, "{sql}");

        let connection = self.connection()?.lock();
        let count = logged(
            &sql,
            connection.query_row(
                &sql,
                params_from_iter(params.iter().map(to_sql_value)),
                |row| row.get::<_, i64>(0),
            ),
        )?;

        return Ok(count.max(0) as u64);
    }

    fn find(
        &self,
        context: &Context,
        table: &str,
        query: &SqlQuery,
    ) -> Result<Box<dyn RawCursor>> {
        context.check()?;

        let connection = self.connection()?.clone();
        let (sql, params) = query.select_rowids(table);
        let rowids = query_rowids(&connection.lock(), &sql, &params)?;

        return Ok(Box::new(SqliteCursor {
            connection,
            table: table.to_string(),
            rowids: rowids.into(),
            buffered: VecDeque::new(),
        }));
    }

    fn begin(&self) -> Result<Self> {
        if self.transaction.is_some() {
            return Err(Error::Execution {
                backend: Self::NAME,
                reason: String::from("nested sessions are not supported"),
            });
        }

        let connection = match &self.engine.path {
            None => {
                self.engine.connection.lock().execute_batch("BEGIN")?;
                self.engine.connection.clone()
            }
            Some(path) => {
                let connection = Connection::open(path)?;
                connection.busy_timeout(self.engine.busy_timeout)?;
                connection.execute_batch("BEGIN IMMEDIATE")?;
                Arc::new(Mutex::new(connection))
            }
        };
        debug!("Transaction started.");

        return Ok(Self {
            engine: self.engine.clone(),
            transaction: Some(Arc::new(SqliteTransaction {
                connection,
                finalized: AtomicBool::new(false),
            })),
        });
    }

    fn commit(&self) -> Result<()> {
        let transaction = self.transaction()?;

        return match transaction.finish("COMMIT") {
            Err(Error::Sqlite(e)) => {
                error!("Commit failed, rolling back, caused by: [{e}]");
                if let Err(rollback) = transaction.connection.lock().execute_batch("ROLLBACK") {
                    return Err(Error::TransactionRollbackFailure {
                        reason: rollback.to_string(),
                    });
                }

                Err(Error::TransactionCommitFailure {
                    reason: e.to_string(),
                })
            }
            outcome => outcome,
        };
    }

    fn rollback(&self) -> Result<()> {
        return match self.transaction()?.finish("ROLLBACK") {
            Err(Error::Sqlite(e)) => Err(Error::TransactionRollbackFailure {
                reason: e.to_string(),
            }),
            outcome => outcome,
        };
    }

    fn savepoint(&self, name: &str) -> Result<()> {
        return self.savepoint_statement(&format!("SAVEPOINT {}", quote(name)));
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        let name = quote(name);
        return self.savepoint_statement(&format!("ROLLBACK TO {name}; RELEASE {name}"));
    }

    fn release_savepoint(&self, name: &str) -> Result<()> {
        return self.savepoint_statement(&format!("RELEASE {}", quote(name)));
    }

    fn in_transaction(&self) -> bool { self.transaction.is_some() }
}

/// Walks the rowids matched when the cursor opened, loading rows [`CURSOR_BATCH`] at a time.
///
/// Rows deleted since the cursor opened are skipped, rows inserted since are never visited.
struct SqliteCursor {
    connection: Arc<Mutex<Connection>>,
    table: String,
    rowids: VecDeque<i64>,
    buffered: VecDeque<Row>,
}

impl SqliteCursor {
    fn fetch(&mut self) -> Result<()> {
        let batch = self.rowids.len().min(CURSOR_BATCH);
        let rowids = self.rowids.drain(..batch).collect::<Vec<_>>();

        let sql = SqlQuery::select_by_rowids(&self.table, CURSOR_ROWID, rowids.len());
        let params = rowids.iter().map(|rowid| Value::from(*rowid)).collect::<Vec<_>>();

        let mut loaded = HashMap::with_capacity(rowids.len());
        for mut row in query_rows(&self.connection.lock(), &sql, &params)? {
            if let Some(rowid) = row.shift_remove(CURSOR_ROWID).and_then(|v| v.as_i64()) {
                loaded.insert(rowid, row);
            }
        }

        self.buffered
            .extend(rowids.iter().filter_map(|rowid| loaded.remove(rowid)));

        return Ok(());
    }
}

impl RawCursor for SqliteCursor {
    fn next_row(&mut self) -> Result<Option<Row>> {
        while self.buffered.is_empty() && !self.rowids.is_empty() {
            self.fetch()?;
        }

        return Ok(self.buffered.pop_front());
    }

    fn close(&mut self) -> Result<()> {
        self.buffered.clear();
        self.rowids.clear();
        return Ok(());
    }
}
