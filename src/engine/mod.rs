//! Storage engines behind a [`Model`].
//!
//! An [`Engine`] is created once at startup (explicitly, or from a [`DBConfig`]) and handed to
//! every model built from it. Each engine exposes a [`Backend`] handle; session handles are the
//! same types bound to an open transaction.

pub mod document;
pub mod sqlite;

pub use document::{DocumentHandle, DocumentSession, DocumentStore};
pub use sqlite::{SqliteEngine, SqliteHandle};

use crate::{
    Error, Map, Result, Value,
    config::{BackendType, DBConfig},
    context::Context,
    cursor::RawCursor,
    model::Model,
    schema::Schema,
    translate::Translator,
};
use derive_more::Display;
use std::{fmt::Debug, path::Path};
use tracing::info;

/// Column-keyed record as exchanged with engines
pub type Row = Map<String, Value>;

/// Native query type of a backend
pub type NativeQuery<B> = <<B as Backend>::Translator as Translator>::Query;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Relational,
    Document,
}

/// Contract every engine handle fulfils for the model layer.
///
/// All methods check the [`Context`] before touching the engine. Handles returned by
/// [`Backend::begin`] run every call inside the opened transaction until it is committed or
/// rolled back.
pub trait Backend: Clone + Debug + Send + Sync + 'static {
    /// The name of the backend, used in logs and errors
    const NAME: &'static str;

    const KIND: BackendKind;

    type Translator: Translator;

    /// Inserts `row` and returns its identity, read from `identity` or assigned by the engine.
    fn insert(&self, context: &Context, table: &str, row: Row, identity: &str) -> Result<String>;

    fn update(
        &self,
        context: &Context,
        table: &str,
        query: &NativeQuery<Self>,
        delta: Row,
    ) -> Result<u64>;

    fn delete(&self, context: &Context, table: &str, query: &NativeQuery<Self>) -> Result<u64>;

    fn count(&self, context: &Context, table: &str, query: &NativeQuery<Self>) -> Result<u64>;

    fn find(
        &self,
        context: &Context,
        table: &str,
        query: &NativeQuery<Self>,
    ) -> Result<Box<dyn RawCursor>>;

    /// Opens a transaction and returns a handle bound to it.
    fn begin(&self) -> Result<Self>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Marks a point inside the open transaction that later writes can be rolled back to.
    fn savepoint(&self, name: &str) -> Result<()>;

    /// Undoes every write since the savepoint `name` and releases it.
    fn rollback_to_savepoint(&self, name: &str) -> Result<()>;

    fn release_savepoint(&self, name: &str) -> Result<()>;

    fn in_transaction(&self) -> bool;
}

/// Backend handle held by a model, chosen once when the model is built.
#[derive(Clone, Debug)]
pub(crate) enum Handle {
    Relational(SqliteHandle),
    Document(DocumentHandle),
}

/// Runs `$body` with `$backend` bound to the concrete handle inside `$handle`.
macro_rules! with_backend {
    ($handle:expr, $backend:ident => $body:expr) => {
        match $handle {
            $crate::engine::Handle::Relational($backend) => $body,
            $crate::engine::Handle::Document($backend) => $body,
        }
    };
}
pub(crate) use with_backend;

impl Handle {
    pub(crate) fn kind(&self) -> BackendKind {
        return match self {
            Self::Relational(_) => BackendKind::Relational,
            Self::Document(_) => BackendKind::Document,
        };
    }

    pub(crate) fn begin(&self) -> Result<Self> {
        return Ok(match self {
            Self::Relational(handle) => Self::Relational(handle.begin()?),
            Self::Document(handle) => Self::Document(handle.begin()?),
        });
    }

    pub(crate) fn commit(&self) -> Result<()> { with_backend!(self, handle => handle.commit()) }

    pub(crate) fn rollback(&self) -> Result<()> { with_backend!(self, handle => handle.rollback()) }

    pub(crate) fn savepoint(&self, name: &str) -> Result<()> {
        return with_backend!(self, handle => handle.savepoint(name));
    }

    pub(crate) fn rollback_to_savepoint(&self, name: &str) -> Result<()> {
        return with_backend!(self, handle => handle.rollback_to_savepoint(name));
    }

    pub(crate) fn release_savepoint(&self, name: &str) -> Result<()> {
        return with_backend!(self, handle => handle.release_savepoint(name));
    }

    pub(crate) fn in_transaction(&self) -> bool {
        return with_backend!(self, handle => handle.in_transaction());
    }
}

#[derive(Clone, Debug)]
pub enum Engine {
    Relational(SqliteEngine),
    Document(DocumentStore),
}

impl Engine {
    /// Opens the engine selected by `config.db.r#type`.
    pub fn connect(config: &DBConfig) -> Result<Self> {
        let backend = config.db.r#type;
        info!("Connecting to the [{backend}] backend.");

        return match backend {
            BackendType::Embedded => {
                let embedded = config.embedded.clone().unwrap_or_default();
                Ok(Self::Relational(SqliteEngine::open_with(&embedded)?))
            }
            BackendType::Document => {
                let document = config.document.clone().unwrap_or_default();
                Ok(Self::Document(DocumentStore::open_uri(&document.uri)?))
            }
            BackendType::Relational | BackendType::Mongodb => Err(Error::UnsupportedBackend {
                kind: backend.to_string(),
                reason: String::from(
                    "no network driver is linked, use the `embedded` or `document` backend",
                ),
            }),
        };
    }

    pub fn sqlite(path: impl AsRef<Path>) -> Result<Self> {
        return Ok(Self::Relational(SqliteEngine::open(path)?));
    }

    pub fn sqlite_in_memory() -> Result<Self> {
        return Ok(Self::Relational(SqliteEngine::open_in_memory()?));
    }

    /// Document store persisted one file per collection under `dir`
    pub fn document(dir: impl AsRef<Path>) -> Result<Self> {
        return Ok(Self::Document(DocumentStore::open(dir)?));
    }

    pub fn document_in_memory() -> Self { Self::Document(DocumentStore::in_memory()) }

    pub fn kind(&self) -> BackendKind {
        return match self {
            Self::Relational(_) => BackendKind::Relational,
            Self::Document(_) => BackendKind::Document,
        };
    }

    pub(crate) fn handle(&self) -> Handle {
        return match self {
            Self::Relational(engine) => Handle::Relational(engine.handle()),
            Self::Document(store) => Handle::Document(store.handle()),
        };
    }

    /// Model bound to the table of `T`
    pub fn model<T: Schema>(&self) -> Model { Model::new(self.handle(), Some(T::table_name())) }

    /// Model bound to a table by name
    pub fn table(&self, table: impl Into<String>) -> Model {
        return Model::new(self.handle(), Some(table.into()));
    }

    /// Model whose table is resolved from the first record it is given
    pub fn untyped(&self) -> Model { Model::new(self.handle(), None) }

    /// Flushes and releases the engine. Other clones keep working until they are dropped.
    pub fn close(self) -> Result<()> {
        return match self {
            Self::Relational(engine) => engine.close(),
            Self::Document(store) => store.close(),
        };
    }
}
