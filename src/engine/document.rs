//! In-process document backend.
//!
//! Collections are vectors of JSON documents keyed by name, optionally persisted as one
//! `<collection>.jsondb` file per collection. A session reads and writes a private copy of each
//! collection it touches and journals every write. Commit replays the journal against the live
//! collections under the store's write lock, so writes made outside the session are kept.

pub mod matcher;

use super::{Backend, BackendKind, Row};
use crate::{
    Error, Map, Result, Value,
    context::Context,
    cursor::{BufferedCursor, RawCursor},
    identity::{ObjectId, coerce_document_id},
    schema::utils::is_zero,
    translate::{DocumentQuery, DocumentTranslator},
    utils::{backup_failed_parse, try_create_dir, try_read_file, try_write_file},
};
use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::{Mutex, RwLock};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct DocumentStore {
    dir: Option<PathBuf>,
    collections: Arc<RwLock<HashMap<String, Vec<Row>>>>,
}

impl DocumentStore {
    const NAME: &'static str = "DocumentStore";
    const EXTENSION: &'static str = "jsondb";

    pub fn in_memory() -> Self {
        return Self {
            dir: None,
            collections: Default::default(),
        };
    }

    /// Opens (or creates) a store persisted under `dir`, loading every collection file found.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        try_create_dir(dir)?;

        let entries = std::fs::read_dir(dir).map_err(|e| Error::DBCorrupt {
            file_path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut collections = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            collections.insert(name.to_string(), Self::try_read_collection(&path)?);
        }

        info!(
            "Opened {} at [{}] with {} collection(s).",
            Self::NAME,
            dir.display(),
            collections.len()
        );

        return Ok(Self {
            dir: Some(dir.to_path_buf()),
            collections: Arc::new(RwLock::new(collections)),
        });
    }

    /// `memory://` (or empty) for an in-memory store, `file://<dir>` or a bare path for a
    /// persisted one.
    pub fn open_uri(uri: &str) -> Result<Self> {
        let uri = uri.trim();

        if uri.is_empty() || uri == "memory://" {
            return Ok(Self::in_memory());
        }
        if let Some(dir) = uri.strip_prefix("file://") {
            return Self::open(dir);
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(Error::UnsupportedBackend {
                kind: scheme.to_string(),
                reason: String::from("only `memory://` and `file://` document stores are built in"),
            });
        }

        return Self::open(uri);
    }

    pub fn handle(&self) -> DocumentHandle {
        return DocumentHandle {
            store: self.clone(),
            session: None,
        };
    }

    pub fn start_session(&self) -> DocumentSession { DocumentSession::default() }

    pub fn collection_names(&self) -> Vec<String> {
        return self.collections.read().keys().cloned().sorted().collect();
    }

    pub fn file_path(&self, collection: &str) -> Option<PathBuf> {
        return self
            .dir
            .as_ref()
            .map(|dir| dir.join(format!("{collection}.{}", Self::EXTENSION)));
    }

    fn try_write_collection(&self, collection: &str, documents: &[Row]) -> Result<()> {
        let Some(path) = self.file_path(collection) else {
            return Ok(());
        };

        let serialized =
            serde_json::to_vec(documents).map_err(|e| Error::SerializationFailure(Box::new(e)))?;

        return try_write_file(&serialized, path);
    }

    fn try_read_collection(path: &Path) -> Result<Vec<Row>> {
        let file_data = try_read_file(path)?;

        return serde_json::from_slice(&file_data).map_err(|e| backup_failed_parse(path, e));
    }

    /// Writes every collection to disk.
    pub fn flush(&self) -> Result<()> {
        let collections = self.collections.read();
        for (name, documents) in collections.iter() {
            self.try_write_collection(name, documents)?;
        }

        return Ok(());
    }

    pub fn close(self) -> Result<()> {
        self.flush()?;
        info!("Closed {}.", Self::NAME);
        return Ok(());
    }

    fn read<R>(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        f: impl FnOnce(&[Row]) -> Result<R>,
    ) -> Result<R> {
        if let Some(session) = session {
            let state = session.state.lock();
            if state.finalized {
                return Err(Error::TransactionFinalized);
            }
            if let Some(documents) = state.workspace.get(collection) {
                return f(documents);
            }
        }

        let collections = self.collections.read();
        return f(collections
            .get(collection)
            .map(Vec::as_slice)
            .unwrap_or_default());
    }

    fn write(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        write: Write,
    ) -> Result<u64> {
        if let Some(session) = session {
            let mut state = session.state.lock();
            if state.finalized {
                return Err(Error::TransactionFinalized);
            }

            let documents = state
                .workspace
                .entry(collection.to_string())
                .or_insert_with(|| {
                    let collections = self.collections.read();
                    return collections.get(collection).cloned().unwrap_or_default();
                });
            let outcome = write.apply(collection, documents)?;
            state.journal.push((collection.to_string(), write));

            return Ok(outcome);
        }

        let mut collections = self.collections.write();
        let mut documents = collections.get(collection).cloned().unwrap_or_default();
        let outcome = write.apply(collection, &mut documents)?;
        self.try_write_collection(collection, &documents)?;
        collections.insert(collection.to_string(), documents);

        return Ok(outcome);
    }

    /// Inserts `document`, assigning a fresh identity when it has none. Returns the identity hex.
    pub fn insert_one(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        mut document: Row,
    ) -> Result<String> {
        let id = match document.remove("_id") {
            Some(id) if !is_zero(&id) => coerce_document_id(&id)?,
            _ => ObjectId::new().to_value(),
        };
        let hex = ObjectId::from_value(&id)
            .map(|id| id.to_hex())
            .unwrap_or_default();

        let mut stored = Map::with_capacity(document.len() + 1);
        stored.insert(String::from("_id"), id);
        stored.extend(document);

        self.write(session, collection, Write::Insert(stored))?;
        return Ok(hex);
    }

    pub fn find(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        query: &DocumentQuery,
    ) -> Result<Vec<Row>> {
        let mut found = self.read(session, collection, |documents| {
            let mut found = Vec::new();
            for document in documents {
                if matcher::matches(document, &query.filter)? {
                    found.push(document.clone());
                }
            }
            return Ok(found);
        })?;

        matcher::sort_documents(&mut found, &query.sort);

        let skip = query.skip.unwrap_or_default() as usize;
        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);

        return Ok(found.into_iter().skip(skip).take(limit).collect());
    }

    pub fn count(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<u64> {
        return self.read(session, collection, |documents| {
            let mut count = 0;
            for document in documents {
                if matcher::matches(document, filter)? {
                    count += 1;
                }
            }
            return Ok(count);
        });
    }

    /// Applies `set` to every matching document, returning how many matched.
    pub fn update_many(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        filter: &Map<String, Value>,
        set: &Row,
    ) -> Result<u64> {
        let write = Write::Update {
            filter: filter.clone(),
            set: set.clone(),
        };
        return self.write(session, collection, write);
    }

    pub fn delete_many(
        &self,
        session: Option<&DocumentSession>,
        collection: &str,
        filter: &Map<String, Value>,
    ) -> Result<u64> {
        let write = Write::Delete {
            filter: filter.clone(),
        };
        return self.write(session, collection, write);
    }
}

/// One write against a collection, journaled by sessions and replayed on commit.
#[derive(Clone, Debug)]
enum Write {
    Insert(Row),
    Update {
        filter: Map<String, Value>,
        set: Row,
    },
    Delete {
        filter: Map<String, Value>,
    },
}

impl Write {
    /// Applies the write to `documents`, returning how many documents it touched.
    fn apply(&self, collection: &str, documents: &mut Vec<Row>) -> Result<u64> {
        return match self {
            Self::Insert(document) => {
                let id = document.get("_id");
                if documents.iter().any(|existing| existing.get("_id") == id) {
                    let hex = id
                        .and_then(ObjectId::from_value)
                        .map(|id| id.to_hex())
                        .unwrap_or_default();
                    return Err(Error::Execution {
                        backend: DocumentStore::NAME,
                        reason: format!("duplicate key [_id: {hex}] in [{collection}]"),
                    });
                }

                documents.push(document.clone());
                Ok(1)
            }
            Self::Update { filter, set } => {
                let matched = matching_flags(documents, filter)?;
                let mut updated = 0;
                for (document, _) in documents.iter_mut().zip(&matched).filter(|(_, m)| **m) {
                    matcher::apply_set(document, set);
                    updated += 1;
                }
                Ok(updated)
            }
            Self::Delete { filter } => {
                let matched = matching_flags(documents, filter)?;
                let mut flags = matched.iter();
                documents.retain(|_| !flags.next().copied().unwrap_or_default());

                Ok(matched.iter().filter(|m| **m).count() as u64)
            }
        };
    }
}

/// Evaluates `filter` against every document before anything is modified.
fn matching_flags(documents: &[Row], filter: &Map<String, Value>) -> Result<Vec<bool>> {
    return documents
        .iter()
        .map(|document| matcher::matches(document, filter))
        .collect();
}

/// Isolated workspace of one document session.
#[derive(Debug, Default)]
pub struct DocumentSession {
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    /// Private copies of the collections written so far, serving the session's own reads
    workspace: HashMap<String, Vec<Row>>,
    journal: Vec<(String, Write)>,
    savepoints: Vec<(String, Savepoint)>,
    finalized: bool,
}

#[derive(Debug)]
struct Savepoint {
    workspace: HashMap<String, Vec<Row>>,
    journal_len: usize,
}

impl SessionState {
    fn check(&self) -> Result<()> {
        return match self.finalized {
            true => Err(Error::TransactionFinalized),
            false => Ok(()),
        };
    }

    fn savepoint_position(&self, name: &str) -> Result<usize> {
        return self
            .savepoints
            .iter()
            .rposition(|(existing, _)| existing == name)
            .ok_or_else(|| Error::Execution {
                backend: DocumentStore::NAME,
                reason: format!("no savepoint named [{name}]"),
            });
    }
}

impl DocumentSession {
    /// Replays every journaled write against the live collections and publishes them at once.
    ///
    /// A write that no longer applies (a duplicate identity inserted outside the session)
    /// fails the commit and publishes nothing.
    pub fn commit(&self, store: &DocumentStore) -> Result<()> {
        let mut state = self.state.lock();
        state.check()?;
        state.finalized = true;
        state.workspace.clear();
        state.savepoints.clear();
        let journal = std::mem::take(&mut state.journal);

        let mut collections = store.collections.write();
        let mut replayed: HashMap<String, Vec<Row>> = HashMap::new();
        for (collection, write) in &journal {
            let documents = replayed
                .entry(collection.clone())
                .or_insert_with(|| collections.get(collection).cloned().unwrap_or_default());

            write
                .apply(collection, documents)
                .map_err(|e| Error::TransactionCommitFailure {
                    reason: e.to_string(),
                })?;
        }

        for (collection, documents) in replayed.iter() {
            store
                .try_write_collection(collection, documents)
                .map_err(|e| Error::TransactionCommitFailure {
                    reason: e.to_string(),
                })?;
        }

        debug!("Committing {} write(s).", journal.len());
        for (collection, documents) in replayed {
            collections.insert(collection, documents);
        }

        return Ok(());
    }

    pub fn rollback(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.check()?;
        state.finalized = true;
        state.workspace.clear();
        state.journal.clear();
        state.savepoints.clear();

        return Ok(());
    }

    /// Marks the current workspace so later writes can be undone with [`Self::rollback_to`].
    pub fn savepoint(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check()?;

        let savepoint = Savepoint {
            workspace: state.workspace.clone(),
            journal_len: state.journal.len(),
        };
        state.savepoints.push((name.to_string(), savepoint));

        return Ok(());
    }

    /// Undoes every write made since the savepoint `name` and releases it.
    pub fn rollback_to(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check()?;

        let position = state.savepoint_position(name)?;
        let (_, savepoint) = state.savepoints.split_off(position).swap_remove(0);
        state.workspace = savepoint.workspace;
        state.journal.truncate(savepoint.journal_len);

        return Ok(());
    }

    /// Forgets the savepoint `name`, keeping every write made since.
    pub fn release(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.check()?;

        let position = state.savepoint_position(name)?;
        state.savepoints.truncate(position);

        return Ok(());
    }

    pub fn is_finalized(&self) -> bool { self.state.lock().finalized }
}

#[derive(Clone, Debug)]
pub struct DocumentHandle {
    store: DocumentStore,
    session: Option<Arc<DocumentSession>>,
}

impl DocumentHandle {
    pub fn store(&self) -> &DocumentStore { &self.store }

    fn session(&self) -> Result<&DocumentSession> {
        return self.session.as_deref().ok_or(Error::Execution {
            backend: DocumentStore::NAME,
            reason: String::from("no session in progress"),
        });
    }
}

impl Backend for DocumentHandle {
    const NAME: &'static str = DocumentStore::NAME;
    const KIND: BackendKind = BackendKind::Document;

    type Translator = DocumentTranslator;

    fn insert(&self, context: &Context, table: &str, row: Row, _identity: &str) -> Result<String> {
        context.check()?;
        debug!(collection = table, document = ?row, "insert");

        return self.store.insert_one(self.session.as_deref(), table, row);
    }

    fn update(
        &self,
        context: &Context,
        table: &str,
        query: &DocumentQuery,
        delta: Row,
    ) -> Result<u64> {
        context.check()?;
        debug!(collection = table, filter = ?query.filter, set = ?delta, "update");

        return self
            .store
            .update_many(self.session.as_deref(), table, &query.filter, &delta);
    }

    fn delete(&self, context: &Context, table: &str, query: &DocumentQuery) -> Result<u64> {
        context.check()?;
        debug!(collection = table, filter = ?query.filter, "delete");

        return self
            .store
            .delete_many(self.session.as_deref(), table, &query.filter);
    }

    fn count(&self, context: &Context, table: &str, query: &DocumentQuery) -> Result<u64> {
        context.check()?;
        debug!(collection = table, filter = ?query.filter, "count");

        return self
            .store
            .count(self.session.as_deref(), table, &query.filter);
    }

    fn find(
        &self,
        context: &Context,
        table: &str,
        query: &DocumentQuery,
    ) -> Result<Box<dyn RawCursor>> {
        context.check()?;
        debug!(
            collection = table,
            filter = ?query.filter,
            sort = ?query.sort,
            skip = ?query.skip,
            limit = ?query.limit,
            "find"
        );

        let documents = self.store.find(self.session.as_deref(), table, query)?;
        return Ok(Box::new(BufferedCursor::new(documents)));
    }

    fn begin(&self) -> Result<Self> {
        if self.session.is_some() {
            return Err(Error::Execution {
                backend: Self::NAME,
                reason: String::from("nested sessions are not supported"),
            });
        }

        return Ok(Self {
            store: self.store.clone(),
            session: Some(Arc::new(self.store.start_session())),
        });
    }

    fn commit(&self) -> Result<()> { self.session()?.commit(&self.store) }

    fn rollback(&self) -> Result<()> {
        let session = self.session()?;
        if let Err(e) = session.rollback() {
            warn!("Rollback skipped, caused by: [{e}]");
            return Err(e);
        }

        return Ok(());
    }

    fn savepoint(&self, name: &str) -> Result<()> { self.session()?.savepoint(name) }

    fn rollback_to_savepoint(&self, name: &str) -> Result<()> { self.session()?.rollback_to(name) }

    fn release_savepoint(&self, name: &str) -> Result<()> { self.session()?.release(name) }

    fn in_transaction(&self) -> bool { self.session.is_some() }
}
