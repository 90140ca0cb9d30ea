use derive_more::{Display, Error, From};
use std::path::PathBuf;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error, From, Display)]
pub enum Error {
    // -- Translation
    #[display("Translation of column [{column}] failed, caused by: [{reason}]")]
    Translation { column: String, reason: String },

    #[display("Table name could not be resolved, pass a table name or a record type.")]
    UnresolvedTable,

    #[display("Refusing to {verb} every row of [{table}], add at least one filter.")]
    MissingFilter { verb: &'static str, table: String },

    // -- Query
    #[display("No result found in [{table}].")]
    NotFound { table: String },

    #[display("Cursor is not positioned on a result, call `next` first.")]
    CursorNotPositioned,

    #[display("Cursor is closed.")]
    CursorClosed,

    // -- Execution
    #[from]
    #[display("SQLite execution failed, caused by: [{_0}]")]
    Sqlite(rusqlite::Error),

    #[display("{backend} execution failed, caused by: [{reason}]")]
    Execution { backend: &'static str, reason: String },

    #[display("Operation was cancelled by its context.")]
    Cancelled,

    // -- Bulk
    #[display("Bulk operation #{index} ({kind}) failed, caused by: [{reason}]")]
    BulkOperationFailure {
        index: usize,
        kind: &'static str,
        reason: String,
    },

    // -- Transaction
    #[display("Transaction has already been committed or rolled back.")]
    TransactionFinalized,

    #[display("Transaction commit failed, caused by: [{reason}]")]
    TransactionCommitFailure { reason: String },

    #[display("Transaction rollback failed, caused by: [{reason}]")]
    TransactionRollbackFailure { reason: String },

    // -- Serde
    #[display("Serialization failed, caused by: [{_0}]")]
    SerializationFailure(Box<dyn std::error::Error + Send + Sync>),

    #[display("Deserialization failed, caused by: [{_0}]")]
    DeserializationFailure(Box<dyn std::error::Error + Send + Sync>),

    // -- Config
    #[display("Configuration [{path}] is invalid, caused by: [{reason}]")]
    ConfigInvalid { path: String, reason: String },

    #[display("Backend [{kind}] is not supported: [{reason}]")]
    UnsupportedBackend { kind: String, reason: String },

    // -- I/O
    #[display("Directory creation at [{path}] failed, caused by: [{reason}]")]
    IOCreateDirFailure {
        path: String,
        reason: std::io::Error,
    },

    #[display("Copy from [{path_from}] to [{path_destination}] failed, caused by: [{reason}]")]
    IOCopyFailure {
        path_from: String,
        path_destination: String,
        reason: std::io::Error,
    },

    #[display("Write to file at [{path}] failed, caused by: [{reason}]")]
    IOWriteFailure {
        path: String,
        reason: std::io::Error,
    },

    // -- Storage
    #[display("Storage file at [{}] not found.", file_path.display())]
    DBNotFound { file_path: PathBuf },

    #[display("Storage file at [{}] is corrupt, caused by: [{reason}]", file_path.display())]
    DBCorrupt { file_path: PathBuf, reason: String },
}

impl Error {
    pub(crate) fn translation(column: impl Into<String>, reason: impl Into<String>) -> Self {
        return Self::Translation {
            column: column.into(),
            reason: reason.into(),
        };
    }
}
