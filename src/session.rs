//! Backend-agnostic transactions.
//!
//! [`Model::session`] opens a transaction on the model's engine and hands the callback a
//! [`Session`] whose models all run inside it. The transaction commits when the callback returns
//! `Ok` and rolls back when it returns `Err`, unless the callback already finalized it.

use crate::{
    Error, Result,
    context::Context,
    engine::BackendKind,
    model::Model,
    schema::Schema,
};
use tracing::{error, info};

#[derive(Debug)]
pub struct Session {
    model: Model,
    finalized: bool,
}

impl Session {
    /// A fresh model bound to the transaction, targeting the session's table.
    pub fn model(&self) -> Model { self.model.clone() }

    /// A fresh model bound to the transaction, targeting the table of `T`.
    pub fn model_of<T: Schema>(&self) -> Model { self.model.clone().with_table(T::table_name()) }

    /// A fresh model bound to the transaction, targeting `table`.
    pub fn table(&self, table: impl Into<String>) -> Model { self.model.clone().with_table(table) }

    pub fn kind(&self) -> BackendKind { self.model.kind() }

    pub fn context(&self) -> Context { self.model.context() }

    /// Commits early. Verbs run after this point fail.
    pub fn commit(&mut self) -> Result<()> {
        self.finalized = true;
        return self.model.handle().commit();
    }

    /// Rolls back early. Verbs run after this point fail.
    pub fn rollback(&mut self) -> Result<()> {
        self.finalized = true;
        return self.model.handle().rollback();
    }

    pub fn is_finalized(&self) -> bool { self.finalized }
}

impl Model {
    /// Runs `f` inside a transaction.
    ///
    /// | `f` returns | finalized by `f` | outcome |
    /// |---|---|---|
    /// | `Ok` | no | commit |
    /// | `Err(e)` | no | rollback, `Err(e)` |
    /// | `Ok`, or `Err(TransactionFinalized)` | yes | `Ok` |
    /// | any other `Err(e)` | yes | `Err(e)` |
    ///
    /// Sessions do not nest: calling this on a session's model fails.
    pub fn session<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let handle = self.handle().begin()?;
        info!("Session opened on [{}].", self.kind());

        let mut session = Session {
            model: self.rebind(handle.clone()),
            finalized: false,
        };
        let outcome = f(&mut session);

        return match (outcome, session.finalized) {
            (Ok(()), false) => handle.commit(),
            (Err(e), false) => {
                if let Err(rollback) = handle.rollback() {
                    error!("Session rollback failed, caused by: [{rollback}]");
                }
                Err(e)
            }
            (Ok(()) | Err(Error::TransactionFinalized), true) => Ok(()),
            (Err(e), true) => Err(e),
        };
    }
}
