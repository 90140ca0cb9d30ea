//! The chainable model every caller works through.
//!
//! A [`Model`] pairs an engine handle with a target table and an ordered log of conditions. Chain
//! methods consume the model and return it with one more entry recorded; terminal verbs borrow
//! it, translate the log for the bound backend and run it:
//!
//! ```no_run
//! # use lupaorm::prelude::*;
//! # fn demo(engine: Engine) -> lupaorm::Result<()> {
//! let rows = engine
//!     .table("task")
//!     .where_(("status", 1))
//!     .where_or(("priority", 3))
//!     .desc("create_time")
//!     .limit(10)
//!     .find()
//!     .all_rows()?;
//! println!("{} rows", rows.len());
//! # Ok(())
//! # }
//! ```

mod chain;
mod query;
mod verbs;

pub use query::Query;

use crate::{
    Error, Result,
    context::Context,
    engine::{BackendKind, Handle},
    oplog::OpList,
};

/// Outcome of [`Model::save`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upserted {
    /// Matching rows existed and this many were updated
    Updated(u64),
    /// Nothing matched and a row with this identity was inserted
    Inserted(String),
}

#[derive(Clone, Debug)]
pub struct Model {
    handle: Handle,
    table: Option<String>,
    ops: OpList,
    context: Option<Context>,
}

impl Model {
    pub(crate) fn new(handle: Handle, table: Option<String>) -> Self {
        return Self {
            handle,
            table,
            ops: OpList::new(),
            context: None,
        };
    }

    /// Same table and context on another handle, with an empty log.
    pub(crate) fn rebind(&self, handle: Handle) -> Self {
        return Self {
            handle,
            table: self.table.clone(),
            ops: OpList::new(),
            context: self.context.clone(),
        };
    }

    pub(crate) fn handle(&self) -> &Handle { &self.handle }

    pub fn kind(&self) -> BackendKind { self.handle.kind() }

    /// Target table, once known
    pub fn table_name(&self) -> Option<&str> { self.table.as_deref() }

    /// Recorded operations, in the order they will be translated
    pub fn ops(&self) -> &OpList { &self.ops }

    /// Whether verbs on this model run inside a session.
    pub fn in_session(&self) -> bool { self.handle.in_transaction() }

    /// Context verbs run under, a fresh one when none was attached.
    pub fn context(&self) -> Context { self.context.clone().unwrap_or_default() }

    /// The table named explicitly or by an earlier record, else `fallback`.
    fn resolve_table(&self, fallback: Option<&str>) -> Result<String> {
        return self
            .table
            .as_deref()
            .or(fallback)
            .map(String::from)
            .ok_or(Error::UnresolvedTable);
    }

    fn adopt_table(&mut self, table: Option<&str>) {
        if self.table.is_none()
            && let Some(table) = table
        {
            self.table = Some(table.to_string());
        }
    }
}
