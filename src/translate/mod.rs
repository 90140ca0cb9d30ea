//! Replays an [`OpList`] into a backend's native query.
//!
//! Both translators fold predicates left to right: `where(a).where(b).or(c).where(d)` means
//! `((a AND b) OR c) AND d` on every backend.

pub mod document;
pub mod sql;

pub use document::{DocumentQuery, DocumentTranslator};
pub use sql::{SqlQuery, SqlTranslator};

use crate::{
    Result, Value,
    condition::{Order, WhereMode},
    oplog::{OpKey, OpList},
};
use std::fmt::Debug;

pub trait Translator: Default {
    /// Native query produced once every entry is replayed
    type Query: Clone + Debug + Default + Send + Sync + 'static;

    /// Applies one encoded predicate (never a sort mode).
    fn predicate(&mut self, mode: WhereMode, column: &str, value: &Value) -> Result<()>;

    /// Applies a caller-supplied expression stored verbatim.
    fn raw(&mut self, expression: &str, value: &Value) -> Result<()>;

    fn sort(&mut self, order: Order, column: &str);

    fn limit(&mut self, limit: u64);

    fn offset(&mut self, offset: u64);

    fn execute(self) -> Self::Query;
}

/// Replays `ops` in insertion order, stopping at the first translation failure.
pub fn translate<T: Translator>(ops: &OpList) -> Result<T::Query> {
    let mut translator = T::default();
    let mut outcome = Ok(());

    ops.range(|key, value| {
        outcome = match key {
            OpKey::Where {
                mode: WhereMode::Asc,
                column,
            } => {
                translator.sort(Order::Asc, column);
                Ok(())
            }
            OpKey::Where {
                mode: WhereMode::Desc,
                column,
            } => {
                translator.sort(Order::Desc, column);
                Ok(())
            }
            OpKey::Where { mode, column } => translator.predicate(*mode, column, value),
            OpKey::Raw(expression) => translator.raw(expression, value),
            OpKey::Limit => {
                translator.limit(value.as_u64().unwrap_or_default());
                Ok(())
            }
            OpKey::Offset => {
                translator.offset(value.as_u64().unwrap_or_default());
                Ok(())
            }
        };

        return outcome.is_ok();
    });

    outcome?;
    return Ok(translator.execute());
}
