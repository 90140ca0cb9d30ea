use super::{Model, Query, Upserted};
use crate::{
    Error, Result,
    condition::{Encoding, IntoCondition},
    cursor::Cursor,
    engine::{Backend, NativeQuery, Row, with_backend},
    identity::{identity_column, identity_column_of, set_id, set_row_id},
    oplog::OpList,
    schema::{Schema, is_identity_name, utils::record_to_row},
    translate::translate,
};
use tracing::{info, warn};

impl Model {
    /// Inserts `record` and writes the assigned identity back into it.
    pub fn create<T: Schema>(&self, record: &mut T) -> Result<String> {
        let id = self.insert(&*record)?;
        set_id(record, self.kind(), &id);

        return Ok(id);
    }

    /// Inserts `record` without touching it, returning the identity it was stored under.
    pub fn insert<T: Schema>(&self, record: &T) -> Result<String> {
        let kind = self.kind();
        let table = self.resolve_table(Some(&T::table_name()))?;
        let row = record_to_row(record, kind, Encoding::Full)?;

        return self.insert_row(&table, row, identity_column_of::<T>(kind));
    }

    /// Inserts a column-keyed row and stores the assigned identity into it.
    pub fn create_row(&self, row: &mut Row) -> Result<String> {
        let kind = self.kind();
        let table = self.resolve_table(None)?;

        let id = self.insert_row(&table, row.clone(), identity_column(kind))?;
        set_row_id(row, kind, &id);

        return Ok(id);
    }

    pub(crate) fn insert_row(&self, table: &str, row: Row, identity: &str) -> Result<String> {
        let context = self.context();
        return with_backend!(self.handle(), backend => backend.insert(&context, table, row, identity));
    }

    /// Applies `delta` to every row matching the recorded predicates.
    ///
    /// Record deltas carry non-zero and `must` fields, never the identity. A model without
    /// predicates is refused rather than touching the whole table.
    pub fn update(&self, delta: impl IntoCondition) -> Result<u64> {
        let delta = delta.into_condition(Encoding::Delta);
        let table = self.resolve_table(delta.table())?;
        let row = delta_row(delta.into_row(self.kind()));

        return self.update_with(&table, &self.ops, row);
    }

    fn update_with(&self, table: &str, ops: &OpList, row: Row) -> Result<u64> {
        if row.is_empty() {
            warn!("Update on [{table}] skipped, nothing to set.");
            return Ok(0);
        }
        if !ops.has_filter() {
            return Err(Error::MissingFilter {
                verb: "update",
                table: table.to_string(),
            });
        }

        let context = self.context();
        return with_backend!(self.handle(), backend => {
            let query = translate_for(backend, ops)?;
            backend.update(&context, table, &query, row)
        });
    }

    /// Updates the rows matching every recorded predicate when the equality predicates find an
    /// existing row, or inserts one built from those predicates and `delta` when none match.
    ///
    /// The lookup and the write are separate calls; run inside [`Model::session`] when concurrent
    /// writers may race on the same key.
    pub fn save(&self, delta: impl IntoCondition) -> Result<Upserted> {
        let delta = delta.into_condition(Encoding::Delta);
        let table = self.resolve_table(delta.table())?;
        let kind = self.kind();

        let equalities = self.ops.equality_only();
        if !equalities.has_filter() {
            return Err(Error::MissingFilter {
                verb: "save",
                table,
            });
        }

        let context = self.context();
        let existing = with_backend!(self.handle(), backend => {
            let query = translate_for(backend, &equalities)?;
            backend.count(&context, &table, &query)
        })?;

        let mut row = delta.into_row(kind);
        if existing > 0 {
            return Ok(Upserted::Updated(self.update_with(&table, &self.ops, delta_row(row))?));
        }

        for (column, value) in equalities.equality_predicates() {
            row.entry(column).or_insert(value);
        }

        info!("No row of [{table}] matched, inserting.");
        let id = self.insert_row(&table, row, identity_column(kind))?;
        return Ok(Upserted::Inserted(id));
    }

    pub fn upsert(&self, delta: impl IntoCondition) -> Result<Upserted> { self.save(delta) }

    /// Deletes every row matching the recorded predicates. Refused without predicates.
    pub fn delete(&self) -> Result<u64> {
        let table = self.resolve_table(None)?;
        if !self.ops.has_filter() {
            return Err(Error::MissingFilter {
                verb: "delete",
                table,
            });
        }

        let context = self.context();
        return with_backend!(self.handle(), backend => {
            let query = translate_for(backend, &self.ops)?;
            backend.delete(&context, &table, &query)
        });
    }

    /// Freezes the recorded operations into a reusable query.
    pub fn find(&self) -> Query { Query::new(self.clone()) }

    pub fn one<T: Schema>(&self) -> Result<T> { self.find().one() }

    pub fn all<T: Schema>(&self) -> Result<Vec<T>> { self.find().all() }

    /// Number of rows matching the recorded predicates, sorting and pagination ignored.
    pub fn count(&self) -> Result<u64> {
        let table = self.resolve_table(None)?;
        let context = self.context();

        return with_backend!(self.handle(), backend => {
            let query = translate_for(backend, &self.ops)?;
            backend.count(&context, &table, &query)
        });
    }

    pub fn cursor(&self) -> Result<Cursor> {
        let table = self.resolve_table(None)?;
        let context = self.context();

        let inner = with_backend!(self.handle(), backend => {
            let query = translate_for(backend, &self.ops)?;
            backend.find(&context, &table, &query)
        })?;

        return Ok(Cursor::new(inner, self.kind(), context));
    }
}

/// Translates `ops` for the backend `_backend` belongs to.
fn translate_for<B: Backend>(_backend: &B, ops: &OpList) -> Result<NativeQuery<B>> {
    return translate::<B::Translator>(ops);
}

/// A delta never rewrites an identity.
fn delta_row(mut row: Row) -> Row {
    row.retain(|column, _| !is_identity_name(column));
    return row;
}
