use super::Model;
use crate::{Error, Result, cursor::Cursor, engine::Row, schema::Schema};

/// A frozen snapshot of a model's operations.
///
/// Later chain calls on the model it came from do not affect it, and it can be run any number of
/// times.
#[derive(Clone, Debug)]
pub struct Query {
    model: Model,
}

impl Query {
    pub(crate) fn new(model: Model) -> Self { Self { model } }

    pub fn model(&self) -> &Model { &self.model }

    /// First matching record, [`Error::NotFound`] when nothing matches.
    pub fn one<T: Schema>(&self) -> Result<T> {
        let mut cursor = self.model.clone().limit(1).cursor()?;
        if !cursor.next() {
            return Err(self.exhausted(&mut cursor));
        }

        let record = cursor.decode();
        cursor.close()?;
        return record;
    }

    pub fn one_row(&self) -> Result<Row> {
        let mut cursor = self.model.clone().limit(1).cursor()?;
        if !cursor.next() {
            return Err(self.exhausted(&mut cursor));
        }

        let row = cursor.decode_row();
        cursor.close()?;
        return row;
    }

    /// Every matching record, in backend order unless sorted.
    pub fn all<T: Schema>(&self) -> Result<Vec<T>> {
        let mut cursor = self.cursor()?;
        let mut records = Vec::new();
        while cursor.next() {
            records.push(cursor.decode()?);
        }

        return Self::finish(cursor, records);
    }

    pub fn all_rows(&self) -> Result<Vec<Row>> {
        let mut cursor = self.cursor()?;
        let mut rows = Vec::new();
        while cursor.next() {
            rows.push(cursor.decode_row()?);
        }

        return Self::finish(cursor, rows);
    }

    pub fn count(&self) -> Result<u64> { self.model.count() }

    pub fn delete(&self) -> Result<u64> { self.model.delete() }

    pub fn cursor(&self) -> Result<Cursor> { self.model.cursor() }

    fn exhausted(&self, cursor: &mut Cursor) -> Error {
        if let Some(e) = cursor.take_error() {
            return e;
        }

        return Error::NotFound {
            table: self.model.table_name().unwrap_or_default().to_string(),
        };
    }

    fn finish<V>(mut cursor: Cursor, values: Vec<V>) -> Result<Vec<V>> {
        if let Some(e) = cursor.take_error() {
            return Err(e);
        }

        cursor.close()?;
        return Ok(values);
    }
}
