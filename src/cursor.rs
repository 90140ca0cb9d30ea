use crate::{
    Error, Result,
    context::Context,
    engine::{BackendKind, Row},
    schema::{Schema, utils::row_to_record},
};
use tracing::warn;

/// Engine-side result stream a [`Cursor`] wraps.
pub trait RawCursor: Send {
    /// Next row, `None` once the stream is exhausted
    fn next_row(&mut self) -> Result<Option<Row>>;

    /// Releases engine resources. Called at most once.
    fn close(&mut self) -> Result<()>;
}

/// Forward-only iteration over a query result, identical on every backend.
///
/// ```no_run
/// # use lupaorm::prelude::*;
/// # fn visit(model: Model) -> lupaorm::Result<()> {
/// let mut cursor = model.cursor()?;
/// while cursor.next() {
///     let row = cursor.decode_row()?;
///     println!("{row:?}");
/// }
/// if let Some(e) = cursor.error() {
///     eprintln!("iteration stopped early: {e}");
/// }
/// cursor.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Cursor {
    inner: Box<dyn RawCursor>,
    kind: BackendKind,
    context: Context,
    current: Option<Row>,
    error: Option<Error>,
    closed: bool,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("Cursor")
            .field("kind", &self.kind)
            .field("current", &self.current)
            .field("error", &self.error)
            .field("closed", &self.closed)
            .finish_non_exhaustive();
    }
}

impl Cursor {
    pub(crate) fn new(inner: Box<dyn RawCursor>, kind: BackendKind, context: Context) -> Self {
        return Self {
            inner,
            kind,
            context,
            current: None,
            error: None,
            closed: false,
        };
    }

    /// Advances to the next result. Returns `false` once exhausted, closed, or failed; a failure
    /// is kept in [`Cursor::error`].
    pub fn next(&mut self) -> bool {
        self.current = None;
        if self.closed || self.error.is_some() {
            return false;
        }

        if let Err(e) = self.context.check() {
            self.error = Some(e);
            return false;
        }

        return match self.inner.next_row() {
            Ok(Some(row)) => {
                self.current = Some(row);
                true
            }
            Ok(None) => false,
            Err(e) => {
                self.error = Some(e);
                false
            }
        };
    }

    /// Decodes the current result into a record.
    pub fn decode<T: Schema>(&self) -> Result<T> {
        let row = self.current_row()?;
        return row_to_record(row.clone(), self.kind);
    }

    /// The current result as a column-keyed row.
    pub fn decode_row(&self) -> Result<Row> { Ok(self.current_row()?.clone()) }

    fn current_row(&self) -> Result<&Row> {
        if self.closed {
            return Err(Error::CursorClosed);
        }

        return self.current.as_ref().ok_or(Error::CursorNotPositioned);
    }

    /// The failure that ended iteration early, if any.
    pub fn error(&self) -> Option<&Error> { self.error.as_ref() }

    pub(crate) fn take_error(&mut self) -> Option<Error> { self.error.take() }

    pub fn is_closed(&self) -> bool { self.closed }

    /// Releases the underlying stream. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;
        self.current = None;
        return self.inner.close();
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Cursor close failed while dropping, caused by: [{e}]");
        }
    }
}

/// Cursor over rows already materialised in memory.
#[derive(Debug, Default)]
pub(crate) struct BufferedCursor {
    rows: std::collections::VecDeque<Row>,
}

impl BufferedCursor {
    pub(crate) fn new(rows: impl IntoIterator<Item = Row>) -> Self {
        return Self {
            rows: rows.into_iter().collect(),
        };
    }
}

impl RawCursor for BufferedCursor {
    fn next_row(&mut self) -> Result<Option<Row>> { Ok(self.rows.pop_front()) }

    fn close(&mut self) -> Result<()> {
        self.rows.clear();
        return Ok(());
    }
}
