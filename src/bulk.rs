//! Batched writes applied as one unit.

use crate::{
    Error, Result,
    condition::{Condition, Encoding, IntoCondition},
    engine::Row,
    identity::identity_column,
    model::Model,
    schema::Schema,
};
use tracing::{error, info, warn};

/// Savepoint wrapping an ordered batch that joined a session
const BULK_SAVEPOINT: &str = "lupaorm_bulk_write";

/// One write of a [`Model::bulk_write`] batch.
#[derive(Clone, Debug, PartialEq)]
pub enum BulkOperation {
    Insert { data: Condition },
    Update { filter: Condition, values: Condition },
    Delete { filter: Condition },
}

impl BulkOperation {
    /// Inserts every field of `record` except a zero identity.
    pub fn insert<T: Schema>(record: &T) -> Self {
        return Self::Insert {
            data: record.into_condition(Encoding::Full),
        };
    }

    pub fn insert_row(row: Row) -> Self {
        return Self::Insert {
            data: row.into_condition(Encoding::Full),
        };
    }

    pub fn update(filter: impl IntoCondition, values: impl IntoCondition) -> Self {
        return Self::Update {
            filter: filter.into_condition(Encoding::Condition),
            values: values.into_condition(Encoding::Delta),
        };
    }

    pub fn delete(filter: impl IntoCondition) -> Self {
        return Self::Delete {
            filter: filter.into_condition(Encoding::Condition),
        };
    }

    pub fn kind(&self) -> &'static str {
        return match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        };
    }

    fn table(&self) -> Option<&str> {
        return match self {
            Self::Insert { data } => data.table(),
            Self::Update { filter, values } => filter.table().or(values.table()),
            Self::Delete { filter } => filter.table(),
        };
    }

    fn apply(self, model: &Model) -> Result<()> {
        return match self {
            Self::Insert { data } => {
                let kind = model.kind();
                let table = data
                    .table()
                    .or(model.table_name())
                    .map(String::from)
                    .ok_or(Error::UnresolvedTable)?;

                model.insert_row(&table, data.into_row(kind), identity_column(kind))?;
                Ok(())
            }
            Self::Update { filter, values } => {
                model.clone().where_(filter).update(values)?;
                Ok(())
            }
            Self::Delete { filter } => {
                model.clone().where_(filter).delete()?;
                Ok(())
            }
        };
    }
}

impl Model {
    /// Applies `operations` in order, inside one transaction.
    ///
    /// Ordered batches stop at the first failure and roll everything back. Unordered batches log
    /// each failure, keep going, and commit what succeeded. On a session's model the batch joins
    /// the session's transaction instead of opening its own, and a failed ordered batch is rolled
    /// back to a savepoint taken where it started.
    pub fn bulk_write(
        &self,
        operations: impl IntoIterator<Item = BulkOperation>,
        ordered: bool,
    ) -> Result<()> {
        let operations = operations.into_iter().collect::<Vec<_>>();
        if operations.is_empty() {
            return Ok(());
        }

        let joined = self.in_session();
        let handle = match joined {
            true => self.handle().clone(),
            false => self.handle().begin()?,
        };

        let mut target = self.rebind(handle.clone());
        if target.table_name().is_none()
            && let Some(table) = operations.iter().find_map(BulkOperation::table)
        {
            target = target.with_table(table);
        }

        // Inside a session the batch can only be undone up to where it started
        let savepoint = joined && ordered;
        if savepoint {
            handle.savepoint(BULK_SAVEPOINT)?;
        }

        let total = operations.len();
        let mut failed = 0;
        for (index, operation) in operations.into_iter().enumerate() {
            let kind = operation.kind();
            let Err(e) = operation.apply(&target) else {
                continue;
            };

            let failure = Error::BulkOperationFailure {
                index,
                kind,
                reason: e.to_string(),
            };
            if ordered {
                let rollback = match savepoint {
                    true => handle.rollback_to_savepoint(BULK_SAVEPOINT),
                    false => handle.rollback(),
                };
                if let Err(rollback) = rollback {
                    error!("Bulk rollback failed, caused by: [{rollback}]");
                }
                return Err(failure);
            }

            warn!("{failure}, continuing.");
            failed += 1;
        }

        info!("Bulk write applied {} of {total} operations.", total - failed);
        if savepoint {
            handle.release_savepoint(BULK_SAVEPOINT)?;
        }

        return match joined {
            true => Ok(()),
            false => handle.commit(),
        };
    }
}
