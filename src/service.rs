//! Helpers for services built around one model.
//!
//! A service type implements [`BaseModel`] and gets the common read/write flows for free, each
//! taking a `filter` closure that narrows a fresh model:
//!
//! ```no_run
//! # use lupaorm::prelude::*;
//! # use lupaorm::service;
//! struct Tasks {
//!     engine: Engine,
//! }
//!
//! impl BaseModel for Tasks {
//!     fn model(&self) -> Model { self.engine.table("task") }
//! }
//!
//! # fn demo<Task: Schema + std::fmt::Debug>(tasks: Tasks) -> lupaorm::Result<()> {
//! let option = ListOption {
//!     page: 2,
//!     limit: 20,
//!     sort: vec![Sort::desc("create_time")],
//!     ..ListOption::default()
//! };
//! let total = service::list(&tasks, &option, |m| m.where_(("status", 1)), |task: Task| {
//!     println!("{task:?}");
//!     true
//! })?;
//! println!("{total} tasks");
//! # Ok(())
//! # }
//! ```

use crate::{
    Result,
    condition::{IntoCondition, Order, SortKey},
    model::{Model, Upserted},
    schema::Schema,
};
use tracing::warn;

pub trait BaseModel {
    /// A fresh model targeting the service's table.
    fn model(&self) -> Model;
}

/// One sort directive of a [`ListOption`].
#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub key: SortKey,
    pub order: Order,
}

impl Sort {
    pub fn asc(key: impl Into<SortKey>) -> Self {
        return Self {
            key: key.into(),
            order: Order::Asc,
        };
    }

    pub fn desc(key: impl Into<SortKey>) -> Self {
        return Self {
            key: key.into(),
            order: Order::Desc,
        };
    }
}

/// Paging and sorting of [`list`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListOption {
    pub page: i64,
    pub limit: i64,
    /// Every match, ignoring paging and sorting
    pub all: bool,
    pub sort: Vec<Sort>,
}

impl ListOption {
    pub const DEFAULT_LIMIT: u64 = 1000;

    pub const ALL: Self = Self {
        page: 0,
        limit: 0,
        all: true,
        sort: Vec::new(),
    };

    pub fn page(&self) -> u64 {
        return match self.page {
            page if page <= 0 => 1,
            page => page as u64,
        };
    }

    pub fn limit(&self) -> u64 {
        return match self.limit {
            limit if limit <= 0 => Self::DEFAULT_LIMIT,
            limit => limit as u64,
        };
    }
}

pub fn one<T: Schema>(base: &impl BaseModel, filter: impl FnOnce(Model) -> Model) -> Result<T> {
    return filter(base.model()).one();
}

pub fn all<T: Schema>(
    base: &impl BaseModel,
    filter: impl FnOnce(Model) -> Model,
) -> Result<Vec<T>> {
    return filter(base.model()).all();
}

pub fn create<T: Schema>(base: &impl BaseModel, record: &mut T) -> Result<String> {
    return base.model().create(record);
}

pub fn update(
    base: &impl BaseModel,
    filter: impl FnOnce(Model) -> Model,
    delta: impl IntoCondition,
) -> Result<u64> {
    return filter(base.model()).update(delta);
}

pub fn upsert(
    base: &impl BaseModel,
    filter: impl FnOnce(Model) -> Model,
    delta: impl IntoCondition,
) -> Result<Upserted> {
    return filter(base.model()).save(delta);
}

pub fn delete(base: &impl BaseModel, filter: impl FnOnce(Model) -> Model) -> Result<u64> {
    return filter(base.model()).delete();
}

/// Visits one page of matches (or all of them) and returns the total match count.
///
/// Rows that fail to decode into `T` are skipped. `visit` returning `false` stops the walk.
pub fn list<T: Schema>(
    base: &impl BaseModel,
    option: &ListOption,
    filter: impl FnOnce(Model) -> Model,
    mut visit: impl FnMut(T) -> bool,
) -> Result<u64> {
    let mut model = filter(base.model());

    let total = model.count()?;
    if total == 0 {
        return Ok(0);
    }

    if !option.all {
        for sort in &option.sort {
            model = model.order(sort.key.clone(), sort.order);
        }
        model = model.page(option.page(), option.limit());
    }

    let mut cursor = model.cursor()?;
    while cursor.next() {
        let value = match cursor.decode::<T>() {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping an undecodable row, caused by: [{e}]");
                continue;
            }
        };

        if !visit(value) {
            break;
        }
    }

    if let Some(e) = cursor.take_error() {
        return Err(e);
    }
    cursor.close()?;

    return Ok(total);
}
