#![doc = include_str!("../README.md")]

pub mod bulk;
pub mod condition;
pub mod config;
pub mod context;
pub mod cursor;
pub mod engine;
mod error;
pub mod identity;
pub mod logging;
pub mod model;
pub mod oplog;
pub mod schema;
pub mod service;
pub mod session;
pub mod translate;
pub mod utils;

pub use engine::Engine;
pub use error::{Error, Result};
pub use model::{Model, Query, Upserted};
pub use serde_json::{Map, Value};

pub(crate) use serde::{Deserialize, Serialize};

pub mod prelude {
    pub use crate::{
        Map, Value,
        bulk::BulkOperation,
        condition::{Condition, IntoCondition, Order, SortKey, WhereMode},
        config::DBConfig,
        context::Context,
        cursor::Cursor,
        engine::{Backend, BackendKind, Engine, Row},
        model::{Model, Query, Upserted},
        schema::{Column, EMPTY_STR, OrmBool, Schema},
        service::{BaseModel, ListOption, Sort},
        session::Session,
    };
}
