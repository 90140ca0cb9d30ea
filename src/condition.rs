//! Turns user-supplied condition payloads into ordered column/value lists.
//!
//! Three payload shapes are accepted, all through [`IntoCondition`]:
//! - a reference to a [`Schema`] record: every tagged, non-zero field becomes one entry, in field
//!   declaration order, embedded structs expanded in place;
//! - a `(column, value)` pair, stored as-is;
//! - a map of column names to values.

use crate::{
    Map, Value,
    engine::BackendKind,
    schema::{Column, Schema, utils::encode_record},
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Comparison or ordering a condition entry is recorded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WhereMode {
    Is,
    Not,
    Gt,
    Lt,
    Gte,
    Lte,
    Or,
    Like,
    Asc,
    Desc,
}

impl WhereMode {
    pub fn is_sort(&self) -> bool { matches!(self, Self::Asc | Self::Desc) }
}

/// Which record fields an encoding keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Non-zero fields only
    Condition,
    /// Non-zero fields and `must` fields, never the identity
    Delta,
    /// Every field except a zero-valued identity
    Full,
}

/// A column either described by a [`Schema`] or named directly by the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnRef {
    Schema(Column),
    Named(String),
}

impl ColumnRef {
    pub fn name(&self, kind: BackendKind) -> &str {
        return match self {
            Self::Schema(column) => column.name(kind),
            Self::Named(name) => name,
        };
    }

    pub fn is_identity(&self, kind: BackendKind) -> bool {
        return match self {
            Self::Schema(column) => column.is_identity(kind),
            Self::Named(name) => crate::schema::is_identity_name(name),
        };
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub column: ColumnRef,
    pub value: Value,
}

/// Ordered output of the condition encoder
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Condition {
    table: Option<String>,
    fields: Vec<Field>,
    from_record: bool,
}

impl Condition {
    pub fn new() -> Self { Self::default() }

    pub(crate) fn from_record(table: String, fields: Vec<Field>) -> Self {
        return Self {
            table: Some(table),
            fields,
            from_record: true,
        };
    }

    /// Appends a caller-named column.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.push(Field {
            column: ColumnRef::Named(column.into()),
            value: value.into(),
        });
        return self;
    }

    pub fn fields(&self) -> &[Field] { &self.fields }

    /// Table of the record type the condition was encoded from
    pub fn table(&self) -> Option<&str> { self.table.as_deref() }

    pub fn is_record(&self) -> bool { self.from_record }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn column_names(&self, kind: BackendKind) -> Vec<&str> {
        return self
            .fields
            .iter()
            .map(|field| field.column.name(kind))
            .collect();
    }

    /// Fields visible on the given backend, hidden schema columns dropped.
    pub fn visible(&self, kind: BackendKind) -> impl Iterator<Item = &Field> {
        return self.fields.iter().filter(move |field| match &field.column {
            ColumnRef::Schema(column) => !column.is_skipped(kind),
            ColumnRef::Named(_) => true,
        });
    }

    /// Column-keyed row for the given backend, later duplicates overwrite earlier ones.
    pub fn into_row(self, kind: BackendKind) -> Map<String, Value> {
        return self
            .visible(kind)
            .map(|field| (field.column.name(kind).to_string(), field.value.clone()))
            .collect();
    }
}

pub trait IntoCondition {
    fn into_condition(self, encoding: Encoding) -> Condition;
}

impl IntoCondition for Condition {
    fn into_condition(self, _encoding: Encoding) -> Condition { self }
}

impl<T: Schema> IntoCondition for &T {
    fn into_condition(self, encoding: Encoding) -> Condition {
        return match encode_record(self, encoding) {
            Ok(fields) => Condition::from_record(T::table_name(), fields),
            Err(e) => {
                warn!("Skipping condition of [{}], caused by: [{e}]", T::table_name());
                Condition::default()
            }
        };
    }
}

impl<K: Into<String>, V: Serialize> IntoCondition for (K, V) {
    fn into_condition(self, _encoding: Encoding) -> Condition {
        let (column, value) = self;
        let column = column.into();

        return match serde_json::to_value(value) {
            Ok(value) => Condition::new().with(column, value),
            Err(e) => {
                warn!("Skipping condition on [{column}], caused by: [{e}]");
                Condition::default()
            }
        };
    }
}

fn condition_from_pairs<'a, V: Serialize + 'a>(
    pairs: impl IntoIterator<Item = (&'a String, &'a V)>,
) -> Condition {
    let mut condition = Condition::new();
    for (column, value) in pairs {
        match serde_json::to_value(value) {
            Ok(value) => condition = condition.with(column.clone(), value),
            Err(e) => warn!("Skipping condition on [{column}], caused by: [{e}]"),
        }
    }

    return condition;
}

impl<V: Serialize> IntoCondition for HashMap<String, V> {
    fn into_condition(self, _encoding: Encoding) -> Condition { condition_from_pairs(&self) }
}

impl<V: Serialize> IntoCondition for BTreeMap<String, V> {
    fn into_condition(self, _encoding: Encoding) -> Condition { condition_from_pairs(&self) }
}

impl IntoCondition for Map<String, Value> {
    fn into_condition(self, _encoding: Encoding) -> Condition {
        let mut condition = Condition::new();
        for (column, value) in self {
            condition = condition.with(column, value);
        }

        return condition;
    }
}

/// Column a sort directive orders by.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    column: Option<ColumnRef>,
}

impl SortKey {
    pub fn column(name: impl Into<String>) -> Self {
        return Self {
            column: Some(ColumnRef::Named(name.into())),
        };
    }

    /// Orders by the first non-zero field of `record`.
    pub fn from_record<T: Schema>(record: &T) -> Self {
        let condition = record.into_condition(Encoding::Condition);
        return Self {
            column: condition.fields.into_iter().next().map(|field| field.column),
        };
    }

    pub fn name(&self, kind: BackendKind) -> Option<&str> {
        return self.column.as_ref().map(|column| column.name(kind));
    }
}

impl From<&str> for SortKey {
    fn from(name: &str) -> Self { Self::column(name) }
}

impl From<String> for SortKey {
    fn from(name: String) -> Self { Self::column(name) }
}

impl<T: Schema> From<&T> for SortKey {
    fn from(record: &T) -> Self { Self::from_record(record) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl From<Order> for WhereMode {
    fn from(order: Order) -> Self {
        return match order {
            Order::Asc => Self::Asc,
            Order::Desc => Self::Desc,
        };
    }
}
