use super::{Column, Schema};
use crate::{
    Error, Map, Result, Value,
    condition::{ColumnRef, Encoding, Field},
    engine::BackendKind,
    identity::ObjectId,
};
use serde::Serialize;

/// Whether `value` is the zero value of its type: null, `false`, `0`, `""`, or an empty or
/// all-zero container.
pub fn is_zero(value: &Value) -> bool {
    return match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.values().all(is_zero),
    };
}

pub fn to_object(record: &impl Serialize) -> Result<Map<String, Value>> {
    return match serde_json::to_value(record) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(Error::SerializationFailure(
            format!("expected a record serializing to an object, got [{other}]").into(),
        )),
        Err(e) => Err(Error::SerializationFailure(Box::new(e))),
    };
}

/// Leaf columns of a spec, embedded structs expanded in place.
pub fn leaf_columns(spec: &'static [Column]) -> Vec<Column> {
    let mut leaves = Vec::with_capacity(spec.len());
    for column in spec {
        match column.columns() {
            Some(embedded) => leaves.extend(leaf_columns(embedded)),
            None => leaves.push(*column),
        }
    }

    return leaves;
}

/// Encodes the fields of `record` selected by `encoding`, in declaration order.
///
/// Fields not declared in the record's spec are never encoded. Skipping is decided per column,
/// both backends see the same list and resolve names later.
pub fn encode_record<T: Schema>(record: &T, encoding: Encoding) -> Result<Vec<Field>> {
    let object = to_object(record)?;

    let fields = leaf_columns(T::field_spec())
        .into_iter()
        .filter_map(|column| {
            let value = object.get(column.field())?;
            let keep = match encoding {
                Encoding::Condition => !is_zero(value),
                Encoding::Delta => {
                    !column.is_identity(BackendKind::Relational)
                        && !column.is_identity(BackendKind::Document)
                        && (column.is_must() || !is_zero(value))
                }
                Encoding::Full => {
                    let identity = column.is_identity(BackendKind::Relational)
                        || column.is_identity(BackendKind::Document);
                    !(identity && is_zero(value))
                }
            };

            return keep.then(|| Field {
                column: ColumnRef::Schema(column),
                value: value.clone(),
            });
        })
        .collect();

    return Ok(fields);
}

/// Column-keyed row of `record` for one backend, hidden columns dropped.
pub fn record_to_row<T: Schema>(
    record: &T,
    kind: BackendKind,
    encoding: Encoding,
) -> Result<Map<String, Value>> {
    let row = encode_record(record, encoding)?
        .into_iter()
        .filter(|field| match &field.column {
            ColumnRef::Schema(column) => !column.is_skipped(kind),
            ColumnRef::Named(_) => true,
        })
        .map(|field| (field.column.name(kind).to_string(), field.value))
        .collect();

    return Ok(row);
}

/// Rebuilds a record from a column-keyed row.
///
/// Engine-specific identity shapes (such as `{"$oid": …}`) are flattened to their string form.
/// When the record's identity field expects a string but the engine returned a number, decoding is
/// retried with the identity converted to a string.
pub fn row_to_record<T: Schema>(mut row: Map<String, Value>, kind: BackendKind) -> Result<T> {
    let mut object = Map::with_capacity(row.len());
    let mut identity_field = None;

    for column in leaf_columns(T::field_spec()) {
        if column.is_skipped(kind) {
            continue;
        }

        if let Some(value) = row.remove(column.name(kind)) {
            if column.is_identity(kind) {
                identity_field = Some(column.field());
            }
            object.insert(column.field().to_string(), normalize(value));
        }
    }

    for (key, value) in row {
        if !object.contains_key(&key) {
            object.insert(key, normalize(value));
        }
    }

    let first_error = match serde_json::from_value::<T>(Value::Object(object.clone())) {
        Ok(record) => return Ok(record),
        Err(e) => e,
    };

    if let Some(field) = identity_field
        && let Some(Value::Number(number)) = object.get(field)
    {
        let stringified = Value::String(number.to_string());
        object.insert(field.to_string(), stringified);

        if let Ok(record) = serde_json::from_value::<T>(Value::Object(object)) {
            return Ok(record);
        }
    }

    return Err(Error::DeserializationFailure(Box::new(first_error)));
}

fn normalize(value: Value) -> Value {
    return match ObjectId::from_value(&value) {
        Some(id) => Value::String(id.to_hex()),
        None => value,
    };
}

/// Renders a scalar as the plain string form used for identities.
pub fn value_to_string(value: &Value) -> String {
    if let Some(id) = ObjectId::from_value(value) {
        return id.to_hex();
    }

    return match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
}
