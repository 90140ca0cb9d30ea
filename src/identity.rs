//! Reads and assigns record identities across backends.
//!
//! Relational identities are whatever the identity column holds (usually an auto-assigned
//! integer); document identities are 12-byte [`ObjectId`]s, exchanged with callers as 24-character
//! hex strings and stored as `{"$oid": "<hex>"}`.

use crate::{
    Error, Map, Result, Value,
    engine::BackendKind,
    schema::{
        Schema,
        utils::{is_zero, leaf_columns, to_object, value_to_string},
    },
};
use getrandom::fill as fill_random;
use std::{
    fmt::Display,
    str::FromStr,
    sync::{
        OnceLock,
        atomic::{AtomicU32, Ordering},
    },
};
use tracing::warn;

/// Identity column name used by each backend for untyped rows.
pub fn identity_column(kind: BackendKind) -> &'static str {
    return match kind {
        BackendKind::Relational => "id",
        BackendKind::Document => "_id",
    };
}

/// Identity column of `T` on one backend, the backend default when `T` declares none.
pub fn identity_column_of<T: Schema>(kind: BackendKind) -> &'static str {
    return leaf_columns(T::field_spec())
        .into_iter()
        .find(|column| !column.is_skipped(kind) && column.is_identity(kind))
        .map_or(identity_column(kind), |column| column.name(kind));
}

/// Identity of `record` as a string, `""` when it has none or it is still zero-valued.
pub fn get_id<T: Schema>(record: &T, kind: BackendKind) -> String {
    let Ok(object) = to_object(record) else {
        return String::new();
    };

    let Some(column) = leaf_columns(T::field_spec())
        .into_iter()
        .find(|column| !column.is_skipped(kind) && column.is_identity(kind))
    else {
        return String::new();
    };

    return match object.get(column.field()) {
        Some(value) if !is_zero(value) => value_to_string(value),
        _ => String::new(),
    };
}

/// Writes `id` into the identity field of `record`, keeping the field's numeric or string shape.
///
/// Returns whether the record changed. Records without an identity field are left untouched.
pub fn set_id<T: Schema>(record: &mut T, kind: BackendKind, id: &str) -> bool {
    let mut object = match to_object(record) {
        Ok(object) => object,
        Err(e) => {
            warn!("Identity [{id}] not assigned, caused by: [{e}]");
            return false;
        }
    };

    let Some(column) = leaf_columns(T::field_spec())
        .into_iter()
        .find(|column| !column.is_skipped(kind) && column.is_identity(kind))
    else {
        return false;
    };

    let value = match object.get(column.field()) {
        Some(Value::Number(_)) => match id.parse::<i64>() {
            Ok(number) => Value::from(number),
            Err(_) => {
                warn!(
                    "Identity [{id}] not assigned, field [{}] expects a number.",
                    column.field()
                );
                return false;
            }
        },
        _ => Value::String(id.to_string()),
    };
    object.insert(column.field().to_string(), value);

    return match serde_json::from_value::<T>(Value::Object(object)) {
        Ok(updated) => {
            *record = updated;
            true
        }
        Err(e) => {
            warn!("Identity [{id}] not assigned, caused by: [{e}]");
            false
        }
    };
}

pub fn get_row_id(row: &Map<String, Value>, kind: BackendKind) -> String {
    return match row.get(identity_column(kind)) {
        Some(value) if !is_zero(value) => value_to_string(value),
        _ => String::new(),
    };
}

pub fn set_row_id(row: &mut Map<String, Value>, kind: BackendKind, id: &str) {
    let value = match (kind, id.parse::<i64>()) {
        (BackendKind::Relational, Ok(number)) => Value::from(number),
        _ => Value::String(id.to_string()),
    };

    row.insert(identity_column(kind).to_string(), value);
}

/// Normalizes a caller-supplied identity into the document store's stored shape.
pub fn coerce_document_id(value: &Value) -> Result<Value> {
    return match value {
        Value::String(hex) => Ok(ObjectId::parse_str(hex)?.to_value()),
        other => match ObjectId::from_value(other) {
            Some(id) => Ok(id.to_value()),
            None => Err(Error::translation(
                "_id",
                format!("unrecognized identity format [{other}]"),
            )),
        },
    };
}

/// 12-byte document identity: 4-byte big-endian seconds, 5 process-random bytes, 3-byte counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

impl ObjectId {
    pub fn new() -> Self {
        let seconds = chrono::Utc::now().timestamp() as u32;

        let process = PROCESS_UNIQUE.get_or_init(|| {
            let mut bytes = [0u8; 5];
            if let Err(e) = fill_random(&mut bytes) {
                warn!("Falling back to a time-derived identity seed, caused by: [{e}]");
                let nanos = chrono::Utc::now().timestamp_subsec_nanos().to_be_bytes();
                let pid = std::process::id().to_be_bytes();
                bytes = [nanos[0], nanos[1], nanos[2], pid[2], pid[3]];
            }
            bytes
        });

        let counter = COUNTER
            .get_or_init(|| {
                let mut seed = [0u8; 4];
                let _ = fill_random(&mut seed);
                AtomicU32::new(u32::from_be_bytes(seed))
            })
            .fetch_add(1, Ordering::Relaxed)
            .to_be_bytes();

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process);
        bytes[9..].copy_from_slice(&counter[1..]);

        return Self(bytes);
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self { Self(bytes) }

    pub fn bytes(&self) -> [u8; 12] { self.0 }

    pub fn parse_str(hex: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            Error::translation("_id", format!("[{hex}] is not a valid object id: {reason}"))
        };

        if hex.len() != 24 {
            return Err(invalid("expected 24 hex characters"));
        }

        let mut bytes = [0u8; 12];
        for (position, byte) in bytes.iter_mut().enumerate() {
            let pair = hex
                .get(position * 2..position * 2 + 2)
                .ok_or_else(|| invalid("expected ASCII hex characters"))?;
            *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid("expected hex digits"))?;
        }

        return Ok(Self(bytes));
    }

    pub fn to_hex(&self) -> String {
        use std::fmt::Write;

        let mut hex = String::with_capacity(24);
        for byte in self.0 {
            let _ = write!(hex, "{byte:02x}");
        }

        return hex;
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::Utc> {
        let seconds = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        return chrono::DateTime::from_timestamp(i64::from(seconds), 0).unwrap_or_default();
    }

    /// Stored shape, `{"$oid": "<hex>"}`
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("$oid".to_string(), Value::String(self.to_hex()));
        return Value::Object(object);
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }

        return Self::parse_str(object.get("$oid")?.as_str()?).ok();
    }
}

impl Default for ObjectId {
    fn default() -> Self { Self::new() }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return write!(f, "{}", self.to_hex());
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> { Self::parse_str(s) }
}
