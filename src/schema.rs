pub mod tags;
pub mod utils;

use crate::{Deserialize, Serialize, engine::BackendKind};

/// Placeholder meaning "empty string" for text columns, since `""` is treated as absent.
pub const EMPTY_STR: &str = "-";

/// Represents a Record that can be mapped to a table or collection
///
/// Record must implement both [`Serialize`] and [`Deserialize`], and serialize to an object whose
/// keys are the field names listed in [`Schema::field_spec`]. Embedded structs are expected to be
/// flattened into their parent with `#[serde(flatten)]`.
pub trait Schema: Serialize + for<'a> Deserialize<'a> {
    /// Table (or collection) the record lives in, when it has a fixed one
    const TABLE: Option<&'static str> = None;

    /// Declared columns, in field declaration order
    fn field_spec() -> &'static [Column];

    /// Resolved table name, falling back to the lowercased type name
    fn table_name() -> String {
        if let Some(table) = Self::TABLE {
            return table.to_string();
        }

        let type_name = std::any::type_name::<Self>();
        let short = type_name
            .split('<')
            .next()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or(type_name);

        return short.to_lowercase();
    }
}

/// Per-backend description of one field of a [`Schema`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Column {
    field: &'static str,
    relational: Option<&'static str>,
    document: Option<&'static str>,
    skip_relational: bool,
    skip_document: bool,
    identity: bool,
    must: bool,
    embedded: Option<&'static [Column]>,
}

impl Column {
    /// A column named after `field` on every backend
    pub const fn new(field: &'static str) -> Self {
        return Self {
            field,
            relational: None,
            document: None,
            skip_relational: false,
            skip_document: false,
            identity: false,
            must: false,
            embedded: None,
        };
    }

    /// An embedded struct whose columns are expanded in place
    pub const fn embedded(field: &'static str, columns: &'static [Column]) -> Self {
        let mut column = Self::new(field);
        column.embedded = Some(columns);
        return column;
    }

    pub const fn relational(mut self, name: &'static str) -> Self {
        self.relational = Some(name);
        return self;
    }

    pub const fn document(mut self, name: &'static str) -> Self {
        self.document = Some(name);
        return self;
    }

    /// Marks the column as the record's identity (primary key)
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        return self;
    }

    /// Keeps the column in update deltas even when it holds a zero value
    pub const fn must(mut self) -> Self {
        self.must = true;
        return self;
    }

    /// Hides the column from one backend
    pub const fn skip(mut self, kind: BackendKind) -> Self {
        match kind {
            BackendKind::Relational => self.skip_relational = true,
            BackendKind::Document => self.skip_document = true,
        }
        return self;
    }

    /// Builds a column from tag strings, see [`tags`] for the grammar.
    pub fn tagged(
        field: &'static str,
        relational_tag: &'static str,
        document_tag: &'static str,
    ) -> Self {
        let relational = tags::parse_relational(relational_tag);
        let document = tags::parse_document(document_tag);

        return Self {
            field,
            relational: relational.name,
            document: document.name,
            skip_relational: relational.skip,
            skip_document: document.skip,
            identity: relational.primary_key,
            must: relational.must || document.must,
            embedded: None,
        };
    }

    pub fn field(&self) -> &'static str { self.field }

    pub fn columns(&self) -> Option<&'static [Column]> { self.embedded }

    pub fn is_must(&self) -> bool { self.must }

    pub fn is_skipped(&self, kind: BackendKind) -> bool {
        return match kind {
            BackendKind::Relational => self.skip_relational,
            BackendKind::Document => self.skip_document,
        };
    }

    /// Column name on the given backend
    pub fn name(&self, kind: BackendKind) -> &'static str {
        let name = match kind {
            BackendKind::Relational => self.relational,
            BackendKind::Document => self.document,
        };

        return name.unwrap_or(self.field);
    }

    /// Whether the column carries the record's identity on the given backend
    pub fn is_identity(&self, kind: BackendKind) -> bool {
        return self.identity || is_identity_name(self.name(kind));
    }
}

pub fn is_identity_name(name: &str) -> bool { name == "id" || name == "_id" }

/// Tri-state boolean stored as an integer, so that `false` survives the zero-value-is-absent rule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrmBool(pub i8);

impl OrmBool {
    pub const TRUE: Self = Self(1);
    pub const FALSE: Self = Self(-1);
    pub const UNSET: Self = Self(0);

    pub fn is_set(&self) -> bool { self.0 != 0 }

    pub fn as_bool(&self) -> Option<bool> {
        return match self.0 {
            0 => None,
            value => Some(value > 0),
        };
    }
}

impl From<bool> for OrmBool {
    fn from(value: bool) -> Self {
        return match value {
            true => Self::TRUE,
            false => Self::FALSE,
        };
    }
}
