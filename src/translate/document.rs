use super::Translator;
use crate::{
    Map, Result, Value,
    condition::{Order, WhereMode},
    identity::coerce_document_id,
};

/// Translated document query: a filter document plus find options.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DocumentQuery {
    pub filter: Map<String, Value>,
    /// `(field, 1 | -1)` in precedence order
    pub sort: Vec<(String, i32)>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl DocumentQuery {
    pub fn has_filter(&self) -> bool { !self.filter.is_empty() }
}

#[derive(Debug, Default)]
pub struct DocumentTranslator {
    query: DocumentQuery,
}

fn operator_document(operator: &str, value: Value) -> Map<String, Value> {
    let mut document = Map::new();
    document.insert(operator.to_string(), value);
    return document;
}

/// Whether `object` holds query operators rather than a literal value (an `{"$oid"}` identity
/// is a literal).
pub fn is_operator_map(object: &Map<String, Value>) -> bool {
    return !object.is_empty()
        && object.keys().all(|key| key.starts_with('$'))
        && !(object.len() == 1 && object.contains_key("$oid"));
}

impl DocumentTranslator {
    /// Adds `operators` to the conditions already held for `column`, under an implicit AND.
    fn merge(&mut self, column: &str, operators: Map<String, Value>) {
        match self.query.filter.get_mut(column) {
            Some(Value::Object(current)) if is_operator_map(current) => current.extend(operators),
            Some(current) => {
                let mut merged = operator_document("$eq", std::mem::take(current));
                merged.extend(operators);
                *current = Value::Object(merged);
            }
            None => {
                self.query
                    .filter
                    .insert(column.to_string(), Value::Object(operators));
            }
        }
    }

    fn or(&mut self, clause: Map<String, Value>) {
        if self.query.filter.is_empty() {
            self.query.filter = clause;
            return;
        }

        let current = std::mem::take(&mut self.query.filter);
        self.query.filter = operator_document(
            "$or",
            Value::Array(vec![Value::Object(current), Value::Object(clause)]),
        );
    }
}

impl Translator for DocumentTranslator {
    type Query = DocumentQuery;

    fn predicate(&mut self, mode: WhereMode, column: &str, value: &Value) -> Result<()> {
        let value = match column {
            "_id" => coerce_document_id(value)?,
            _ => value.clone(),
        };

        match mode {
            WhereMode::Is if column == "_id" => {
                self.query.filter.insert(column.to_string(), value);
            }
            WhereMode::Is => self.merge(column, operator_document("$eq", value)),
            WhereMode::Not => self.merge(column, operator_document("$ne", value)),
            WhereMode::Gt => self.merge(column, operator_document("$gt", value)),
            WhereMode::Lt => self.merge(column, operator_document("$lt", value)),
            WhereMode::Gte => self.merge(column, operator_document("$gte", value)),
            WhereMode::Lte => self.merge(column, operator_document("$lte", value)),
            WhereMode::Like => {
                let operators = match value {
                    Value::Object(regex) if regex.contains_key("$regex") => regex,
                    Value::String(pattern) => operator_document("$regex", Value::String(pattern)),
                    other => operator_document("$regex", Value::String(other.to_string())),
                };
                self.merge(column, operators);
            }
            WhereMode::Or => {
                let mut clause = Map::new();
                clause.insert(column.to_string(), Value::Object(operator_document("$eq", value)));
                self.or(clause);
            }
            WhereMode::Asc | WhereMode::Desc => {}
        }

        return Ok(());
    }

    fn raw(&mut self, expression: &str, value: &Value) -> Result<()> {
        let value = match (expression, value) {
            ("_id", Value::String(_)) => coerce_document_id(value)?,
            _ => value.clone(),
        };

        self.query.filter.insert(expression.to_string(), value);
        return Ok(());
    }

    fn sort(&mut self, order: Order, column: &str) {
        let direction = match order {
            Order::Asc => 1,
            Order::Desc => -1,
        };

        self.query.sort.push((column.to_string(), direction));
    }

    fn limit(&mut self, limit: u64) { self.query.limit = Some(limit); }

    fn offset(&mut self, offset: u64) { self.query.skip = Some(offset); }

    fn execute(self) -> DocumentQuery { self.query }
}
