use super::Translator;
use crate::{Map, Result, Value, condition::Order, condition::WhereMode};
use itertools::Itertools;
use tracing::warn;

/// Quotes an identifier with backticks, doubling embedded backticks.
pub fn quote(identifier: &str) -> String { format!("`{}`", identifier.replace('`', "``")) }

/// Translated relational query: a `WHERE` expression with positional parameters plus ordering
/// and pagination, rendered into statements on demand.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlQuery {
    condition: Option<String>,
    params: Vec<Value>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SqlQuery {
    pub fn condition(&self) -> Option<&str> { self.condition.as_deref() }

    pub fn params(&self) -> &[Value] { &self.params }

    pub fn has_filter(&self) -> bool { self.condition.is_some() }

    pub fn limit(&self) -> Option<u64> { self.limit }

    pub fn offset(&self) -> Option<u64> { self.offset }

    fn where_clause(&self) -> String {
        return match &self.condition {
            Some(condition) => format!(" WHERE {condition}"),
            None => String::new(),
        };
    }

    fn order_clause(&self) -> String {
        if self.order_by.is_empty() {
            return String::new();
        }

        return format!(" ORDER BY {}", self.order_by.iter().join(", "));
    }

    fn pagination_clause(&self) -> String {
        return match (self.limit, self.offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        };
    }

    /// `SELECT` honouring ordering and pagination.
    pub fn select(&self, table: &str) -> (String, Vec<Value>) {
        let sql = format!(
            "SELECT * FROM {}{}{}{}",
            quote(table),
            self.where_clause(),
            self.order_clause(),
            self.pagination_clause(),
        );

        return (sql, self.params.clone());
    }

    /// `rowid` of every row [`Self::select`] returns, in the same order.
    pub fn select_rowids(&self, table: &str) -> (String, Vec<Value>) {
        let sql = format!(
            "SELECT rowid FROM {}{}{}{}",
            quote(table),
            self.where_clause(),
            self.order_clause(),
            self.pagination_clause(),
        );

        return (sql, self.params.clone());
    }

    /// Every column of the rows with one of `count` given rowids, the rowid first under `alias`.
    pub fn select_by_rowids(table: &str, alias: &str, count: usize) -> String {
        let placeholders = std::iter::repeat_n("?", count).join(", ");
        return format!(
            "SELECT rowid AS {}, * FROM {} WHERE rowid IN ({placeholders})",
            quote(alias),
            quote(table)
        );
    }

    /// `COUNT(*)` over every matching row, ignoring ordering and pagination.
    pub fn count(&self, table: &str) -> (String, Vec<Value>) {
        let sql = format!("SELECT COUNT(*) FROM {}{}", quote(table), self.where_clause());
        return (sql, self.params.clone());
    }

    pub fn delete(&self, table: &str) -> (String, Vec<Value>) {
        let sql = format!("DELETE FROM {}{}", quote(table), self.where_clause());
        return (sql, self.params.clone());
    }

    pub fn update(&self, table: &str, delta: &Map<String, Value>) -> (String, Vec<Value>) {
        let assignments = delta
            .keys()
            .map(|column| format!("{} = ?", quote(column)))
            .join(", ");

        let sql = format!(
            "UPDATE {} SET {assignments}{}",
            quote(table),
            self.where_clause()
        );
        let params = delta.values().cloned().chain(self.params.clone()).collect();

        return (sql, params);
    }

    pub fn insert(table: &str, row: &Map<String, Value>) -> (String, Vec<Value>) {
        if row.is_empty() {
            return (format!("INSERT INTO {} DEFAULT VALUES", quote(table)), vec![]);
        }

        let columns = row.keys().map(|column| quote(column)).join(", ");
        let placeholders = row.keys().map(|_| "?").join(", ");
        let sql = format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            quote(table)
        );

        return (sql, row.values().cloned().collect());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Joiner {
    And,
    Or,
}

#[derive(Debug, Default)]
pub struct SqlTranslator {
    query: SqlQuery,
}

impl SqlTranslator {
    fn combine(&mut self, joiner: Joiner, expression: String) {
        self.query.condition = Some(match self.query.condition.take() {
            None => expression,
            Some(current) => match joiner {
                Joiner::And => format!("{current} AND {expression}"),
                Joiner::Or => format!("({current} OR {expression})"),
            },
        });
    }
}

impl Translator for SqlTranslator {
    type Query = SqlQuery;

    fn predicate(&mut self, mode: WhereMode, column: &str, value: &Value) -> Result<()> {
        let column = quote(column);

        let (joiner, expression) = match (mode, value) {
            (WhereMode::Is, Value::Null) => (Joiner::And, format!("{column} IS NULL")),
            (WhereMode::Not, Value::Null) => (Joiner::And, format!("{column} IS NOT NULL")),
            (WhereMode::Or, Value::Null) => (Joiner::Or, format!("{column} IS NULL")),
            (WhereMode::Is, _) => (Joiner::And, format!("{column} = ?")),
            (WhereMode::Not, _) => (Joiner::And, format!("NOT ({column} = ?)")),
            (WhereMode::Gt, _) => (Joiner::And, format!("{column} > ?")),
            (WhereMode::Lt, _) => (Joiner::And, format!("{column} < ?")),
            (WhereMode::Gte, _) => (Joiner::And, format!("{column} >= ?")),
            (WhereMode::Lte, _) => (Joiner::And, format!("{column} <= ?")),
            (WhereMode::Or, _) => (Joiner::Or, format!("{column} = ?")),
            (WhereMode::Like, _) => (Joiner::And, format!("{column} LIKE ?")),
            (WhereMode::Asc | WhereMode::Desc, _) => return Ok(()),
        };

        if !value.is_null() {
            self.query.params.push(value.clone());
        }
        self.combine(joiner, expression);

        return Ok(());
    }

    fn raw(&mut self, expression: &str, value: &Value) -> Result<()> {
        let trimmed = expression.trim();
        let lowered = trimmed.to_ascii_lowercase();

        // Grouped so a caller's own OR never escapes into the surrounding fold
        let (joiner, expression) = if lowered.starts_with("where ") {
            (Joiner::And, format!("({})", trimmed[6..].trim()))
        } else if lowered.starts_with("or ") {
            (Joiner::Or, format!("({})", trimmed[3..].trim()))
        } else if lowered.starts_with("not ") {
            (Joiner::And, format!("NOT ({})", trimmed[4..].trim()))
        } else {
            (Joiner::And, format!("({trimmed})"))
        };

        let placeholders = expression.matches('?').count();
        match value {
            Value::Array(items) if placeholders > 1 && items.len() == placeholders => {
                self.query.params.extend(items.iter().cloned());
            }
            Value::Null if placeholders == 0 => {}
            _ if placeholders == 0 => {
                warn!("Ignoring the value of raw expression [{expression}], it has no placeholder.")
            }
            _ => {
                if placeholders > 1 {
                    warn!("Raw expression [{expression}] expects {placeholders} values, got one.");
                }
                self.query.params.push(value.clone());
            }
        }

        self.combine(joiner, expression);
        return Ok(());
    }

    fn sort(&mut self, order: Order, column: &str) {
        let direction = match order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };

        self.query
            .order_by
            .push(format!("{} {direction}", quote(column)));
    }

    fn limit(&mut self, limit: u64) { self.query.limit = Some(limit); }

    fn offset(&mut self, offset: u64) { self.query.offset = Some(offset); }

    fn execute(self) -> SqlQuery { self.query }
}
