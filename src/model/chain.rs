use super::Model;
use crate::{
    Value,
    condition::{Encoding, IntoCondition, Order, SortKey, WhereMode},
    context::Context,
    engine::BackendKind,
    oplog::OpKey,
    schema::utils::value_to_string,
};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::warn;

impl Model {
    /// Records every entry of `condition` under `mode`, in encoder order.
    pub fn push(mut self, mode: WhereMode, condition: impl IntoCondition) -> Self {
        let condition = condition.into_condition(Encoding::Condition);
        self.adopt_table(condition.table());

        let kind = self.kind();
        let from_record = condition.is_record();

        for field in condition.visible(kind) {
            let column = field.column.name(kind).to_string();
            let value = match mode == WhereMode::Like && from_record {
                true => like_pattern(kind, &field.value),
                false => field.value.clone(),
            };

            self.ops.store(OpKey::Where { mode, column }, value);
        }

        return self;
    }

    /// Equality on every non-zero field, pair, or map entry.
    pub fn where_(self, condition: impl IntoCondition) -> Self { self.push(WhereMode::Is, condition) }

    pub fn equal(self, condition: impl IntoCondition) -> Self { self.where_(condition) }

    pub fn where_not(self, condition: impl IntoCondition) -> Self {
        return self.push(WhereMode::Not, condition);
    }

    pub fn not(self, condition: impl IntoCondition) -> Self { self.where_not(condition) }

    pub fn where_gt(self, condition: impl IntoCondition) -> Self { self.push(WhereMode::Gt, condition) }

    pub fn gt(self, condition: impl IntoCondition) -> Self { self.where_gt(condition) }

    pub fn where_lt(self, condition: impl IntoCondition) -> Self { self.push(WhereMode::Lt, condition) }

    pub fn lt(self, condition: impl IntoCondition) -> Self { self.where_lt(condition) }

    pub fn where_gte(self, condition: impl IntoCondition) -> Self {
        return self.push(WhereMode::Gte, condition);
    }

    pub fn gte(self, condition: impl IntoCondition) -> Self { self.where_gte(condition) }

    pub fn where_lte(self, condition: impl IntoCondition) -> Self {
        return self.push(WhereMode::Lte, condition);
    }

    pub fn lte(self, condition: impl IntoCondition) -> Self { self.where_lte(condition) }

    /// Disjunction with everything recorded so far.
    pub fn where_or(self, condition: impl IntoCondition) -> Self { self.push(WhereMode::Or, condition) }

    pub fn or(self, condition: impl IntoCondition) -> Self { self.where_or(condition) }

    /// Substring match. Record fields are wrapped for the backend (`%v%`, or a case-insensitive
    /// escaped regex); pairs and maps are passed through untouched.
    pub fn where_like(self, condition: impl IntoCondition) -> Self {
        return self.push(WhereMode::Like, condition);
    }

    pub fn like(self, condition: impl IntoCondition) -> Self { self.where_like(condition) }

    /// Records a backend-native expression verbatim: a SQL fragment with `?` placeholders, or a
    /// document filter key.
    pub fn where_is(self, expression: impl Into<String>, value: impl Serialize) -> Self {
        let expression = expression.into();

        match serde_json::to_value(value) {
            Ok(value) => self.ops.store(OpKey::Raw(expression), value),
            Err(e) => warn!("Skipping expression [{expression}], caused by: [{e}]"),
        }

        return self;
    }

    pub fn order(self, key: impl Into<SortKey>, order: Order) -> Self {
        let key = key.into();
        let kind = self.kind();

        let Some(column) = key.name(kind).map(String::from) else {
            warn!("Skipping [{order:?}] sort, the key names no column.");
            return self;
        };

        let mode = WhereMode::from(order);
        self.ops.store(OpKey::Where { mode, column }, Value::Null);
        return self;
    }

    pub fn asc(self, key: impl Into<SortKey>) -> Self { self.order(key, Order::Asc) }

    pub fn desc(self, key: impl Into<SortKey>) -> Self { self.order(key, Order::Desc) }

    /// At most `limit` results. Zero removes the limit.
    pub fn limit(self, limit: u64) -> Self {
        match limit {
            0 => {
                self.ops.delete(&OpKey::Limit);
            }
            limit => self.ops.store(OpKey::Limit, Value::from(limit)),
        }

        return self;
    }

    /// Skips the first `offset` results. Zero removes the offset.
    pub fn offset(self, offset: u64) -> Self {
        match offset {
            0 => {
                self.ops.delete(&OpKey::Offset);
            }
            offset => self.ops.store(OpKey::Offset, Value::from(offset)),
        }

        return self;
    }

    /// One-based page of `limit` results. Page zero is treated as the first page.
    pub fn page(self, page: u64, limit: u64) -> Self {
        let page = page.max(1);
        return self.limit(limit).offset((page - 1).saturating_mul(limit));
    }

    /// Drops every recorded operation, keeping the table and context.
    pub fn reset(self) -> Self {
        self.ops.clear();
        return self;
    }

    /// Same as [`Self::reset`]: predicates, sorting and pagination are all dropped.
    pub fn reset_filter(self) -> Self { self.reset() }

    /// Targets another table by name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        return self;
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        return self;
    }

    /// Attaches a value to the model's context, creating the context if needed.
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context = Some(self.context().with_value(key, value));
        return self;
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.context = Some(self.context().with_timeout(timeout));
        return self;
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        return self.context.as_ref().and_then(|context| context.value(key).cloned());
    }
}

fn like_pattern(kind: BackendKind, value: &Value) -> Value {
    let text = value_to_string(value);

    return match kind {
        BackendKind::Relational => Value::String(format!("%{text}%")),
        BackendKind::Document => json!({ "$regex": regex::escape(&text), "$options": "i" }),
    };
}
