//! Filter evaluation, ordering and updates for the document store.

use crate::{
    Error, Map, Result, Value, engine::Row, identity::ObjectId,
    translate::document::is_operator_map,
};
use hashbrown::HashMap;
use parking_lot::Mutex;
use regex::{Regex, RegexBuilder};
use std::{cmp::Ordering, sync::LazyLock};

/// Patterns kept compiled before the cache is emptied and refilled
const REGEX_CACHE_LIMIT: usize = 256;

/// Compiled `$regex` patterns keyed by pattern and options
static REGEX_CACHE: LazyLock<Mutex<HashMap<(String, String), Regex>>> =
    LazyLock::new(Default::default);

/// Looks up a possibly dotted path (`"address.city"`).
pub fn lookup<'a>(document: &'a Row, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(object) => object.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    return Some(current);
}

/// Whether `document` satisfies every clause of `filter`.
pub fn matches(document: &Row, filter: &Map<String, Value>) -> Result<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$or" => any_clause(document, key, condition)?,
            "$and" => every_clause(document, key, condition)?,
            "$nor" => !any_clause(document, key, condition)?,
            _ => field_matches(lookup(document, key), key, condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    return Ok(true);
}

fn clauses<'a>(operator: &str, condition: &'a Value) -> Result<&'a [Value]> {
    return match condition {
        Value::Array(clauses) => Ok(clauses),
        other => Err(Error::translation(
            operator,
            format!("expected an array of filters, got [{other}]"),
        )),
    };
}

fn clause_matches(document: &Row, operator: &str, clause: &Value) -> Result<bool> {
    return match clause {
        Value::Object(filter) => matches(document, filter),
        other => Err(Error::translation(
            operator,
            format!("expected a filter document, got [{other}]"),
        )),
    };
}

fn any_clause(document: &Row, operator: &str, condition: &Value) -> Result<bool> {
    for clause in clauses(operator, condition)? {
        if clause_matches(document, operator, clause)? {
            return Ok(true);
        }
    }

    return Ok(false);
}

fn every_clause(document: &Row, operator: &str, condition: &Value) -> Result<bool> {
    for clause in clauses(operator, condition)? {
        if !clause_matches(document, operator, clause)? {
            return Ok(false);
        }
    }

    return Ok(true);
}

fn field_matches(field: Option<&Value>, key: &str, condition: &Value) -> Result<bool> {
    let Value::Object(operators) = condition else {
        return Ok(equals(field, condition));
    };
    if !is_operator_map(operators) {
        return Ok(equals(field, condition));
    }

    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals(field, operand),
            "$ne" => !equals(field, operand),
            "$gt" => ordered(field, operand, |o| o == Ordering::Greater),
            "$gte" => ordered(field, operand, |o| o != Ordering::Less),
            "$lt" => ordered(field, operand, |o| o == Ordering::Less),
            "$lte" => ordered(field, operand, |o| o != Ordering::Greater),
            "$in" => clauses(operator, operand)?.iter().any(|v| equals(field, v)),
            "$nin" => !clauses(operator, operand)?.iter().any(|v| equals(field, v)),
            "$exists" => field.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => regex_matches(field, key, operand, operators.get("$options"))?,
            "$options" => true,
            other => {
                return Err(Error::translation(
                    key,
                    format!("unsupported operator [{other}]"),
                ));
            }
        };

        if !satisfied {
            return Ok(false);
        }
    }

    return Ok(true);
}

fn regex_matches(
    field: Option<&Value>,
    key: &str,
    pattern: &Value,
    options: Option<&Value>,
) -> Result<bool> {
    let Some(pattern) = pattern.as_str() else {
        return Err(Error::translation(key, "$regex expects a string pattern"));
    };
    let options = options.and_then(Value::as_str).unwrap_or_default();
    let regex = compiled(key, pattern, options)?;

    return Ok(match field {
        Some(Value::String(text)) => regex.is_match(text),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| item.as_str().is_some_and(|text| regex.is_match(text))),
        _ => false,
    });
}

fn compiled(key: &str, pattern: &str, options: &str) -> Result<Regex> {
    let cache_key = (pattern.to_string(), options.to_string());
    if let Some(regex) = REGEX_CACHE.lock().get(&cache_key) {
        return Ok(regex.clone());
    }

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| Error::translation(key, format!("invalid pattern, caused by: [{e}]")))?;

    let mut cache = REGEX_CACHE.lock();
    if cache.len() >= REGEX_CACHE_LIMIT {
        cache.clear();
    }
    cache.insert(cache_key, regex.clone());

    return Ok(regex);
}

/// Equality with numeric normalisation; `null` also matches a missing field, and an array field
/// matches when any element is equal.
fn equals(field: Option<&Value>, operand: &Value) -> bool {
    return match (field, operand) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(Value::Array(items)), operand) if !operand.is_array() => {
            items.iter().any(|item| compare(item, operand) == Ordering::Equal)
        }
        (Some(value), operand) => compare(value, operand) == Ordering::Equal,
    };
}

/// Range comparison, only between values of the same type class.
fn ordered(field: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = field else {
        return false;
    };
    if type_rank(value) != type_rank(operand) {
        return false;
    }

    return accept(compare(value, operand));
}

fn type_rank(value: &Value) -> u8 {
    if ObjectId::from_value(value).is_some() {
        return 5;
    }

    return match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 6,
    };
}

/// Total order over JSON values: by type class first, then by value.
pub fn compare(left: &Value, right: &Value) -> Ordering {
    let rank = type_rank(left).cmp(&type_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    return match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_i64(), r.as_i64()) {
            (Some(l), Some(r)) => l.cmp(&r),
            _ => l
                .as_f64()
                .unwrap_or_default()
                .total_cmp(&r.as_f64().unwrap_or_default()),
        },
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Array(l), Value::Array(r)) => {
            for (l, r) in l.iter().zip(r) {
                let ordering = compare(l, r);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            l.len().cmp(&r.len())
        }
        (Value::Object(l), Value::Object(r)) => {
            if let (Some(l), Some(r)) = (ObjectId::from_value(left), ObjectId::from_value(right)) {
                return l.cmp(&r);
            }
            for ((lk, lv), (rk, rv)) in l.iter().zip(r) {
                let ordering = lk.cmp(rk).then_with(|| compare(lv, rv));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            l.len().cmp(&r.len())
        }
        _ => Ordering::Equal,
    };
}

/// Stable multi-key sort, earlier keys take precedence. Missing fields sort first.
pub fn sort_documents(documents: &mut [Row], sort: &[(String, i32)]) {
    if sort.is_empty() {
        return;
    }

    documents.sort_by(|left, right| {
        for (path, direction) in sort {
            let ordering = match (lookup(left, path), lookup(right, path)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(l), Some(r)) => compare(l, r),
            };
            let ordering = match *direction < 0 {
                true => ordering.reverse(),
                false => ordering,
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        return Ordering::Equal;
    });
}

/// Applies `$set` semantics: each key replaces (or adds) a top-level field.
pub fn apply_set(document: &mut Row, set: &Row) {
    for (key, value) in set {
        document.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        return match value {
            Value::Object(object) => object,
            _ => Row::new(),
        };
    }

    fn filter(value: Value) -> Map<String, Value> { row(value) }

    #[test]
    fn operators_and_paths() {
        let document = row(json!({
            "name": "Pay Rent",
            "priority": 3,
            "tags": ["home", "money"],
            "owner": { "city": "Oslo" }
        }));

        let satisfied = [
            json!({ "priority": { "$gte": 3, "$lt": 4.5 } }),
            json!({ "tags": "money" }),
            json!({ "owner.city": { "$in": ["Oslo", "Bergen"] } }),
            json!({ "name": { "$regex": "rent", "$options": "i" } }),
            json!({ "missing": null, "deadline": { "$exists": false } }),
            json!({ "$or": [{ "priority": 1 }, { "name": { "$ne": "Groceries" } }] }),
        ];
        for condition in satisfied {
            assert!(
                matches(&document, &filter(condition.clone())).expect("filter should evaluate"),
                "{condition}"
            );
        }

        let unsatisfied = [
            json!({ "priority": { "$gt": 3 } }),
            json!({ "priority": { "$gt": "3" } }),
            json!({ "name": { "$regex": "rent" } }),
            json!({ "$and": [{ "priority": 3 }, { "owner.city": "Bergen" }] }),
        ];
        for condition in unsatisfied {
            assert!(
                !matches(&document, &filter(condition.clone())).expect("filter should evaluate"),
                "{condition}"
            );
        }
    }

    #[test]
    fn regex_compiled_once() {
        let filter = filter(json!({ "name": { "$regex": "^chore \\d+$", "$options": "i" } }));
        let documents = (0..20)
            .map(|n| row(json!({ "name": format!("Chore {n}") })))
            .collect::<Vec<_>>();

        for document in &documents {
            assert!(matches(document, &filter).expect("filter should evaluate"));
        }

        let cache_key = (String::from("^chore \\d+$"), String::from("i"));
        let cached = REGEX_CACHE.lock().get(&cache_key).cloned();
        assert!(cached.is_some_and(|regex| regex.is_match("CHORE 7")));
    }

    #[test]
    fn unknown_operator_fails() {
        let document = row(json!({ "priority": 3 }));
        let outcome = matches(&document, &filter(json!({ "priority": { "$near": 1 } })));

        assert!(matches!(outcome, Err(Error::Translation { .. })));
    }

    #[test]
    fn sort_precedence() {
        let mut documents = [
            json!({ "status": 1, "priority": 1, "name": "c" }),
            json!({ "status": 0, "priority": 1, "name": "b" }),
            json!({ "status": 1, "priority": 2, "name": "a" }),
            json!({ "status": 0, "priority": 2, "name": "d" }),
        ]
        .map(row);

        sort_documents(
            &mut documents,
            &[("status".to_string(), 1), ("priority".to_string(), -1)],
        );

        let names = documents
            .iter()
            .map(|document| document["name"].as_str().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(names, ["d", "b", "a", "c"]);
    }
}
