//! Insertion-ordered, concurrency-safe map that records a model's operations.
//!
//! Translators replay the log in the exact order operations were stored, so the log never reorders:
//! re-storing an existing key keeps its original position, and deleting a key leaves a vacant slot
//! behind (reclaimed by an occasional compaction) instead of moving any other entry.

use crate::{Value, condition::WhereMode};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::{fmt::Display, hash::Hash};

/// Vacant slots tolerated before [`OrderedMap::delete`] compacts the entries.
const COMPACT_THRESHOLD: usize = 32;

#[derive(Debug)]
pub struct OrderedMap<K, V> {
    slots: RwLock<Slots<K, V>>,
}

#[derive(Clone, Debug)]
struct Slots<K, V> {
    entries: Vec<Option<(K, V)>>,
    index: HashMap<K, usize>,
    vacant: usize,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        return Self {
            slots: RwLock::new(Slots {
                entries: Vec::new(),
                index: HashMap::new(),
                vacant: 0,
            }),
        };
    }
}

impl<K: Clone, V: Clone> Clone for OrderedMap<K, V> {
    fn clone(&self) -> Self {
        return Self {
            slots: RwLock::new(self.slots.read().clone()),
        };
    }
}

impl<K: Eq + Hash + Clone, V: Clone> OrderedMap<K, V> {
    pub fn new() -> Self { Self::default() }

    /// Inserts or overwrites `key`. An overwrite keeps the key's original position.
    pub fn store(&self, key: K, value: V) {
        let mut slots = self.slots.write();

        if let Some(&position) = slots.index.get(&key) {
            slots.entries[position] = Some((key, value));
            return;
        }

        let position = slots.entries.len();
        slots.index.insert(key.clone(), position);
        slots.entries.push(Some((key, value)));
    }

    pub fn load(&self, key: &K) -> Option<V> {
        let slots = self.slots.read();
        let position = *slots.index.get(key)?;

        return slots.entries[position].as_ref().map(|(_, value)| value.clone());
    }

    /// Removes `key` in constant time, leaving the relative order of every other entry intact.
    pub fn delete(&self, key: &K) -> Option<V> {
        let mut slots = self.slots.write();
        let position = slots.index.remove(key)?;
        let (_, value) = slots.entries[position].take()?;
        slots.vacant += 1;

        if slots.vacant > COMPACT_THRESHOLD && slots.vacant * 2 > slots.entries.len() {
            slots.compact();
        }

        return Some(value);
    }

    /// Visits entries in insertion order until `f` returns `false`.
    ///
    /// The map stays read-locked for the whole visit, `f` must not call [`Self::store`] or
    /// [`Self::delete`] on the same map.
    pub fn range(&self, mut f: impl FnMut(&K, &V) -> bool) {
        let slots = self.slots.read();

        for (key, value) in slots.entries.iter().flatten() {
            if !f(key, value) {
                return;
            }
        }
    }

    pub fn keys(&self) -> Vec<K> {
        let slots = self.slots.read();
        return slots.entries.iter().flatten().map(|(key, _)| key.clone()).collect();
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        let slots = self.slots.read();
        return slots.entries.iter().flatten().cloned().collect();
    }

    pub fn len(&self) -> usize { self.slots.read().index.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn clear(&self) {
        let mut slots = self.slots.write();
        slots.entries.clear();
        slots.index.clear();
        slots.vacant = 0;
    }
}

impl<K: Eq + Hash + Clone, V> Slots<K, V> {
    fn compact(&mut self) {
        self.entries.retain(Option::is_some);
        self.index.clear();

        for (position, (key, _)) in self.entries.iter().flatten().enumerate() {
            self.index.insert(key.clone(), position);
        }

        self.vacant = 0;
    }
}

/// Key of a single entry in the [`OpList`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OpKey {
    /// Predicate or sort directive produced by the condition encoder.
    Where { mode: WhereMode, column: String },
    /// Caller-supplied expression stored verbatim.
    Raw(String),
    Limit,
    Offset,
}

impl Display for OpKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return match self {
            Self::Where { mode, column } => match mode {
                WhereMode::Is => write!(f, "where `{column}` = ?"),
                WhereMode::Not => write!(f, "not `{column}` = ?"),
                WhereMode::Gt => write!(f, "where `{column}` > ?"),
                WhereMode::Lt => write!(f, "where `{column}` < ?"),
                WhereMode::Gte => write!(f, "where `{column}` >= ?"),
                WhereMode::Lte => write!(f, "where `{column}` <= ?"),
                WhereMode::Or => write!(f, "or `{column}` = ?"),
                WhereMode::Like => write!(f, "where `{column}` like ?"),
                WhereMode::Asc => write!(f, "asc `{column}`"),
                WhereMode::Desc => write!(f, "desc `{column}`"),
            },
            Self::Raw(expression) => write!(f, "{expression}"),
            Self::Limit => write!(f, "limit "),
            Self::Offset => write!(f, "offset "),
        };
    }
}

/// The ordered operation log carried by every model.
pub type OpList = OrderedMap<OpKey, Value>;

impl OrderedMap<OpKey, Value> {
    /// Whether any entry restricts the affected rows, sorting and pagination do not count.
    pub fn has_filter(&self) -> bool {
        let mut found = false;
        self.range(|key, _| {
            found = match key {
                OpKey::Where { mode, .. } => !mode.is_sort(),
                OpKey::Raw(_) => true,
                OpKey::Limit | OpKey::Offset => false,
            };
            return !found;
        });

        return found;
    }

    /// Column/value pairs of every plain equality predicate, in log order.
    pub fn equality_predicates(&self) -> Vec<(String, Value)> {
        let mut pairs = Vec::new();
        self.range(|key, value| {
            if let OpKey::Where {
                mode: WhereMode::Is,
                column,
            } = key
            {
                pairs.push((column.clone(), value.clone()));
            }
            return true;
        });

        return pairs;
    }

    /// A new log holding only the plain equality predicates.
    pub fn equality_only(&self) -> Self {
        let log = Self::new();
        for (column, value) in self.equality_predicates() {
            log.store(
                OpKey::Where {
                    mode: WhereMode::Is,
                    column,
                },
                value,
            );
        }

        return log;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn where_is(column: &str) -> OpKey {
        return OpKey::Where {
            mode: WhereMode::Is,
            column: column.to_string(),
        };
    }

    #[test]
    fn store_keeps_first_position() {
        let map = OrderedMap::new();
        map.store("a", 1);
        map.store("b", 2);
        map.store("a", 3);

        assert_eq!(map.entries(), vec![("a", 3), ("b", 2)]);
    }

    #[test]
    fn delete_preserves_relative_order() {
        let map = OrderedMap::new();
        for (position, key) in ["a", "b", "c", "d", "e"].into_iter().enumerate() {
            map.store(key, position);
        }

        assert_eq!(map.delete(&"b"), Some(1));
        assert_eq!(map.delete(&"missing"), None);
        map.store("f", 5);

        assert_eq!(map.keys(), vec!["a", "c", "d", "e", "f"]);
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn compaction_keeps_order() {
        let map = OrderedMap::new();
        for key in 0..200 {
            map.store(key, key * 10);
        }
        for key in (0..200).filter(|key| key % 3 != 0) {
            map.delete(&key);
        }

        let expected = (0..200).filter(|key| key % 3 == 0).collect::<Vec<_>>();
        assert_eq!(map.keys(), expected);
        assert_eq!(map.load(&99), Some(990));
        assert_eq!(map.load(&98), None);
    }

    #[test]
    fn range_stops_early() {
        let map = OrderedMap::new();
        for key in 0..10 {
            map.store(key, ());
        }

        let mut visited = Vec::new();
        map.range(|key, _| {
            visited.push(*key);
            return *key < 3;
        });

        assert_eq!(visited, vec![0, 1, 2, 3]);
    }

    #[test]
    fn clone_is_a_snapshot() {
        let log = OpList::new();
        log.store(where_is("name"), Value::from("pay"));

        let snapshot = log.clone();
        log.store(OpKey::Limit, Value::from(10));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn op_keys_render() {
        let keys = [
            where_is("name").to_string(),
            OpKey::Where {
                mode: WhereMode::Or,
                column: "status".to_string(),
            }
            .to_string(),
            OpKey::Where {
                mode: WhereMode::Desc,
                column: "deadline".to_string(),
            }
            .to_string(),
            OpKey::Limit.to_string(),
        ];

        assert_eq!(
            keys,
            ["where `name` = ?", "or `status` = ?", "desc `deadline`", "limit "]
        );
    }

    #[test]
    fn filters_exclude_sort_and_pagination() {
        let log = OpList::new();
        log.store(
            OpKey::Where {
                mode: WhereMode::Asc,
                column: "name".to_string(),
            },
            Value::Null,
        );
        log.store(OpKey::Limit, Value::from(5));
        assert!(!log.has_filter());

        log.store(where_is("name"), Value::from("pay"));
        assert!(log.has_filter());
        assert_eq!(
            log.equality_predicates(),
            vec![("name".to_string(), Value::from("pay"))]
        );
    }
}
