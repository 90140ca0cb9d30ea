#![allow(dead_code)]

use lupaorm::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskBase {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub create_time: i64,
}

impl TaskBase {
    pub const SPEC: &'static [Column] = &[
        Column::new("id").document("_id").identity(),
        Column::new("create_time"),
    ];
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(flatten)]
    pub base: TaskBase,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub done: OrmBool,
    #[serde(default)]
    pub deadline: i64,
}

impl Schema for Task {
    const TABLE: Option<&'static str> = Some("task");

    fn field_spec() -> &'static [Column] {
        const SPEC: &[Column] = &[
            Column::embedded("base", TaskBase::SPEC),
            Column::new("name"),
            Column::new("status").must(),
            Column::new("priority"),
            Column::new("done"),
            Column::new("deadline"),
        ];
        return SPEC;
    }
}

impl Task {
    pub fn new(id: &mut i64, name: &str, priority: i64) -> Self {
        *id += 1;

        return Self {
            base: TaskBase {
                id: String::new(),
                create_time: 1_700_000_000 + *id,
            },
            name: name.to_string(),
            status: 0,
            priority,
            done: OrmBool::UNSET,
            deadline: 0,
        };
    }

    pub fn with_id(id: &str) -> Self {
        return Self {
            base: TaskBase {
                id: id.to_string(),
                create_time: 0,
            },
            ..Self::default()
        };
    }

    pub fn named(name: &str) -> Self {
        return Self {
            name: name.to_string(),
            ..Self::default()
        };
    }
}

/// Columns described through tag strings, with a column hidden from the document backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub internal: String,
}

static LABEL_SPEC: LazyLock<Vec<Column>> = LazyLock::new(|| {
    return vec![
        Column::tagged("id", "column:label_id;primaryKey", "_id,omitempty"),
        Column::tagged("title", "column:label_title", "title"),
        Column::tagged("color", "color", "colour,must"),
        Column::tagged("internal", "column:internal", "-"),
    ];
});

impl Schema for Label {
    fn field_spec() -> &'static [Column] { &LABEL_SPEC }
}

pub const TASK_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS `task` (
    `id` INTEGER PRIMARY KEY AUTOINCREMENT,
    `create_time` INTEGER NOT NULL DEFAULT 0,
    `name` TEXT NOT NULL DEFAULT '',
    `status` INTEGER NOT NULL DEFAULT 0,
    `priority` INTEGER NOT NULL DEFAULT 0,
    `done` INTEGER NOT NULL DEFAULT 0,
    `deadline` INTEGER NOT NULL DEFAULT 0
)";

pub const LABEL_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS `label` (
    `label_id` INTEGER PRIMARY KEY AUTOINCREMENT,
    `label_title` TEXT NOT NULL DEFAULT '',
    `color` TEXT NOT NULL DEFAULT '',
    `internal` TEXT NOT NULL DEFAULT ''
)";

/// Relational engines need their tables up front; document collections appear on first insert.
pub fn create_tables(engine: &Engine) -> lupaorm::Result<()> {
    if let Engine::Relational(sqlite) = engine {
        sqlite.execute_batch(TASK_TABLE_SQL)?;
        sqlite.execute_batch(LABEL_TABLE_SQL)?;
    }

    return Ok(());
}
