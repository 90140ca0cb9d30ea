pub mod tests_records;

use insta::assert_snapshot;
use lupaorm::{
    Error,
    condition::Encoding,
    oplog::OpKey,
    prelude::*,
    schema::utils::record_to_row,
    translate::{DocumentTranslator, SqlQuery, SqlTranslator, translate},
};
use serde_json::json;
use std::error::Error as StdError;
use tests_records::*;
use tests_utils::*;

fn chained(engine: &Engine) -> Model {
    return engine
        .model::<Task>()
        .where_(&Task {
            name: String::from("rent"),
            priority: 3,
            ..Task::default()
        })
        .or(("status", 1))
        .not(("done", Value::Null))
        .desc("create_time")
        .page(2, 10);
}

#[test]
fn operation_log_order() -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let engine = Engine::sqlite_in_memory()?;
    let keys = chained(&engine)
        .ops()
        .keys()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    assert_eq!(
        keys,
        [
            "where `name` = ?",
            "where `priority` = ?",
            "or `status` = ?",
            "not `done` = ?",
            "desc `create_time`",
            "limit ",
            "offset ",
        ]
    );

    Ok(())
}

#[test]
fn relational_statements() -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let engine = Engine::sqlite_in_memory()?;
    let query = translate::<SqlTranslator>(chained(&engine).ops())?;

    let (sql, params) = query.select("task");
    assert_snapshot!(sql, @"SELECT * FROM `task` WHERE (`name` = ? AND `priority` = ? OR `status` = ?) AND `done` IS NOT NULL ORDER BY `create_time` DESC LIMIT 10 OFFSET 10");
    assert_eq!(params, [json!("rent"), json!(3), json!(1)]);

    let (sql, _) = query.count("task");
    assert_snapshot!(sql, @"SELECT COUNT(*) FROM `task` WHERE (`name` = ? AND `priority` = ? OR `status` = ?) AND `done` IS NOT NULL");

    let task = Task::new(&mut 0, "Pay rent", 3);
    let (sql, params) = SqlQuery::insert(
        "task",
        &record_to_row(&task, BackendKind::Relational, Encoding::Full)?,
    );
    assert_snapshot!(sql, @"INSERT INTO `task` (`create_time`, `name`, `status`, `priority`, `done`, `deadline`) VALUES (?, ?, ?, ?, ?, ?)");
    assert_eq!(params.len(), 6);

    let by_id = engine.model::<Task>().where_(&Task::with_id("42"));
    let delta = Task {
        priority: 5,
        ..Task::default()
    };
    let delta = (&delta)
        .into_condition(Encoding::Delta)
        .into_row(BackendKind::Relational);
    let (sql, params) = translate::<SqlTranslator>(by_id.ops())?.update("task", &delta);
    assert_snapshot!(sql, @"UPDATE `task` SET `status` = ?, `priority` = ? WHERE `id` = ?");
    assert_eq!(params, [json!(0), json!(5), json!("42")]);

    Ok(())
}

#[test]
fn relational_raw_and_null() -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let engine = Engine::sqlite_in_memory()?;
    let model = engine
        .table("task")
        .where_is("where priority between ? and ?", [1, 3])
        .where_(("done", Value::Null))
        .or(("name", Value::Null))
        .like(&Task::named("50%"));

    let query = translate::<SqlTranslator>(model.ops())?;
    assert_snapshot!(query.condition().unwrap_or_default(), @"((priority between ? and ?) AND `done` IS NULL OR `name` IS NULL) AND `name` LIKE ?");
    assert_eq!(query.params(), [json!(1), json!(3), json!("%50%%")]);

    Ok(())
}

#[test]
fn document_filters() -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let engine = Engine::document_in_memory();
    let query = translate::<DocumentTranslator>(chained(&engine).ops())?;

    assert_snapshot!(
        serde_json::to_string(&query.filter)?,
        @r#"{"$or":[{"name":{"$eq":"rent"},"priority":{"$eq":3}},{"status":{"$eq":1}}],"done":{"$ne":null}}"#
    );
    assert_eq!(query.sort, [(String::from("create_time"), -1)]);
    assert_eq!((query.skip, query.limit), (Some(10), Some(10)));

    let like = engine.model::<Task>().like(&Task::named("a.b"));
    let query = translate::<DocumentTranslator>(like.ops())?;
    assert_snapshot!(
        serde_json::to_string(&query.filter)?,
        @r#"{"name":{"$regex":"a\\.b","$options":"i"}}"#
    );

    let raw = engine
        .model::<Task>()
        .where_is("tags", json!({ "$in": ["home"] }))
        .where_(&Task::with_id("507f1f77bcf86cd799439011"));
    let query = translate::<DocumentTranslator>(raw.ops())?;
    assert_snapshot!(
        serde_json::to_string(&query.filter)?,
        @r#"{"tags":{"$in":["home"]},"_id":{"$oid":"507f1f77bcf86cd799439011"}}"#
    );

    Ok(())
}

#[test]
fn tagged_column_names() -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let label = Label {
        id: String::from("7"),
        title: String::from("Home"),
        internal: String::from("x"),
        ..Label::default()
    };

    let relational = Engine::sqlite_in_memory()?.model::<Label>().where_(&label);
    let query = translate::<SqlTranslator>(relational.ops())?;
    assert_snapshot!(query.condition().unwrap_or_default(), @"`label_id` = ? AND `label_title` = ? AND `internal` = ?");

    // `internal` is hidden from the document backend, and "7" is no valid identity there
    let document = Engine::document_in_memory().model::<Label>().where_(&label);
    assert_eq!(
        document.ops().keys().len(),
        2,
        "internal should not be recorded"
    );
    assert!(matches!(
        translate::<DocumentTranslator>(document.ops()),
        Err(Error::Translation { .. })
    ));

    Ok(())
}

#[test]
fn unresolved_table() -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let engine = Engine::document_in_memory();
    assert!(matches!(
        engine.untyped().where_(("name", "x")).count(),
        Err(Error::UnresolvedTable)
    ));

    // The first record seen names the table
    let adopted = engine.untyped().where_(&Task::named("x"));
    assert_eq!(adopted.table_name(), Some("task"));
    assert_eq!(adopted.count()?, 0);

    Ok(())
}

#[test]
fn page_offset_saturates() {
    init_tracing_for_tests();

    let model = Engine::document_in_memory().model::<Task>().page(u64::MAX, 3);

    assert_eq!(model.ops().load(&OpKey::Offset), Some(json!(u64::MAX)));
    assert_eq!(model.ops().load(&OpKey::Limit), Some(json!(3)));
}
