pub mod tests_records;

use lupaorm::{
    Error,
    identity::{get_id, get_row_id},
    prelude::*,
};
use serde_json::json;
use std::error::Error as StdError;
use tests_records::*;
use tests_utils::*;

#[test]
fn crud_sqlite_memory() -> Result<(), Box<dyn StdError>> {
    crud_tester(TestEngine::SqliteMemory)?;

    Ok(())
}

#[test]
fn crud_sqlite_file() -> Result<(), Box<dyn StdError>> {
    crud_tester(TestEngine::SqliteFile)?;

    Ok(())
}

#[test]
fn crud_document_memory() -> Result<(), Box<dyn StdError>> {
    crud_tester(TestEngine::DocumentMemory)?;

    Ok(())
}

#[test]
fn crud_document_file() -> Result<(), Box<dyn StdError>> {
    crud_tester(TestEngine::DocumentFile)?;

    Ok(())
}

#[test]
fn tagged_columns_sqlite() -> Result<(), Box<dyn StdError>> {
    tagged_columns_tester(TestEngine::SqliteMemory)?;

    Ok(())
}

#[test]
fn tagged_columns_document() -> Result<(), Box<dyn StdError>> {
    tagged_columns_tester(TestEngine::DocumentMemory)?;

    Ok(())
}

fn names(tasks: &[Task]) -> Vec<&str> { tasks.iter().map(|task| task.name.as_str()).collect() }

fn crud_tester(test_engine: TestEngine) -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let (engine, working_dir, _temp_dir_drop_guard) = test_engine.open("crud")?;
    create_tables(&engine)?;
    let kind = engine.kind();

    let id = &mut 0;
    let mut rent = Task::new(id, "Pay rent", 3);
    let mut groceries = Task::new(id, "Buy groceries", 1);
    let mut laundry = Task::new(id, "Do laundry", 2);

    {
        span_and_info!("Operation", "Create");

        for task in [&mut rent, &mut groceries, &mut laundry] {
            let assigned = engine.model::<Task>().create(task)?;

            assert!(!assigned.is_empty());
            assert_eq!(task.base.id, assigned);
            assert_eq!(get_id(task, kind), assigned);
        }

        assert_eq!(engine.model::<Task>().count()?, 3);
    }

    {
        span_and_info!("Operation", "Find by identity");

        let found: Task = engine
            .model::<Task>()
            .where_(&Task::with_id(&rent.base.id))
            .one()?;
        assert_eq!(found, rent);
    }

    {
        span_and_info!("Operation", "Predicates");

        let urgent: Vec<Task> = engine
            .model::<Task>()
            .gte(("priority", 2))
            .asc("priority")
            .all()?;
        assert_eq!(names(&urgent), ["Do laundry", "Pay rent"]);

        let cheap: Vec<Task> = engine.model::<Task>().lt(("priority", 2)).all()?;
        assert_eq!(names(&cheap), ["Buy groceries"]);

        assert_eq!(engine.model::<Task>().not(("priority", 1)).count()?, 2);
        assert_eq!(engine.model::<Task>().gt(("priority", 1)).lte(("priority", 2)).count()?, 1);

        assert_eq!(
            engine
                .model::<Task>()
                .where_(("priority", 1))
                .or(("priority", 3))
                .count()?,
            2
        );

        if kind == BackendKind::Relational {
            let grouped = engine
                .model::<Task>()
                .where_is("priority = ? or priority = ?", [1, 3])
                .where_(("name", "Pay rent"));
            assert_eq!(grouped.count()?, 1);
        }

        // A repeated column overwrites its earlier value in place
        assert_eq!(
            engine
                .model::<Task>()
                .where_(("priority", 1))
                .where_(("priority", 3))
                .count()?,
            1
        );

        assert_eq!(
            engine
                .model::<Task>()
                .where_(("priority", 1))
                .limit(1)
                .reset_filter()
                .count()?,
            3
        );

        let cleared = engine
            .model::<Task>()
            .where_(("priority", 1))
            .desc("name")
            .page(2, 1)
            .reset_filter();
        assert!(cleared.ops().is_empty());
        assert_eq!(cleared.find().all_rows()?.len(), 3);
    }

    {
        span_and_info!("Operation", "Like");

        let found: Vec<Task> = engine.model::<Task>().like(&Task::named("RENT")).all()?;
        assert_eq!(names(&found), ["Pay rent"]);

        let pattern = match kind {
            BackendKind::Relational => json!("Do%"),
            BackendKind::Document => json!("^Do"),
        };
        let found: Vec<Task> = engine.model::<Task>().like(("name", pattern)).all()?;
        assert_eq!(names(&found), ["Do laundry"]);
    }

    {
        span_and_info!("Operation", "Update");

        let by_id = || engine.model::<Task>().where_(&Task::with_id(&groceries.base.id));

        assert_eq!(by_id().update(("status", 1))?, 1);
        assert_eq!(by_id().one::<Task>()?.status, 1);

        // `status` is a must field: the record delta resets it along with the new priority
        let delta = Task {
            priority: 4,
            ..Task::default()
        };
        assert_eq!(by_id().update(&delta)?, 1);

        let updated: Task = by_id().one()?;
        assert_eq!(updated.priority, 4);
        assert_eq!(updated.status, 0);
        assert_eq!(updated.name, "Buy groceries");
        assert_eq!(updated.base.id, groceries.base.id);
    }

    {
        span_and_info!("Operation", "Refused global writes");

        assert!(matches!(
            engine.model::<Task>().delete(),
            Err(Error::MissingFilter { verb: "delete", .. })
        ));
        assert!(matches!(
            engine.model::<Task>().asc("name").limit(1).update(("status", 1)),
            Err(Error::MissingFilter { verb: "update", .. })
        ));
        assert_eq!(engine.model::<Task>().where_(("status", 1)).count()?, 0);
    }

    {
        span_and_info!("Operation", "Not found");

        let missing = engine
            .model::<Task>()
            .where_(("name", "Nothing like this"))
            .one::<Task>();
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    {
        span_and_info!("Operation", "Save");

        let first = engine
            .model::<Task>()
            .where_(("name", "Water plants"))
            .save(("priority", 2))?;
        assert!(matches!(first, Upserted::Inserted(_)));

        let second = engine
            .model::<Task>()
            .where_(("name", "Water plants"))
            .save(("priority", 5))?;
        assert_eq!(second, Upserted::Updated(1));

        let plants: Vec<Task> = engine
            .model::<Task>()
            .where_(("name", "Water plants"))
            .all()?;
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].priority, 5);

        // The equality lookup finds the row, the update still honours every predicate
        let guarded = engine
            .model::<Task>()
            .where_(("name", "Water plants"))
            .gt(("priority", 10))
            .save(("status", 7))?;
        assert_eq!(guarded, Upserted::Updated(0));
        assert_ne!(
            engine
                .model::<Task>()
                .where_(("name", "Water plants"))
                .one::<Task>()?
                .status,
            7
        );
    }

    {
        span_and_info!("Operation", "Delete");

        let deleted = engine
            .model::<Task>()
            .where_(&Task::with_id(&groceries.base.id))
            .delete()?;
        assert_eq!(deleted, 1);
        assert_eq!(engine.model::<Task>().count()?, 3);
    }

    {
        span_and_info!("Operation", "Create row");

        let mut row = Map::new();
        row.insert(String::from("name"), json!("From a row"));
        row.insert(String::from("priority"), json!(7));

        let assigned = engine.table("task").create_row(&mut row)?;
        assert_eq!(get_row_id(&row, kind), assigned);

        let found = engine.table("task").where_(("priority", 7)).find().one_row()?;
        assert_eq!(found["name"], json!("From a row"));
        assert_eq!(engine.model::<Task>().count()?, 4);
    }

    {
        span_and_info!("Operation", "Reopen");

        if let Some(reopened) = test_engine.reopen(&working_dir)? {
            let found: Task = reopened
                .model::<Task>()
                .where_(&Task::with_id(&rent.base.id))
                .one()?;

            assert_eq!(found, rent);
            assert_eq!(reopened.model::<Task>().count()?, 4);
        }
    }

    engine.close()?;

    Ok(())
}

fn tagged_columns_tester(test_engine: TestEngine) -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let (engine, _working_dir, _temp_dir_drop_guard) = test_engine.open("tagged")?;
    create_tables(&engine)?;
    let kind = engine.kind();

    span_and_info!("Tagged columns", "{kind}");

    let mut label = Label {
        title: String::from("Home"),
        color: String::from("green"),
        internal: String::from("secret"),
        ..Label::default()
    };
    let assigned = engine.model::<Label>().create(&mut label)?;
    assert_eq!(label.id, assigned);

    let found: Label = engine
        .model::<Label>()
        .where_(&Label {
            title: String::from("Home"),
            ..Label::default()
        })
        .one()?;

    assert_eq!(found.id, label.id);
    assert_eq!(found.color, "green");
    match kind {
        BackendKind::Relational => assert_eq!(found.internal, "secret"),
        BackendKind::Document => assert_eq!(found.internal, ""),
    }

    Ok(())
}
