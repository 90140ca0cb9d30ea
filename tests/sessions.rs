pub mod tests_records;

use lupaorm::{Error, prelude::*};
use std::error::Error as StdError;
use tests_records::*;
use tests_utils::*;

#[test]
fn sessions_sqlite_memory() -> Result<(), Box<dyn StdError>> {
    sessions_tester(TestEngine::SqliteMemory)?;

    Ok(())
}

#[test]
fn sessions_sqlite_file() -> Result<(), Box<dyn StdError>> {
    sessions_tester(TestEngine::SqliteFile)?;

    Ok(())
}

#[test]
fn sessions_document_memory() -> Result<(), Box<dyn StdError>> {
    sessions_tester(TestEngine::DocumentMemory)?;

    Ok(())
}

#[test]
fn sessions_document_file() -> Result<(), Box<dyn StdError>> {
    sessions_tester(TestEngine::DocumentFile)?;

    Ok(())
}

#[test]
fn bulk_sqlite_memory() -> Result<(), Box<dyn StdError>> {
    bulk_tester(TestEngine::SqliteMemory)?;

    Ok(())
}

#[test]
fn bulk_sqlite_file() -> Result<(), Box<dyn StdError>> {
    bulk_tester(TestEngine::SqliteFile)?;

    Ok(())
}

#[test]
fn bulk_document_memory() -> Result<(), Box<dyn StdError>> {
    bulk_tester(TestEngine::DocumentMemory)?;

    Ok(())
}

#[test]
fn bulk_document_file() -> Result<(), Box<dyn StdError>> {
    bulk_tester(TestEngine::DocumentFile)?;

    Ok(())
}

fn abort() -> Error {
    return Error::Execution {
        backend: "test",
        reason: String::from("aborted by the test"),
    };
}

fn count_named(engine: &Engine, name: &str) -> lupaorm::Result<u64> {
    return engine.model::<Task>().where_(("name", name)).count();
}

fn sessions_tester(test_engine: TestEngine) -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let (engine, _working_dir, _temp_dir_drop_guard) = test_engine.open("sessions")?;
    create_tables(&engine)?;

    let id = &mut 0;

    {
        span_and_info!("Session", "Commit on success");

        let mut committed = Task::new(id, "Committed", 1);
        engine.model::<Task>().session(|session| {
            session.model().create(&mut committed)?;

            assert!(session.model().in_session());
            assert_eq!(session.model().count()?, 1);
            if test_engine != TestEngine::SqliteMemory {
                // Other connections only see the write once it commits
                assert_eq!(engine.model::<Task>().count()?, 0);
            }

            Ok(())
        })?;

        assert!(!committed.base.id.is_empty());
        assert_eq!(count_named(&engine, "Committed")?, 1);
    }

    {
        span_and_info!("Session", "Rollback on failure");

        let outcome = engine.model::<Task>().session(|session| {
            session.model().create(&mut Task::new(id, "Rolled back", 1))?;
            session
                .model_of::<Task>()
                .where_(("name", "Committed"))
                .update(("priority", 9))?;

            Err(abort())
        });

        assert!(matches!(outcome, Err(Error::Execution { backend: "test", .. })));
        assert_eq!(count_named(&engine, "Rolled back")?, 0);
        assert_eq!(
            engine.model::<Task>().where_(("priority", 9)).count()?,
            0
        );
    }

    {
        span_and_info!("Session", "Finalized by the callback");

        engine.model::<Task>().session(|session| {
            session.model().create(&mut Task::new(id, "Early", 2))?;
            session.commit()?;

            assert!(session.is_finalized());
            assert!(matches!(
                session.model().count(),
                Err(Error::TransactionFinalized)
            ));

            Err(Error::TransactionFinalized)
        })?;
        assert_eq!(count_named(&engine, "Early")?, 1);

        engine.model::<Task>().session(|session| {
            session.table("task").create(&mut Task::new(id, "Discarded", 2))?;
            session.rollback()?;

            Ok(())
        })?;
        assert_eq!(count_named(&engine, "Discarded")?, 0);
    }

    {
        span_and_info!("Session", "No nesting");

        let outcome = engine
            .model::<Task>()
            .session(|session| session.model().session(|_| Ok(())));

        assert!(matches!(outcome, Err(Error::Execution { .. })));
        assert_eq!(engine.model::<Task>().count()?, 2);
    }

    if engine.kind() == BackendKind::Document {
        span_and_info!("Session", "Writes outside the session survive its commit");

        engine.model::<Task>().session(|session| {
            session.model().create(&mut Task::new(id, "Inside", 3))?;
            engine.model::<Task>().create(&mut Task::new(id, "Outside", 3))?;
            session
                .model_of::<Task>()
                .where_(("name", "Early"))
                .update(("priority", 8))?;

            assert_eq!(count_named(&engine, "Inside")?, 0);
            assert_eq!(
                session.model().where_(("name", "Outside")).count()?,
                0
            );

            Ok(())
        })?;

        assert_eq!(count_named(&engine, "Inside")?, 1);
        assert_eq!(count_named(&engine, "Outside")?, 1);
        assert_eq!(engine.model::<Task>().where_(("priority", 8)).count()?, 1);
        assert_eq!(engine.model::<Task>().count()?, 4);
    }

    Ok(())
}

fn bulk_tester(test_engine: TestEngine) -> Result<(), Box<dyn StdError>> {
    init_tracing_for_tests();

    let (engine, _working_dir, _temp_dir_drop_guard) = test_engine.open("bulk")?;
    create_tables(&engine)?;

    let id = &mut 0;
    let batch = |id: &mut i64| {
        return vec![
            BulkOperation::insert(&Task::new(id, "Bulk one", 1)),
            BulkOperation::update(Condition::new(), ("status", 1)),
            BulkOperation::insert(&Task::new(id, "Bulk two", 1)),
        ];
    };

    {
        span_and_info!("Bulk", "Ordered stops and rolls back");

        let outcome = engine.model::<Task>().bulk_write(batch(id), true);

        assert!(matches!(
            outcome,
            Err(Error::BulkOperationFailure {
                index: 1,
                kind: "update",
                ..
            })
        ));
        assert_eq!(engine.model::<Task>().count()?, 0);
    }

    {
        span_and_info!("Bulk", "Unordered skips failures and commits");

        engine.model::<Task>().bulk_write(batch(id), false)?;

        assert_eq!(count_named(&engine, "Bulk one")?, 1);
        assert_eq!(count_named(&engine, "Bulk two")?, 1);
        assert_eq!(engine.model::<Task>().where_(("status", 1)).count()?, 0);
    }

    {
        span_and_info!("Bulk", "Updates and deletes");

        engine.model::<Task>().bulk_write(
            [
                BulkOperation::update(("name", "Bulk one"), ("priority", 9)),
                BulkOperation::delete(("name", "Bulk two")),
            ],
            true,
        )?;

        let one: Task = engine.model::<Task>().where_(("name", "Bulk one")).one()?;
        assert_eq!(one.priority, 9);
        assert_eq!(count_named(&engine, "Bulk two")?, 0);
    }

    {
        span_and_info!("Bulk", "Joins an open session");

        let outcome = engine.model::<Task>().session(|session| {
            session
                .model()
                .bulk_write([BulkOperation::insert(&Task::new(id, "In session", 1))], true)?;
            assert_eq!(session.model().where_(("name", "In session")).count()?, 1);

            Err(abort())
        });

        assert!(outcome.is_err());
        assert_eq!(count_named(&engine, "In session")?, 0);
    }

    {
        span_and_info!("Bulk", "Ordered failure in a session undoes only the batch");

        engine.model::<Task>().session(|session| {
            session.model().create(&mut Task::new(id, "Before batch", 1))?;

            let outcome = session.model().bulk_write(
                [
                    BulkOperation::insert(&Task::new(id, "Batch head", 1)),
                    BulkOperation::update(Condition::new(), ("status", 1)),
                    BulkOperation::insert(&Task::new(id, "Batch tail", 1)),
                ],
                true,
            );
            assert!(matches!(
                outcome,
                Err(Error::BulkOperationFailure { index: 1, .. })
            ));
            assert_eq!(session.model().where_(("name", "Batch head")).count()?, 0);
            assert_eq!(session.model().where_(("name", "Before batch")).count()?, 1);

            Ok(())
        })?;

        assert_eq!(count_named(&engine, "Before batch")?, 1);
        assert_eq!(count_named(&engine, "Batch head")?, 0);
        assert_eq!(count_named(&engine, "Batch tail")?, 0);
    }

    {
        span_and_info!("Bulk", "Records keep their own table");

        let label = Label {
            title: String::from("Errands"),
            ..Label::default()
        };
        let tasks_before = engine.model::<Task>().count()?;

        engine
            .model::<Task>()
            .bulk_write([BulkOperation::insert(&label)], true)?;

        assert_eq!(engine.model::<Label>().count()?, 1);
        assert_eq!(engine.model::<Task>().count()?, tasks_before);
    }

    Ok(())
}
