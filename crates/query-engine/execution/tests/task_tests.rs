//! Tasks, connection leases and the query methods.

use std::time::Duration;

use serde_json::json;

use query_engine_execution::{ContextKind, Database, Error, RowCountError, UsageError, SQL};
use tests_common::driver::MockDriver;
use tests_common::{init_logging, row};

fn database(driver: &MockDriver) -> Database {
    init_logging();
    Database::new(driver.shared())
}

#[tokio::test]
async fn tasks_send_no_transaction_control() {
    let driver = MockDriver::new();
    let db = database(&driver);

    db.task(|t| async move { t.none("update users set visits = visits + 1").await })
        .await
        .unwrap();

    assert_eq!(driver.statements(), vec!["update users set visits = visits + 1"]);
    assert_eq!(
        driver.committed_writes(),
        vec!["update users set visits = visits + 1"]
    );
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn nested_contexts_share_one_connection() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let infos = db
        .task_with("outer", |t| async move {
            let inner = t
                .task(|t2| async move {
                    let deepest = t2.tx(|t3| async move { Ok(t3.info()) }).await?;
                    Ok((t2.info(), deepest))
                })
                .await?;
            Ok((t.info(), inner.0, inner.1))
        })
        .await
        .unwrap();

    let (outer, task, tx) = infos;
    assert_eq!(outer.connection, task.connection);
    assert_eq!(task.connection, tx.connection);
    assert_eq!(outer.tag.as_deref(), Some("outer"));
    assert_eq!(
        [outer.level, task.level, tx.level],
        [0, 1, 2]
    );
    assert_eq!([outer.kind, tx.kind], [ContextKind::Task, ContextKind::Transaction]);
    assert!(!task.in_transaction);
    assert_eq!(tx.tx_level, Some(0));

    assert_eq!(driver.statements(), vec!["begin", "commit"]);
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
    assert_eq!(driver.double_releases(), 0);
}

#[tokio::test]
async fn task_failures_pass_through_after_release() {
    let driver = MockDriver::new().fail("select broken", "column \"broken\" does not exist");
    let db = database(&driver);

    let error = db
        .task(|t| async move {
            t.task(|t2| async move { t2.any("select broken from users").await })
                .await
        })
        .await
        .unwrap_err();

    match error {
        Error::Query(query_error) => {
            assert_eq!(query_error.message, "column \"broken\" does not exist");
        }
        other => panic!("expected a query error, got {other:?}"),
    }
    assert_eq!(driver.statements(), vec!["select broken from users"]);
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn every_root_call_leases_its_own_connection() {
    let driver = MockDriver::new().respond("select 1", vec![row(json!({ "value": 1 }))]);
    let db = database(&driver);

    for _ in 0..3 {
        db.one("select 1 as value").await.unwrap();
    }
    let (a, b) = futures::join!(
        db.task(|t| async move { Ok(t.info().connection) }),
        db.task(|t| async move { Ok(t.info().connection) })
    );

    assert_ne!(a.unwrap(), b.unwrap());
    assert_eq!((driver.acquired(), driver.released()), (5, 5));
}

#[tokio::test]
async fn statements_in_flight_keep_the_connection_leased() {
    let driver = MockDriver::new().delay("select slow", Duration::from_millis(50));
    let db = database(&driver);

    let in_flight = db
        .task(|t| async move {
            let spawned = tokio::spawn(async move {
                t.none("select slow").await?;
                t.none("select late").await
            });
            // let the spawned query reach the driver before the task settles
            tokio::task::yield_now().await;
            Ok(spawned)
        })
        .await
        .unwrap();

    assert_eq!(driver.statements(), vec!["select slow"]);
    assert_eq!(driver.released(), 0);

    let late = in_flight.await.unwrap().unwrap_err();
    assert!(matches!(late, Error::Usage(UsageError::ContextClosed)));
    assert_eq!(driver.statements(), vec!["select slow"]);
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
    assert_eq!(driver.double_releases(), 0);
}

#[tokio::test]
async fn settled_contexts_reject_further_use() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let escaped = db.task(|t| async move { Ok(t) }).await.unwrap();
    assert!(!escaped.is_open());

    let query = escaped.any("select 1").await.unwrap_err();
    assert!(matches!(query, Error::Usage(UsageError::ContextClosed)));

    let nested = escaped.tx(|t| async move { t.any("select 1").await }).await;
    assert!(matches!(
        nested.unwrap_err(),
        Error::Usage(UsageError::ContextClosed)
    ));

    assert!(driver.statements().is_empty());
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn abandoned_contexts_release_their_connection() {
    let driver = MockDriver::new().delay("pg_sleep", Duration::from_millis(500));
    let db = database(&driver);

    let outcome = tokio::time::timeout(
        Duration::from_millis(20),
        db.tx(|t| async move { t.none("select pg_sleep(1)").await }),
    )
    .await;

    assert!(outcome.is_err());
    assert_eq!(driver.statements(), vec!["begin", "select pg_sleep(1)"]);
    assert!(driver.committed_writes().is_empty());
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn abandoned_nested_transactions_are_rolled_back() {
    let driver = MockDriver::new().delay("select slow", Duration::from_millis(200));
    let db = database(&driver);

    db.task(|t| async move {
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            t.tx(|t2| async move {
                t2.none("update a set x = 1").await?;
                t2.none("select slow").await
            }),
        )
        .await;
        assert!(abandoned.is_err());

        t.none("update b set y = 2").await?;
        t.tx(|t3| async move { t3.none("update c set z = 3").await })
            .await
    })
    .await
    .unwrap();

    assert_eq!(
        driver.statements(),
        vec![
            "begin",
            "update a set x = 1",
            "select slow",
            "rollback",
            "update b set y = 2",
            "begin",
            "update c set z = 3",
            "commit"
        ]
    );
    assert_eq!(
        driver.committed_writes(),
        vec!["update b set y = 2", "update c set z = 3"]
    );
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn abandoned_inner_transactions_doom_the_outer_one() {
    let driver = MockDriver::new().delay("select slow", Duration::from_millis(200));
    let db = database(&driver);

    let error = db
        .tx(|t| async move {
            let abandoned = tokio::time::timeout(
                Duration::from_millis(20),
                t.tx(|t2| async move {
                    t2.none("update a set x = 1").await?;
                    t2.none("select slow").await
                }),
            )
            .await;
            assert!(abandoned.is_err());

            t.none("update b set y = 2").await
        })
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Usage(UsageError::Abandoned(ContextKind::Transaction))
    ));
    assert_eq!(
        driver.statements(),
        vec![
            "begin",
            "update a set x = 1",
            "select slow",
            "update b set y = 2",
            "rollback"
        ]
    );
    assert!(driver.committed_writes().is_empty());
}

#[tokio::test]
async fn connection_failures_run_nothing() {
    let driver = MockDriver::new().refuse_connections();
    let db = database(&driver);

    let error = db
        .tx(|t| async move { t.none("delete from users").await })
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Connection(_)));
    assert_eq!(
        error.to_string(),
        "unable to acquire a connection: connection refused"
    );
    assert!(driver.statements().is_empty());
    assert_eq!((driver.acquired(), driver.released()), (0, 0));
}

#[tokio::test]
async fn query_methods_enforce_row_counts() {
    let driver = MockDriver::new()
        .respond("from empty", vec![])
        .respond(
            "from pair",
            vec![row(json!({ "id": 1 })), row(json!({ "id": 2 }))],
        )
        .respond("from single", vec![row(json!({ "id": 7 }))]);
    let db = database(&driver);

    assert_eq!(
        db.one("select id from single").await.unwrap(),
        row(json!({ "id": 7 }))
    );
    assert_eq!(db.one_or_none("select id from empty").await.unwrap(), None);
    assert!(db.many("select id from empty").await.unwrap().is_empty());
    assert_eq!(db.many_or_none("select id from pair").await.unwrap().len(), 2);
    assert_eq!(db.any("select id from single").await.unwrap().len(), 1);

    let cases = [
        (db.none("select id from single").await.unwrap_err(), RowCountError::NoDataExpected),
        (db.one("select id from empty").await.unwrap_err(), RowCountError::NoRows),
        (db.one("select id from pair").await.unwrap_err(), RowCountError::MultipleRows),
        (db.one_or_none("select id from pair").await.unwrap_err(), RowCountError::MultipleRows),
    ];
    for (error, expected) in cases {
        match error {
            Error::RowCount(actual) => assert_eq!(actual, expected),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    }

    assert_eq!(
        RowCountError::NoDataExpected.to_string(),
        "No return data was expected from the query."
    );
    assert_eq!(driver.acquired(), driver.released());
}

#[tokio::test]
async fn parameters_reach_the_driver() {
    let driver = MockDriver::new().respond("where id = $1", vec![row(json!({ "login": "Test" }))]);
    let db = database(&driver);

    let user = db
        .task(|t| async move {
            t.one(SQL::new("select login from users where id = $1").bind(1))
                .await
        })
        .await
        .unwrap();

    assert_eq!(user["login"], json!("Test"));
}
