//! Caller mistakes: invalid masks, missing or malformed callbacks, invalid
//! promise adapters. None of them may leak a connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::FutureExt;
use serde_json::json;

use query_engine_execution::adapter::{Construct, Reject, Resolve};
use query_engine_execution::{
    Context, ContextKind, Database, DatabaseOptions, Error, PromiseAdapter, Returned, UsageError,
};
use tests_common::driver::MockDriver;
use tests_common::{init_logging, row};

fn database(driver: &MockDriver) -> Database {
    init_logging();
    Database::new(driver.shared())
}

fn usage(error: Error) -> UsageError {
    match error {
        Error::Usage(usage) => usage,
        other => panic!("expected a usage error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_masks_are_rejected_before_sending() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let errors = db
        .task(|t| async move {
            Ok(vec![
                t.query("select 1", 0).await.unwrap_err(),
                t.query("select 1", 3).await.unwrap_err(),
                t.query("select 1", 9).await.unwrap_err(),
                t.query("select 1", -1).await.unwrap_err(),
                t.query("select 1", json!("wrong qrm")).await.unwrap_err(),
                t.query("select 1", json!(1.5)).await.unwrap_err(),
                t.query("select 1", "one|many").await.unwrap_err(),
            ])
        })
        .await
        .unwrap();

    for error in errors {
        assert_eq!(error.to_string(), "Invalid Query Result Mask specified.");
        assert_eq!(usage(error), UsageError::InvalidMask);
    }
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn invalid_mask_on_the_root_leases_nothing() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let error = db.query("select 1", 3).await.unwrap_err();

    assert_eq!(usage(error), UsageError::InvalidMask);
    assert_eq!(driver.acquired(), 0);
}

#[tokio::test]
async fn masks_accept_names_and_numbers() {
    let driver = MockDriver::new().respond("select 1", vec![row(json!({ "one": 1 }))]);
    let db = database(&driver);

    let by_name = db.query("select 1 as one", "one|none").await.unwrap();
    let by_number = db.query("select 1 as one", 5).await.unwrap();

    assert_eq!(by_name, by_number);
    assert_eq!(by_name.into_row(), Some(row(json!({ "one": 1 }))));
}

#[tokio::test]
async fn missing_callback() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let tx = db.run_dynamic(ContextKind::Transaction, None).await.unwrap_err();
    assert_eq!(tx.to_string(), "Cannot invoke tx() without a callback function.");
    assert_eq!(usage(tx), UsageError::MissingCallback(ContextKind::Transaction));

    let task = db.run_dynamic(ContextKind::Task, None).await.unwrap_err();
    assert_eq!(task.to_string(), "Cannot invoke task() without a callback function.");

    assert_eq!(driver.acquired(), 0);
}

#[tokio::test]
async fn callback_returning_a_value() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let error = db
        .run_dynamic(
            ContextKind::Transaction,
            Some(Box::new(|_: Context| Returned::Value(json!(123)))),
        )
        .await
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        "Callback function passed into tx() didn't return a valid promise object."
    );
    assert_eq!(usage(error), UsageError::NotThenable(ContextKind::Transaction));
    assert_eq!(driver.statements(), vec!["begin", "rollback"]);
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn callback_returning_nothing() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let error = db
        .run_dynamic(ContextKind::Task, Some(Box::new(|_: Context| Returned::Nothing)))
        .await
        .unwrap_err();

    assert_eq!(usage(error), UsageError::NothingReturned(ContextKind::Task));
    assert!(driver.statements().is_empty());
    assert_eq!((driver.acquired(), driver.released()), (1, 1));
}

#[tokio::test]
async fn nested_dynamic_callbacks_doom_the_transaction() {
    let driver = MockDriver::new();
    let db = database(&driver);

    let error = db
        .tx(|t| async move {
            t.none("insert into log values (1)").await?;
            let nested = t
                .run_dynamic(
                    ContextKind::Transaction,
                    Some(Box::new(|_: Context| Returned::Value(json!({ "done": true })))),
                )
                .await;
            assert!(nested.is_err());
            Ok(())
        })
        .await
        .unwrap_err();

    assert_eq!(usage(error), UsageError::NotThenable(ContextKind::Transaction));
    assert_eq!(
        driver.statements(),
        vec!["begin", "insert into log values (1)", "rollback"]
    );
    assert!(driver.committed_writes().is_empty());
}

#[tokio::test]
async fn pending_dynamic_work_resolves() {
    let driver = MockDriver::new().respond("select 'x'", vec![row(json!({ "x": "x" }))]);
    let db = database(&driver);

    let value = db
        .run_dynamic(
            ContextKind::Transaction,
            Some(Box::new(|t: Context| {
                Returned::Pending(
                    async move {
                        let row = t.one("select 'x' as x").await?;
                        Ok(serde_json::Value::Object(row))
                    }
                    .boxed(),
                )
            })),
        )
        .await
        .unwrap();
    assert_eq!(value, json!({ "x": "x" }));

    let resolved = db
        .run_dynamic(ContextKind::Task, Some(Box::new(|t: Context| t.resolve(json!(42)))))
        .await
        .unwrap();
    assert_eq!(resolved, json!(42));

    let rejected = db
        .run_dynamic(
            ContextKind::Task,
            Some(Box::new(|t: Context| t.reject(Error::msg("rejected by caller")))),
        )
        .await
        .unwrap_err();
    assert_eq!(rejected.to_string(), "rejected by caller");

    assert_eq!(driver.acquired(), driver.released());
}

#[test]
fn adapters_need_resolve_and_reject() {
    let resolve: Arc<Resolve> = Arc::new(|value| futures::future::ready(Ok(value)).boxed());

    let error = PromiseAdapter::new(None, Some(resolve), None).unwrap_err();

    assert_eq!(error.to_string(), "Invalid promise library specified.");
}

#[tokio::test]
async fn custom_adapters_wrap_dynamic_work() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&constructed);
    let construct: Arc<Construct> = Arc::new(move |pending| {
        counter.fetch_add(1, Ordering::SeqCst);
        pending
    });
    let resolve: Arc<Resolve> = Arc::new(|value| futures::future::ready(Ok(value)).boxed());
    let reject: Arc<Reject> = Arc::new(|error| futures::future::ready(Err(error)).boxed());
    let adapter = PromiseAdapter::new(Some(construct), Some(resolve), Some(reject)).unwrap();

    let driver = MockDriver::new();
    let db = Database::with_options(
        driver.shared(),
        DatabaseOptions {
            adapter,
            ..DatabaseOptions::default()
        },
    );

    let value = db
        .run_dynamic(
            ContextKind::Task,
            Some(Box::new(|_: Context| {
                Returned::Pending(futures::future::ready(Ok(json!("done"))).boxed())
            })),
        )
        .await
        .unwrap();

    assert_eq!(value, json!("done"));
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}
