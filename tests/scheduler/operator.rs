use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use fleet_core::constants::TaskStatus;
use fleet_core::scheduler::{AsyncOperator, SchedulerError, TaskOptions};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_priority_order_with_single_slot() {
    let operator = AsyncOperator::new(1, None);
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut ids = Vec::new();
    for priority in [5, 1, 3, 1] {
        let order = Arc::clone(&order);
        ids.push(
            operator
                .register(TaskOptions::default().with_priority(priority), move |_| async move {
                    order.lock().push(priority);
                    Ok(Value::Null)
                })
                .unwrap(),
        );
    }

    assert!(operator.wait_tasks(Some(&ids), WAIT).await);
    assert_eq!(*order.lock(), vec![1, 1, 3, 5]);
    assert_eq!(operator.priority_of(ids[0]), Some(5));
}

#[tokio::test]
async fn test_bounded_backlog_rejects_without_affecting_accepted() {
    let operator = AsyncOperator::new(1, Some(2));
    let first = operator
        .register(TaskOptions::default(), |_| async { Ok(json!("first")) })
        .unwrap();
    let second = operator
        .register(TaskOptions::default(), |_| async { Ok(json!("second")) })
        .unwrap();

    let rejected = operator.register(TaskOptions::default(), |_| async { Ok(Value::Null) });
    assert_eq!(rejected.unwrap_err(), SchedulerError::Full { limit: 2 });

    assert!(operator.wait_tasks(Some(&[first, second]), WAIT).await);
    assert_eq!(operator.outcome(second).unwrap().value, Some(json!("second")));
}

#[tokio::test]
async fn test_progress_reported_while_running() {
    let operator = AsyncOperator::new(2, None);
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let (reported_tx, reported_rx) = oneshot::channel::<()>();

    let id = operator
        .register(TaskOptions::default(), move |progress| async move {
            progress.report(40);
            let _ = reported_tx.send(());
            let _ = release_rx.await;
            Ok(Value::Null)
        })
        .unwrap();

    reported_rx.await.unwrap();
    assert_eq!(operator.status_of(id), Some(TaskStatus::Running));
    assert_eq!(operator.progress(&[id])[&id], 40);
    assert_eq!(operator.running_count(), 1);

    release_tx.send(()).unwrap();
    assert!(operator.wait_tasks(Some(&[id]), WAIT).await);
    assert_eq!(operator.progress(&[id])[&id], 100);
}

#[tokio::test]
async fn test_concurrent_waiters_all_wake() {
    let operator = AsyncOperator::new(4, None);
    let id = operator
        .register(TaskOptions::default(), |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Value::Null)
        })
        .unwrap();

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let operator = operator.clone();
            tokio::spawn(async move { operator.wait_tasks(Some(&[id]), WAIT).await })
        })
        .collect();
    for waiter in waiters {
        assert!(waiter.await.unwrap());
    }
}

#[tokio::test]
async fn test_wait_times_out_on_slow_task() {
    let operator = AsyncOperator::new(1, None);
    let id = operator
        .register(TaskOptions::default(), |_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        })
        .unwrap();
    assert!(!operator.wait_tasks(Some(&[id]), Duration::from_millis(50)).await);
    assert!(!operator.status_of(id).unwrap().is_terminal());
}

#[tokio::test]
async fn test_callback_sees_outcome() {
    let operator = AsyncOperator::new(1, None);
    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let id = operator
        .register(
            TaskOptions::default().with_callback(move |outcome| {
                *sink.lock() = outcome.value.clone();
            }),
            |_| async { Ok(json!({"deployed": true})) },
        )
        .unwrap();

    assert!(operator.wait_tasks(Some(&[id]), WAIT).await);
    assert_eq!(*seen.lock(), Some(json!({"deployed": true})));
}

#[tokio::test]
async fn test_purge_and_stop() {
    let operator = AsyncOperator::new(1, None);
    let done = operator
        .register(TaskOptions::default(), |_| async { Ok(Value::Null) })
        .unwrap();
    assert!(operator.wait_tasks(Some(&[done]), WAIT).await);
    assert_eq!(operator.purge(None), 1);
    assert_eq!(operator.status_of(done), None);

    operator.stop();
    assert!(operator.is_stopped());
    assert_eq!(
        operator
            .register(TaskOptions::default(), |_| async { Ok(Value::Null) })
            .unwrap_err(),
        SchedulerError::Stopped
    );
}

#[test]
fn test_register_outside_runtime_fails() {
    let operator = AsyncOperator::new(1, None);
    let result = operator.register(TaskOptions::default(), |_| async { Ok(Value::Null) });
    assert_eq!(result.unwrap_err(), SchedulerError::NoRuntime);
}

#[test]
fn test_block_on_wait_all() {
    tokio_test::block_on(async {
        let operator = AsyncOperator::new(2, None);
        for n in 0..4 {
            operator
                .register(TaskOptions::default(), move |_| async move { Ok(json!(n)) })
                .unwrap();
        }
        assert!(operator.wait_tasks(None, WAIT).await);
        assert_eq!(operator.pending_count(), 0);
    });
}
