//! Tests for tokio spawner utilities

use prometheus_polling_control::core::Spawn;
use prometheus_polling_control::runtime::tokio_spawner::TokioSpawner;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_spawner_spawn() {
    let spawner = TokioSpawner::new(tokio::runtime::Handle::current());

    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send(123).unwrap();
    });

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
}

#[tokio::test]
async fn test_tokio_spawner_current() {
    let spawner = TokioSpawner::current().expect("inside runtime");
    let (tx, rx) = tokio::sync::oneshot::channel();
    spawner.spawn(async move {
        tx.send("done").unwrap();
    });
    assert_eq!(rx.await.unwrap(), "done");
}

#[test]
fn test_tokio_spawner_current_outside_runtime() {
    assert!(TokioSpawner::current().is_err());
}
