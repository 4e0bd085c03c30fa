//! Tests for lock services

use std::sync::Arc;

use prometheus_polling_control::core::LockService;
use prometheus_polling_control::infra::InMemoryLockService;

#[tokio::test]
async fn test_only_one_node_wins() {
    let registry = InMemoryLockService::new();
    let nodes: Vec<Arc<InMemoryLockService>> = (0..8).map(|_| Arc::new(registry.node())).collect();

    let attempts = nodes.iter().map(|node| {
        let node = Arc::clone(node);
        tokio::spawn(async move { node.try_lock("orderControl.enqueue()").await.unwrap() })
    });
    let results = futures::future::join_all(attempts).await;
    let winners = results.into_iter().filter(|r| *r.as_ref().unwrap()).count();
    assert_eq!(winners, 1);
    assert!(registry.is_locked("orderControl.enqueue()"));
}

#[tokio::test]
async fn test_released_lock_can_be_retaken() {
    let a = InMemoryLockService::new();
    let b = a.node();
    assert!(a.try_lock("scan").await.unwrap());
    a.unlock("scan").await.unwrap();
    assert!(b.try_lock("scan").await.unwrap());
    b.unlock("scan").await.unwrap();
    assert!(!a.is_locked("scan"));
}
