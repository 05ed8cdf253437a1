use crate::error::KilnError;
use crate::store::Store;
use crate::types::node_group::NodeGroup;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn group(name: &str, driver: &str) -> NodeGroup {
    NodeGroup::new(name, driver)
}

#[tokio::test]
async fn test_empty_startup() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();

    let txn = store.txn().await.unwrap();
    assert!(txn.current("foo").await.unwrap().is_none());
    assert!(txn.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_open_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    {
        let txn = store.txn().await.unwrap();
        txn.save(&group("mybuild", "mydriver")).await.unwrap();
    }

    let reopened = Store::open(dir.path()).await.unwrap();
    let txn = reopened.txn().await.unwrap();
    assert_eq!(txn.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_txn_locking() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();

    let txn = store.txn().await.unwrap();

    let (tx, mut rx) = tokio::sync::oneshot::channel();
    let other = store.clone();
    let waiter = tokio::spawn(async move {
        let txn = other.txn().await.unwrap();
        let _ = tx.send(Instant::now());
        txn.release();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "transaction should have waited");

    let released_at = Instant::now();
    txn.release();

    let acquired_at = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("transaction should have completed")
        .unwrap();
    assert!(acquired_at >= released_at);
    waiter.await.unwrap();
}

#[tokio::test]
async fn test_cancelled_acquisition_releases_lock() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();

    let txn = store.txn().await.unwrap();
    let abandoned = tokio::time::timeout(Duration::from_millis(50), store.txn()).await;
    assert!(abandoned.is_err());
    txn.release();

    let txn = tokio::time::timeout(Duration::from_secs(5), store.txn())
        .await
        .expect("lock should be free again")
        .unwrap();
    txn.release();
}

#[tokio::test]
async fn test_node_management() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    let err = txn.save(&group("foo/bar", "driver")).await.unwrap_err();
    assert!(err.to_string().contains("invalid name"));

    txn.save(&group("mybuild", "mydriver")).await.unwrap();
    let ng = txn.node_group_by_name("mybuild").await.unwrap();
    assert_eq!(ng.name, "mybuild");
    assert_eq!(ng.driver, "mydriver");
    assert_eq!(txn.list().await.unwrap().len(), 1);

    let err = txn.node_group_by_name("mybuild2").await.unwrap_err();
    assert!(err.is_not_found());

    txn.save(&group("mybuild2", "mydriver2")).await.unwrap();
    assert_eq!(txn.list().await.unwrap().len(), 2);

    // update existing
    txn.save(&group("mybuild", "mydriver-mod")).await.unwrap();
    let ng = txn.node_group_by_name("mybuild").await.unwrap();
    assert_eq!(ng.driver, "mydriver-mod");

    let names: Vec<String> = txn.list().await.unwrap().into_iter().map(|g| g.name).collect();
    assert_eq!(names, vec!["mybuild", "mybuild2"]);

    txn.set_current("foo", "mybuild", false, false).await.unwrap();
    assert_eq!(txn.current("foo").await.unwrap().unwrap().name, "mybuild");
    assert!(txn.current("bar").await.unwrap().is_none());

    txn.remove("mybuild2").await.unwrap();
    assert!(txn.node_group_by_name("mybuild2").await.unwrap_err().is_not_found());
    assert_eq!(txn.list().await.unwrap().len(), 1);

    // removing again is fine
    txn.remove("mybuild2").await.unwrap();
}

#[tokio::test]
async fn test_save_round_trip_with_nodes() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    let mut ng = group("RoundTrip", "process");
    ng.update("n0", "unix:///tmp/a.sock", &["linux/amd64".to_string()], true, false).unwrap();
    ng.update("", "unix:///tmp/b.sock", &["linux/arm64,linux/arm".to_string()], true, true)
        .unwrap();
    txn.save(&ng).await.unwrap();

    let loaded = txn.node_group_by_name("roundtrip").await.unwrap();
    assert_eq!(loaded.name, "roundtrip");
    assert_eq!(loaded.driver, ng.driver);
    assert_eq!(loaded.nodes, ng.nodes);

    let loaded = txn.node_group_by_name("ROUNDTRIP").await.unwrap();
    assert_eq!(loaded.nodes.len(), 2);
}

#[tokio::test]
async fn test_current_selection_precedence() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    txn.save(&group("mybuild", "d")).await.unwrap();
    txn.save(&group("mybuild2", "d")).await.unwrap();

    // default primes the global fallback
    txn.set_current("foo", "mybuild", false, true).await.unwrap();
    assert_eq!(txn.current("foo").await.unwrap().unwrap().name, "mybuild");
    assert_eq!(txn.current("bar").await.unwrap().unwrap().name, "mybuild");

    // a later default does not replace a valid global pointer
    txn.set_current("foo", "mybuild2", false, true).await.unwrap();
    assert_eq!(txn.current("foo").await.unwrap().unwrap().name, "mybuild2");
    assert_eq!(txn.current("bar").await.unwrap().unwrap().name, "mybuild");

    // scope selection wins over global
    txn.set_current("bar", "mybuild2", false, false).await.unwrap();
    assert_eq!(txn.current("bar").await.unwrap().unwrap().name, "mybuild2");

    // explicit global
    txn.set_current("foo", "mybuild2", true, false).await.unwrap();
    assert_eq!(txn.current("baz").await.unwrap().unwrap().name, "mybuild2");
}

#[tokio::test]
async fn test_dangling_selection_falls_back() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    txn.save(&group("keep", "d")).await.unwrap();
    txn.save(&group("gone", "d")).await.unwrap();
    txn.set_current("foo", "gone", false, false).await.unwrap();
    assert!(txn.current("foo").await.unwrap().is_some());

    txn.remove("gone").await.unwrap();
    assert!(txn.current("foo").await.unwrap().is_none());

    txn.set_current("any", "keep", true, false).await.unwrap();
    assert_eq!(txn.current("foo").await.unwrap().unwrap().name, "keep");

    txn.remove("keep").await.unwrap();
    assert!(txn.current("foo").await.unwrap().is_none());

    // a dangling global pointer is replaced by the next default selection
    txn.save(&group("fresh", "d")).await.unwrap();
    txn.set_current("foo", "fresh", false, true).await.unwrap();
    assert_eq!(txn.current("other").await.unwrap().unwrap().name, "fresh");
}

#[tokio::test]
async fn test_clear_current_falls_back_to_global() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    txn.save(&group("one", "d")).await.unwrap();
    txn.save(&group("two", "d")).await.unwrap();
    txn.set_current("foo", "one", true, false).await.unwrap();
    txn.set_current("foo", "two", false, false).await.unwrap();
    assert_eq!(txn.current("foo").await.unwrap().unwrap().name, "two");

    txn.clear_current("foo").await.unwrap();
    assert_eq!(txn.current("foo").await.unwrap().unwrap().name, "one");

    // clearing an unknown scope is a no-op
    txn.clear_current("nope").await.unwrap();
}

#[tokio::test]
async fn test_set_current_rejects_invalid_name() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    let err = txn.set_current("foo", "1bad", false, false).await.unwrap_err();
    assert!(matches!(err, KilnError::InvalidName { .. }));
}

#[tokio::test]
async fn test_corrupt_entry_is_reported() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    std::fs::write(dir.path().join("instances").join("broken"), b"{not json").unwrap();

    let txn = store.txn().await.unwrap();
    let err = txn.node_group_by_name("broken").await.unwrap_err();
    assert!(matches!(err, KilnError::Corrupt { .. }));
}

#[tokio::test]
async fn test_generate_name() {
    let dir = tempdir().unwrap();
    let store = Store::open(dir.path()).await.unwrap();
    let txn = store.txn().await.unwrap();

    let name = txn.generate_name().await.unwrap();
    assert!(crate::types::node_group::validate_name(&name).is_ok());
    assert!(txn.node_group_by_name(&name).await.unwrap_err().is_not_found());
}
