//! SQLite store tests exercising the full `RecordManager` contract against
//! a real database file.

use tempfile::TempDir;

use index_ledger::db::connect_sqlite;
use index_ledger::store::sqlite::SqliteRecordManager;
use index_ledger::store::{ListOptions, RecordManager, SchemaStatus, UpdateOptions};
use index_ledger::RecordError;

async fn setup_manager(tmp: &TempDir, namespace: &str) -> SqliteRecordManager {
    let pool = connect_sqlite(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let manager = SqliteRecordManager::new(pool, "upsertion_records", namespace).unwrap();
    assert_eq!(manager.ensure_schema().await.unwrap(), SchemaStatus::Ready);
    manager
}

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

#[tokio::test]
async fn ensure_schema_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    assert_eq!(manager.ensure_schema().await.unwrap(), SchemaStatus::Ready);
}

#[tokio::test]
async fn server_time_advances() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    let t1 = manager.server_time().await.unwrap();
    assert!(t1 > 1_600_000_000.0, "expected epoch seconds, got {t1}");
    let t2 = manager.server_time().await.unwrap();
    assert!(t2 >= t1);
}

#[tokio::test]
async fn update_then_exists_in_input_order() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    manager
        .update(&keys(&["a", "b"]), &UpdateOptions::default())
        .await
        .unwrap();

    let flags = manager.exists(&keys(&["a", "b", "c"])).await.unwrap();
    assert_eq!(flags, vec![true, true, false]);
}

#[tokio::test]
async fn empty_calls_are_no_ops() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    manager.update(&[], &UpdateOptions::default()).await.unwrap();
    manager.delete_keys(&[]).await.unwrap();
    assert_eq!(manager.exists(&[]).await.unwrap(), Vec::<bool>::new());
    assert!(manager
        .list_keys(&ListOptions::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn rewriting_a_key_overwrites_the_row() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    let k = keys(&["a"]);

    manager.update(&k, &UpdateOptions::default()).await.unwrap();
    let first = manager
        .list_keys(&ListOptions::default())
        .await
        .unwrap();
    manager.update(&k, &UpdateOptions::default()).await.unwrap();

    let listed = manager.list_keys(&ListOptions::default()).await.unwrap();
    assert_eq!(first, vec!["a".to_string()]);
    assert_eq!(listed, vec!["a".to_string()]);
}

#[tokio::test]
async fn future_watermark_is_a_time_sync_error() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    let future = manager.server_time().await.unwrap() + 3600.0;

    let err = manager
        .update(
            &keys(&["a"]),
            &UpdateOptions {
                time_at_least: Some(future),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::TimeSync { .. }));

    // The failed write must not have left a record behind.
    assert_eq!(manager.exists(&keys(&["a"])).await.unwrap(), vec![false]);
}

#[tokio::test]
async fn group_id_length_mismatch_fails_before_writing() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;

    let err = manager
        .update(
            &keys(&["a", "b"]),
            &UpdateOptions {
                group_ids: Some(vec![Some("g1".to_string())]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RecordError::GroupIdMismatch { .. }));
    assert_eq!(
        manager.exists(&keys(&["a", "b"])).await.unwrap(),
        vec![false, false]
    );
}

#[tokio::test]
async fn list_keys_filters_compose() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;

    manager
        .update(
            &keys(&["a", "b"]),
            &UpdateOptions {
                group_ids: Some(vec![Some("g1".to_string()), Some("g2".to_string())]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // julianday has millisecond precision; keep the cutoff strictly between
    // the two writes.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let cutoff = manager.server_time().await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    manager
        .update(
            &keys(&["c"]),
            &UpdateOptions {
                group_ids: Some(vec![Some("g1".to_string())]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let g1 = manager
        .list_keys(&ListOptions {
            group_ids: Some(vec!["g1".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(sorted(g1), keys(&["a", "c"]));

    let before_cutoff = manager
        .list_keys(&ListOptions {
            before: Some(cutoff),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(sorted(before_cutoff), keys(&["a", "b"]));

    let after_cutoff = manager
        .list_keys(&ListOptions {
            after: Some(cutoff),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(after_cutoff, keys(&["c"]));

    let limited = manager
        .list_keys(&ListOptions {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);

    let g1_before = manager
        .list_keys(&ListOptions {
            before: Some(cutoff),
            group_ids: Some(vec!["g1".to_string()]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(g1_before, keys(&["a"]));
}

#[tokio::test]
async fn deletes_are_namespace_scoped() {
    let tmp = TempDir::new().unwrap();
    let pool = connect_sqlite(&tmp.path().join("ledger.sqlite")).await.unwrap();
    let ns_a = SqliteRecordManager::new(pool.clone(), "upsertion_records", "a").unwrap();
    let ns_b = SqliteRecordManager::new(pool, "upsertion_records", "b").unwrap();
    ns_a.ensure_schema().await.unwrap();

    let k = keys(&["shared"]);
    ns_a.update(&k, &UpdateOptions::default()).await.unwrap();
    ns_b.update(&k, &UpdateOptions::default()).await.unwrap();

    ns_a.delete_keys(&k).await.unwrap();

    assert_eq!(ns_a.exists(&k).await.unwrap(), vec![false]);
    assert_eq!(ns_b.exists(&k).await.unwrap(), vec![true]);
}

#[tokio::test]
async fn update_delete_exists_round_trip() {
    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;
    let k = keys(&["x"]);

    manager.update(&k, &UpdateOptions::default()).await.unwrap();
    manager.delete_keys(&k).await.unwrap();
    assert_eq!(manager.exists(&k).await.unwrap(), vec![false]);
}

#[tokio::test]
async fn reconcile_full_prunes_against_sqlite() {
    use index_ledger::{reconcile, CleanupPolicy};

    let tmp = TempDir::new().unwrap();
    let manager = setup_manager(&tmp, "ns").await;

    reconcile(&manager, &keys(&["a", "b"]), None, CleanupPolicy::None)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let outcome = reconcile(&manager, &keys(&["b", "c"]), None, CleanupPolicy::Full)
        .await
        .unwrap();

    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.deleted, 1);
    assert_eq!(
        sorted(manager.list_keys(&ListOptions::default()).await.unwrap()),
        keys(&["b", "c"])
    );
}
