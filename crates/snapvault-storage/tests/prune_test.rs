//! Integration test: retention pruning against in-memory storage

use chrono::{DateTime, Duration, TimeZone, Utc};
use opendal::Operator;
use std::io::Cursor;

use snapvault_catalog::{CatalogError, NamingConvention, RetentionPolicy};
use snapvault_core::SnapvaultError;
use snapvault_crypto::MasterKey;
use snapvault_storage::{list_object_names, load_catalog, prune_backups, upload_backup};

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

fn naming() -> NamingConvention {
    NamingConvention::new("backup").unwrap()
}

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
}

async fn seed(op: &Operator, days: &[i64], master: Option<&MasterKey>) {
    for &d in days {
        let body = Cursor::new(format!("day {d}").into_bytes());
        upload_backup(op, &naming(), day(d), body, master, 1024, None)
            .await
            .unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn prune_deletes_oldest_expired_above_floor() {
    let op = memory_operator();
    let master = MasterKey::generate();
    seed(&op, &[1, 2, 3, 4, 5], Some(&master)).await;

    // now = day 19.5, max age 15d → cutoff day 4.5
    let policy = RetentionPolicy::new(Duration::days(15), 3);
    let now = day(19) + Duration::hours(12);
    let deleted = prune_backups(&op, &naming(), &policy, now).await.unwrap();

    let deleted: Vec<_> = deleted.iter().map(|e| e.timestamp).collect();
    assert_eq!(deleted, vec![day(1), day(2)]);

    let mut remaining = list_object_names(&op).await.unwrap();
    remaining.sort();
    assert_eq!(
        remaining,
        vec![
            "backup-2024-01-04T00:00:00Z.dump",
            "backup-2024-01-04T00:00:00Z.key",
            "backup-2024-01-05T00:00:00Z.dump",
            "backup-2024-01-05T00:00:00Z.key",
            "backup-2024-01-06T00:00:00Z.dump",
            "backup-2024-01-06T00:00:00Z.key",
        ]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn prune_respects_floor() {
    let op = memory_operator();
    let days: Vec<i64> = (1..=20).collect();
    seed(&op, &days, None).await;

    let policy = RetentionPolicy::new(Duration::days(1), 20);
    let deleted = prune_backups(&op, &naming(), &policy, day(400)).await.unwrap();

    assert!(deleted.is_empty());
    assert_eq!(load_catalog(&op, &naming()).await.unwrap().valid_count(), 20);
}

#[tokio::test(flavor = "multi_thread")]
async fn prune_removes_orphaned_keys() {
    let op = memory_operator();
    seed(&op, &[10], None).await;
    op.write("backup-2024-01-02T00:00:00Z.key", vec![1u8; 72])
        .await
        .unwrap();
    op.write("unrelated.txt", b"keep me".to_vec()).await.unwrap();

    let policy = RetentionPolicy::new(Duration::days(1), 5);
    let deleted = prune_backups(&op, &naming(), &policy, day(30)).await.unwrap();

    assert_eq!(deleted.len(), 1);
    assert!(!deleted[0].payload_present);

    let mut remaining = list_object_names(&op).await.unwrap();
    remaining.sort();
    assert_eq!(
        remaining,
        vec!["backup-2024-01-11T00:00:00Z.dump", "unrelated.txt"]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_timestamp_aborts_prune() {
    let op = memory_operator();
    seed(&op, &[1, 2], None).await;
    op.write("backup-2024-02-31T00:00:00Z.dump", b"bad".to_vec())
        .await
        .unwrap();

    let policy = RetentionPolicy::new(Duration::days(1), 0);
    let result = prune_backups(&op, &naming(), &policy, day(30)).await;

    assert!(matches!(
        result,
        Err(SnapvaultError::Catalog(CatalogError::MalformedTimestamp { .. }))
    ));
    assert_eq!(
        list_object_names(&op).await.unwrap().len(),
        3,
        "nothing may be deleted"
    );
}
