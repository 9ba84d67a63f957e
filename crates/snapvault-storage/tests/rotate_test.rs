//! Integration test: master key rotation over stored wrapped data keys

use chrono::{DateTime, TimeZone, Utc};
use opendal::Operator;
use std::io::Cursor;

use snapvault_catalog::NamingConvention;
use snapvault_core::{SnapvaultError, SnapvaultResult};
use snapvault_crypto::{rewrap_converter, unwrap_data_key, CryptoError, MasterKey};
use snapvault_storage::{
    download_backup, rotate_keys, upload_backup, RestoreReport, RotationReport,
};

const CHUNK: usize = 512;

fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

fn naming() -> NamingConvention {
    NamingConvention::new("backup").unwrap()
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
}

async fn seed(op: &Operator, master: &MasterKey, hours: &[u32]) {
    for &h in hours {
        let body = Cursor::new(vec![h as u8; 2000]);
        upload_backup(op, &naming(), at(h), body, Some(master), CHUNK, None)
            .await
            .unwrap();
    }
}

async fn restore(
    op: &Operator,
    selector: Option<DateTime<Utc>>,
    master: &MasterKey,
) -> SnapvaultResult<(RestoreReport, Vec<u8>)> {
    let master = Some(master);
    download_backup(op, &naming(), selector, master, CHUNK, Vec::new(), None).await
}

#[tokio::test(flavor = "multi_thread")]
async fn rotation_moves_every_key() {
    let op = memory_operator();
    let old = MasterKey::generate();
    let new = MasterKey::generate();
    seed(&op, &old, &[1, 2, 3]).await;

    let report = rotate_keys(&op, &naming(), rewrap_converter(old.clone(), new.clone()))
        .await
        .unwrap();
    assert_eq!(
        report,
        RotationReport {
            rotated: 3,
            unchanged: 0
        }
    );

    for hour in [1, 2, 3] {
        let (_, restored) = restore(&op, Some(at(hour)), &new).await.unwrap();
        assert_eq!(restored, vec![hour as u8; 2000]);
    }

    let old_restore = restore(&op, None, &old).await;
    assert!(matches!(
        old_restore,
        Err(SnapvaultError::Crypto(CryptoError::AuthenticationFailed))
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn rotation_is_idempotent() {
    let op = memory_operator();
    let old = MasterKey::generate();
    let new = MasterKey::generate();
    seed(&op, &old, &[1, 2]).await;

    rotate_keys(&op, &naming(), rewrap_converter(old.clone(), new.clone()))
        .await
        .unwrap();
    let after_first = op.read("backup-2024-06-01T01:00:00Z.key").await.unwrap().to_vec();

    let second = rotate_keys(&op, &naming(), rewrap_converter(old.clone(), new.clone()))
        .await
        .unwrap();
    assert_eq!(
        second,
        RotationReport {
            rotated: 0,
            unchanged: 2
        }
    );

    let after_second = op.read("backup-2024-06-01T01:00:00Z.key").await.unwrap().to_vec();
    assert_eq!(after_first, after_second, "already rotated keys must not be rewritten");
    assert!(unwrap_data_key(&after_second, &new).is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn rotation_resumes_after_partial_run() {
    let op = memory_operator();
    let old = MasterKey::generate();
    let new = MasterKey::generate();
    seed(&op, &old, &[1, 2, 3]).await;

    // Simulate an interrupted run that only reached the first backup
    let first = "backup-2024-06-01T01:00:00Z.key";
    let wrapped = op.read(first).await.unwrap().to_vec();
    let convert = rewrap_converter(old.clone(), new.clone());
    op.write(first, convert(&wrapped).unwrap()).await.unwrap();

    let report = rotate_keys(&op, &naming(), convert).await.unwrap();
    assert_eq!(
        report,
        RotationReport {
            rotated: 2,
            unchanged: 1
        }
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rotation_stops_at_foreign_key() {
    let op = memory_operator();
    let old = MasterKey::generate();
    let new = MasterKey::generate();
    let stranger = MasterKey::generate();
    seed(&op, &old, &[1]).await;
    seed(&op, &stranger, &[2]).await;
    seed(&op, &old, &[3]).await;

    let result = rotate_keys(&op, &naming(), rewrap_converter(old.clone(), new.clone())).await;
    match result {
        Err(SnapvaultError::Rotation { object, source }) => {
            assert_eq!(object, "backup-2024-06-01T02:00:00Z.key");
            assert!(matches!(source, CryptoError::RotationFailed(_)));
        }
        other => panic!("expected rotation failure, got {other:?}"),
    }

    // Entries before the failure were rotated, entries after were not touched
    let first = op.read("backup-2024-06-01T01:00:00Z.key").await.unwrap().to_vec();
    assert!(unwrap_data_key(&first, &new).is_ok());
    let third = op.read("backup-2024-06-01T03:00:00Z.key").await.unwrap().to_vec();
    assert!(unwrap_data_key(&third, &old).is_ok());
}
