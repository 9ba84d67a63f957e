use chrono::{DateTime, Utc};
use opendal::Operator;
use serde::Serialize;
use std::io::{Read, Write};
use tracing::{debug, info, warn};

use snapvault_catalog::{NamingConvention, ObjectKind};
use snapvault_core::{SnapvaultError, SnapvaultResult};
use snapvault_crypto::{DecryptStream, MasterKey};

use crate::bridge::{copy_to, object_reader, ProgressFn, ProgressReader};
use crate::listing::load_catalog;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub timestamp: DateTime<Utc>,
    pub payload_object: String,
    /// Plaintext bytes written to the destination
    pub bytes_written: u64,
    pub encrypted: bool,
}

/// Write a stored backup to `dest` and hand `dest` back.
///
/// `selector` picks the backup taken at exactly that timestamp, or the latest
/// valid backup when `None`. Encrypted backups need `master_key` and the
/// `chunk_size` used when they were written.
pub async fn download_backup<W>(
    op: &Operator,
    naming: &NamingConvention,
    selector: Option<DateTime<Utc>>,
    master_key: Option<&MasterKey>,
    chunk_size: usize,
    dest: W,
    progress: Option<ProgressFn>,
) -> SnapvaultResult<(RestoreReport, W)>
where
    W: Write + Send + 'static,
{
    let catalog = load_catalog(op, naming).await?;
    let entry = match selector {
        Some(timestamp) => catalog.find(timestamp)?,
        None => catalog.latest()?,
    };

    let payload_object = naming.object_name(entry.timestamp, ObjectKind::Payload);
    let payload = object_reader(op, &payload_object).await?;

    let plaintext: Box<dyn Read + Send> = if entry.key_present {
        let master_key = master_key.ok_or_else(|| {
            SnapvaultError::Config(format!(
                "backup {} is encrypted but no master key is configured",
                entry.timestamp
            ))
        })?;

        let key_object = naming.object_name(entry.timestamp, ObjectKind::Key);
        let wrapped = op.read(&key_object).await?.to_vec();
        debug!(object = %key_object, "wrapped data key read");

        Box::new(DecryptStream::new(master_key, &wrapped, payload, chunk_size)?)
    } else {
        if master_key.is_some() {
            warn!(
                object = %payload_object,
                "backup has no key object, restoring it as stored"
            );
        }
        Box::new(payload)
    };

    let (bytes_written, dest) = copy_to(ProgressReader::new(plaintext, progress), dest).await?;

    let report = RestoreReport {
        timestamp: entry.timestamp,
        payload_object,
        bytes_written,
        encrypted: entry.key_present,
    };
    info!(
        timestamp = %report.timestamp,
        object = %report.payload_object,
        bytes = report.bytes_written,
        encrypted = report.encrypted,
        "backup restored"
    );
    Ok((report, dest))
}
