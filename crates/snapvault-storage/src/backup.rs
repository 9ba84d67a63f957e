use chrono::{DateTime, SubsecRound, Utc};
use opendal::Operator;
use serde::Serialize;
use std::io::Read;
use tracing::{debug, info, warn};

use snapvault_catalog::NamingConvention;
use snapvault_core::{SnapvaultError, SnapvaultResult};
use snapvault_crypto::{EncryptStream, MasterKey};

use crate::bridge::{write_object, ProgressFn, ProgressReader};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupReport {
    pub timestamp: DateTime<Utc>,
    pub payload_object: String,
    /// Present only for encrypted backups
    pub key_object: Option<String>,
    /// Size of the payload object
    pub bytes_written: u64,
    pub encrypted: bool,
}

/// Store `source` as the backup taken at `timestamp` (truncated to seconds).
///
/// Fails with `BackupExists` before writing anything if either object of that
/// second is already stored.
///
/// With a master key, the wrapped data key object is written first and the
/// payload is streamed through an [`EncryptStream`]. A failure after the key
/// is written leaves an orphaned key object, which pruning removes. Without a
/// master key the payload is stored as-is.
pub async fn upload_backup<R>(
    op: &Operator,
    naming: &NamingConvention,
    timestamp: DateTime<Utc>,
    source: R,
    master_key: Option<&MasterKey>,
    chunk_size: usize,
    progress: Option<ProgressFn>,
) -> SnapvaultResult<BackupReport>
where
    R: Read + Send + 'static,
{
    let timestamp = timestamp.trunc_subsecs(0);
    let (payload_object, key_object) = naming.object_names(timestamp);
    for object in [&payload_object, &key_object] {
        if op.exists(object).await? {
            return Err(SnapvaultError::BackupExists {
                timestamp: timestamp.to_rfc3339(),
                object: object.clone(),
            });
        }
    }
    let source = ProgressReader::new(source, progress);

    let report = match master_key {
        Some(master_key) => {
            let stream = EncryptStream::new(master_key, source, chunk_size)?;

            op.write(&key_object, stream.wrapped_data_key()?).await?;
            debug!(object = %key_object, "wrapped data key written");

            let bytes_written = write_object(op, &payload_object, stream).await?;
            BackupReport {
                timestamp,
                payload_object,
                key_object: Some(key_object),
                bytes_written,
                encrypted: true,
            }
        }
        None => {
            warn!(
                object = %payload_object,
                "no master key configured, backup is stored unencrypted"
            );
            let bytes_written = write_object(op, &payload_object, source).await?;
            BackupReport {
                timestamp,
                payload_object,
                key_object: None,
                bytes_written,
                encrypted: false,
            }
        }
    };

    info!(
        timestamp = %report.timestamp,
        object = %report.payload_object,
        bytes = report.bytes_written,
        encrypted = report.encrypted,
        "backup uploaded"
    );
    Ok(report)
}
