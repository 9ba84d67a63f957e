use chrono::{DateTime, Utc};
use opendal::Operator;
use tracing::{debug, info};

use snapvault_catalog::{BackupEntry, NamingConvention, ObjectKind, RetentionPolicy};
use snapvault_core::SnapvaultResult;

use crate::listing::load_catalog;

/// Delete every backup the retention policy releases at `now`.
///
/// Objects are removed entry by entry, oldest first; the first failed delete
/// stops the run. Returns the entries that were removed.
pub async fn prune_backups(
    op: &Operator,
    naming: &NamingConvention,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> SnapvaultResult<Vec<BackupEntry>> {
    let catalog = load_catalog(op, naming).await?;
    let doomed = policy.deletable(&catalog, now);

    for entry in &doomed {
        delete_entry(op, naming, entry).await?;
    }

    info!(
        deleted = doomed.len(),
        remaining_valid = catalog.valid_count() - doomed.iter().filter(|e| e.is_valid()).count(),
        cutoff = %policy.cutoff(now),
        "prune complete"
    );
    Ok(doomed)
}

async fn delete_entry(
    op: &Operator,
    naming: &NamingConvention,
    entry: &BackupEntry,
) -> SnapvaultResult<()> {
    if entry.payload_present {
        let name = naming.object_name(entry.timestamp, ObjectKind::Payload);
        op.delete(&name).await?;
        debug!(object = %name, "deleted");
    }
    if entry.key_present {
        let name = naming.object_name(entry.timestamp, ObjectKind::Key);
        op.delete(&name).await?;
        debug!(object = %name, "deleted");
    }
    Ok(())
}
