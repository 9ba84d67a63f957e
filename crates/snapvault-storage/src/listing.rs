//! Bucket listing and catalog reconstruction

use opendal::{EntryMode, Operator};
use tracing::debug;

use snapvault_catalog::{BackupCatalog, NamingConvention};
use snapvault_core::SnapvaultResult;

/// Names of the objects at the operator root. Directories are skipped.
pub async fn list_object_names(op: &Operator) -> SnapvaultResult<Vec<String>> {
    let entries = op.list("/").await?;

    Ok(entries
        .into_iter()
        .filter(|entry| entry.metadata().mode() == EntryMode::FILE)
        .map(|entry| entry.path().to_string())
        .collect())
}

/// List the bucket and fold the names into a fresh catalog.
pub async fn load_catalog(
    op: &Operator,
    naming: &NamingConvention,
) -> SnapvaultResult<BackupCatalog> {
    let names = list_object_names(op).await?;
    let catalog = BackupCatalog::build(&names, naming)?;

    debug!(
        objects = names.len(),
        backups = catalog.len(),
        valid = catalog.valid_count(),
        "catalog loaded"
    );
    Ok(catalog)
}
