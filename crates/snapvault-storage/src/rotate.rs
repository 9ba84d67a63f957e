use opendal::Operator;
use serde::Serialize;
use tracing::{debug, info};

use snapvault_catalog::{NamingConvention, ObjectKind};
use snapvault_core::{SnapvaultError, SnapvaultResult};
use snapvault_crypto::CryptoResult;

use crate::listing::load_catalog;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RotationReport {
    /// Key objects rewritten
    pub rotated: usize,
    /// Key objects the converter returned unchanged
    pub unchanged: usize,
}

/// Pass every stored wrapped data key through `convert`, oldest backup first.
///
/// Each key object is read, converted and written back under the same name.
/// Unchanged results are not rewritten. The run stops at the first key object
/// `convert` rejects; with an idempotent converter such as
/// `snapvault_crypto::rewrap_converter` it can simply be started again.
pub async fn rotate_keys<F>(
    op: &Operator,
    naming: &NamingConvention,
    convert: F,
) -> SnapvaultResult<RotationReport>
where
    F: Fn(&[u8]) -> CryptoResult<Vec<u8>>,
{
    let catalog = load_catalog(op, naming).await?;
    let mut report = RotationReport::default();

    for entry in catalog.entries().filter(|e| e.key_present) {
        let object = naming.object_name(entry.timestamp, ObjectKind::Key);
        let wrapped = op.read(&object).await?.to_vec();

        let converted = match convert(&wrapped) {
            Ok(converted) => converted,
            Err(source) => return Err(SnapvaultError::Rotation { object, source }),
        };

        if converted == wrapped {
            debug!(object = %object, "key already rotated");
            report.unchanged += 1;
        } else {
            op.write(&object, converted).await?;
            debug!(object = %object, "key rotated");
            report.rotated += 1;
        }
    }

    info!(
        rotated = report.rotated,
        unchanged = report.unchanged,
        "key rotation complete"
    );
    Ok(report)
}
