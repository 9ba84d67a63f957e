use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};
use crate::naming::{NamingConvention, ObjectKind};

/// Evidence found in storage for one backup timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BackupEntry {
    pub timestamp: DateTime<Utc>,
    pub payload_present: bool,
    pub key_present: bool,
}

impl BackupEntry {
    fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            payload_present: false,
            key_present: false,
        }
    }

    /// Restorable: the payload object exists. A key object alone is residue.
    pub fn is_valid(&self) -> bool {
        self.payload_present
    }

    pub fn is_encrypted(&self) -> bool {
        self.key_present
    }
}

/// Backups reconstructed from a storage listing, ordered by timestamp.
#[derive(Debug, Clone, Default)]
pub struct BackupCatalog {
    entries: BTreeMap<DateTime<Utc>, BackupEntry>,
    latest: Option<DateTime<Utc>>,
}

impl BackupCatalog {
    /// Fold object names into per-timestamp entries.
    ///
    /// Names outside the convention are skipped. A name that matches the
    /// convention but carries an unparseable timestamp fails the whole build.
    pub fn build<I, S>(names: I, naming: &NamingConvention) -> CatalogResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut catalog = Self::default();

        for name in names {
            let info = match naming.parse(name.as_ref()) {
                Ok(info) => info,
                Err(CatalogError::UnrecognizedName(_)) => continue,
                Err(e) => return Err(e),
            };

            let entry = catalog
                .entries
                .entry(info.timestamp)
                .or_insert_with(|| BackupEntry::empty(info.timestamp));

            match info.kind {
                ObjectKind::Payload => entry.payload_present = true,
                ObjectKind::Key => entry.key_present = true,
            }

            if entry.payload_present && catalog.latest.map_or(true, |t| info.timestamp >= t) {
                catalog.latest = Some(info.timestamp);
            }
        }

        Ok(catalog)
    }

    /// The valid backup taken at exactly `timestamp`.
    pub fn find(&self, timestamp: DateTime<Utc>) -> CatalogResult<BackupEntry> {
        self.entries
            .get(&timestamp)
            .filter(|entry| entry.is_valid())
            .copied()
            .ok_or(CatalogError::NotFound(timestamp))
    }

    /// The most recent valid backup.
    pub fn latest(&self) -> CatalogResult<BackupEntry> {
        self.latest
            .and_then(|ts| self.entries.get(&ts))
            .copied()
            .ok_or(CatalogError::NoValidBackups)
    }

    /// Every entry, valid or not, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &BackupEntry> {
        self.entries.values()
    }

    pub fn valid_count(&self) -> usize {
        self.entries.values().filter(|e| e.is_valid()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
