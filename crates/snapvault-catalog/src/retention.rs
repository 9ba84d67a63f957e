//! Retention: age-based expiry under a minimum-count floor
//!
//! Entries at or before the cutoff are expired. Expired entries without a
//! payload (orphans) can never be restored and are always deletable. Expired
//! valid entries are deleted oldest first, but only while more than
//! `min_keep` valid backups would remain.

use chrono::{DateTime, Duration, Utc};

use crate::catalog::{BackupCatalog, BackupEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_age: Duration,
    pub min_keep: usize,
}

impl RetentionPolicy {
    pub fn new(max_age: Duration, min_keep: usize) -> Self {
        Self { max_age, min_keep }
    }

    /// Backups taken at or before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn deletable(&self, catalog: &BackupCatalog, now: DateTime<Utc>) -> Vec<BackupEntry> {
        deletable(catalog, self.cutoff(now), self.min_keep)
    }
}

/// Entries that may be deleted, ordered by timestamp.
///
/// Expired orphans are always included; `min_keep` only holds back valid entries.
pub fn deletable(
    catalog: &BackupCatalog,
    cutoff: DateTime<Utc>,
    min_keep: usize,
) -> Vec<BackupEntry> {
    let (mut candidates, orphans): (Vec<BackupEntry>, Vec<BackupEntry>) = catalog
        .entries()
        .copied()
        .filter(|entry| entry.timestamp <= cutoff)
        .partition(|entry| entry.is_valid());

    // entries() is ascending, so this keeps the oldest candidates and
    // retains the most recent expired ones needed to hold the floor
    let removable = catalog.valid_count().saturating_sub(min_keep);
    candidates.truncate(removable);

    candidates.extend(orphans);
    candidates.sort_by_key(|entry| entry.timestamp);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::{NamingConvention, ObjectKind};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    /// (day, payload, key) triples to a catalog, through real object names.
    fn catalog_of(layout: &[(i64, bool, bool)]) -> BackupCatalog {
        let naming = NamingConvention::new("backup").unwrap();
        let mut names = Vec::new();
        for &(d, payload, key) in layout {
            if payload {
                names.push(naming.object_name(day(d), ObjectKind::Payload));
            }
            if key {
                names.push(naming.object_name(day(d), ObjectKind::Key));
            }
        }
        BackupCatalog::build(names, &naming).unwrap()
    }

    fn days_of(entries: &[BackupEntry]) -> Vec<DateTime<Utc>> {
        entries.iter().map(|e| e.timestamp).collect()
    }

    #[test]
    fn test_floor_equal_to_valid_count_deletes_nothing() {
        let layout: Vec<_> = (1..=20).map(|d| (d, true, true)).collect();
        let catalog = catalog_of(&layout);

        for cutoff in [day(0), day(10), day(100)] {
            assert!(deletable(&catalog, cutoff, 20).is_empty());
        }
    }

    #[test]
    fn test_oldest_expired_deleted_first() {
        let catalog = catalog_of(&[
            (1, true, false),
            (2, true, false),
            (3, true, false),
            (4, true, false),
            (5, true, false),
        ]);
        let cutoff = day(4) + Duration::hours(12);

        let result = deletable(&catalog, cutoff, 3);
        assert_eq!(days_of(&result), vec![day(1), day(2)]);
    }

    #[test]
    fn test_all_expired_deleted_when_floor_allows() {
        let catalog = catalog_of(&[(1, true, true), (2, true, true), (3, true, true)]);

        let result = deletable(&catalog, day(2), 1);
        assert_eq!(days_of(&result), vec![day(1), day(2)]);
    }

    #[test]
    fn test_cutoff_is_inclusive() {
        let catalog = catalog_of(&[(1, true, false), (2, true, false)]);
        assert_eq!(days_of(&deletable(&catalog, day(1), 0)), vec![day(1)]);
    }

    #[test]
    fn test_orphans_always_deleted() {
        let catalog = catalog_of(&[(1, false, true), (2, true, true), (3, true, true)]);

        // Floor exceeds the valid count; the orphan still goes
        let result = deletable(&catalog, day(5), 10);
        assert_eq!(
            result,
            vec![BackupEntry {
                timestamp: day(1),
                payload_present: false,
                key_present: true
            }]
        );
    }

    #[test]
    fn test_orphans_after_cutoff_kept() {
        let catalog = catalog_of(&[(1, true, true), (9, false, true)]);
        assert!(deletable(&catalog, day(5), 0).iter().all(|e| e.timestamp == day(1)));
    }

    #[test]
    fn test_mixed_result_is_sorted() {
        let catalog = catalog_of(&[
            (1, true, true),
            (2, false, true),
            (3, true, true),
            (4, true, true),
            (5, true, true),
        ]);

        let result = deletable(&catalog, day(4), 2);
        assert_eq!(days_of(&result), vec![day(1), day(2), day(3)]);
    }

    #[test]
    fn test_policy_cutoff() {
        let policy = RetentionPolicy::new(Duration::days(15), 20);
        assert_eq!(policy.cutoff(day(20)), day(5));
    }

    proptest! {
        #[test]
        fn floor_is_never_breached(
            layout in proptest::collection::btree_map(
                0i64..60,
                (any::<bool>(), any::<bool>()),
                0..40,
            ),
            cutoff_day in 0i64..60,
            min_keep in 0usize..30,
        ) {
            let layout: Vec<_> = layout
                .into_iter()
                .filter(|(_, (payload, key))| *payload || *key)
                .map(|(d, (payload, key))| (d, payload, key))
                .collect();
            let catalog = catalog_of(&layout);
            let cutoff = day(cutoff_day);
            let result = deletable(&catalog, cutoff, min_keep);

            let valid = catalog.valid_count();
            let deleted_valid = result.iter().filter(|e| e.is_valid()).count();
            prop_assert!(deleted_valid <= valid.saturating_sub(min_keep));
            prop_assert!(result.iter().all(|e| e.timestamp <= cutoff));

            let expired_orphans = catalog
                .entries()
                .filter(|e| !e.is_valid() && e.timestamp <= cutoff)
                .count();
            prop_assert_eq!(result.len() - deleted_valid, expired_orphans);

            // Any kept expired valid entry is newer than every deleted one
            let newest_deleted = result
                .iter()
                .filter(|e| e.is_valid())
                .map(|e| e.timestamp)
                .max();
            if let Some(newest_deleted) = newest_deleted {
                let kept_older = catalog
                    .entries()
                    .filter(|e| e.is_valid() && e.timestamp <= cutoff && !result.contains(e))
                    .any(|e| e.timestamp < newest_deleted);
                prop_assert!(!kept_older);
            }
        }
    }
}
