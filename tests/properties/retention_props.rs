use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use otaup::remote::{BundleVersion, VersionId};
use otaup::retention::{
    RemovalPlan, RetentionDecision, VersionRange, next_major, select_for_removal,
    sort_by_recency,
};

fn arb_versions() -> impl Strategy<Value = Vec<BundleVersion>> {
    prop::collection::vec((0u64..4, 0u64..6, 0u64..6, 0i64..1_000_000), 0..24).prop_map(
        |raw| {
            raw.into_iter()
                .zip(1..)
                .map(|((major, minor, patch, offset), id)| BundleVersion {
                    id,
                    name: format!("{major}.{minor}.{patch}"),
                    created_at: Utc.timestamp_opt(1_700_000_000 + offset, 0).unwrap(),
                    checksum: None,
                    session_key: None,
                })
                .collect()
        },
    )
}

fn in_use_subset(versions: &[BundleVersion], mask: &[bool]) -> HashSet<VersionId> {
    versions
        .iter()
        .zip(mask.iter().cycle())
        .filter(|(_, used)| **used)
        .map(|(version, _)| version.id)
        .collect()
}

proptest! {
    #[test]
    fn in_use_versions_are_never_removed(
        mut versions in arb_versions(),
        mask in prop::collection::vec(any::<bool>(), 1..8),
        keep in 0usize..8,
    ) {
        sort_by_recency(&mut versions);
        let in_use = in_use_subset(&versions, &mask);
        let entries = select_for_removal(&versions, &in_use, keep, None);

        prop_assert_eq!(entries.len(), versions.len());
        for entry in &entries {
            if in_use.contains(&entry.version.id) {
                prop_assert_eq!(entry.decision, RetentionDecision::KeepInUse);
            }
        }
    }

    #[test]
    fn removals_only_after_keep_is_reached(
        mut versions in arb_versions(),
        mask in prop::collection::vec(any::<bool>(), 1..8),
        keep in 0usize..8,
    ) {
        sort_by_recency(&mut versions);
        let in_use = in_use_subset(&versions, &mask);
        let entries = select_for_removal(&versions, &in_use, keep, None);

        let mut kept = 0usize;
        for entry in &entries {
            if entry.decision.is_keep() {
                kept += 1;
            } else {
                prop_assert!(kept >= keep);
            }
        }
        prop_assert!(kept >= entries.len().min(keep));
        if versions.len() <= keep {
            prop_assert_eq!(RemovalPlan::from_entries(&entries), RemovalPlan::NothingToDo);
        }
    }

    #[test]
    fn range_filters_before_counting(
        mut versions in arb_versions(),
        major in 0u64..4,
        keep in 0usize..4,
    ) {
        sort_by_recency(&mut versions);
        let range = VersionRange::from_floor(&format!("{major}.0.0"), None).unwrap();
        let entries = select_for_removal(&versions, &HashSet::new(), keep, Some(&range));

        let expected = versions.iter().filter(|v| range.contains(&v.name)).count();
        prop_assert_eq!(entries.len(), expected);
        let major_prefix = format!("{major}.");
        prop_assert!(entries.iter().all(|e| e.version.name.starts_with(&major_prefix)));
        let explicit = entries
            .iter()
            .filter(|e| e.decision == RetentionDecision::KeepExplicit)
            .count();
        prop_assert_eq!(explicit, expected.min(keep));
    }

    #[test]
    fn range_is_floor_inclusive_and_ceiling_exclusive(
        major in 0u64..100,
        minor in 0u64..100,
        patch in 0u64..100,
    ) {
        let floor = semver::Version::new(major, minor, patch);
        let range = VersionRange::from_floor(&floor.to_string(), None).unwrap();
        prop_assert!(range.contains(&floor.to_string()));
        prop_assert!(!range.contains(&next_major(&floor).to_string()));
    }
}
