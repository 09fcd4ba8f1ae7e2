//! Which bundle versions a cleanup may delete.
//!
//! Versions are walked newest first. Channel-referenced versions are always
//! kept and count against the keep budget; other versions are kept while
//! the budget lasts and marked for removal after that.

use std::collections::HashSet;

use semver::Version;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{OtaError, Result};
use crate::remote::{BundleService, BundleVersion, VersionId};

/// Default number of versions `cleanup` keeps.
pub const DEFAULT_KEEP: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionDecision {
    KeepExplicit,
    KeepInUse,
    Remove,
}

impl RetentionDecision {
    #[must_use]
    pub const fn is_keep(self) -> bool {
        !matches!(self, Self::Remove)
    }
}

/// Half-open semver range `[floor, ceiling)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    floor: Version,
    ceiling: Version,
}

impl VersionRange {
    /// Range from `floor` up to `ceiling`, or up to the next major version of
    /// `floor` when no ceiling is given.
    pub fn from_floor(floor: &str, ceiling: Option<&str>) -> Result<Self> {
        let floor = parse_bound(floor)?;
        let ceiling = match ceiling {
            Some(ceiling) => parse_bound(ceiling)?,
            None => next_major(&floor),
        };
        if ceiling <= floor {
            return Err(OtaError::InvalidRange(format!(
                "ceiling {ceiling} must be above floor {floor}"
            )));
        }
        Ok(Self { floor, ceiling })
    }

    #[must_use]
    pub const fn floor(&self) -> &Version {
        &self.floor
    }

    #[must_use]
    pub const fn ceiling(&self) -> &Version {
        &self.ceiling
    }

    /// Whether a version name parses as semver and falls in the range.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        Version::parse(name)
            .is_ok_and(|version| version >= self.floor && version < self.ceiling)
    }
}

impl std::fmt::Display for VersionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.floor, self.ceiling)
    }
}

fn parse_bound(input: &str) -> Result<Version> {
    Version::parse(input.trim()).map_err(|_| OtaError::InvalidRange(input.to_string()))
}

/// Smallest release strictly above every `major.x.y` release of `version`.
///
/// A pre-release of `X.0.0` bumps to `X.0.0` itself.
#[must_use]
pub fn next_major(version: &Version) -> Version {
    if !version.pre.is_empty() && version.minor == 0 && version.patch == 0 {
        Version::new(version.major, 0, 0)
    } else {
        Version::new(version.major + 1, 0, 0)
    }
}

/// One version and what the cleanup will do with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionEntry {
    pub version: BundleVersion,
    pub decision: RetentionDecision,
}

/// Order versions newest first, ties broken by id.
pub fn sort_by_recency(versions: &mut [BundleVersion]) {
    versions.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// Decide every in-range version. `versions` must already be newest first.
///
/// Versions outside `range` are dropped from the result entirely. The output
/// keeps input order.
#[must_use]
pub fn select_for_removal(
    versions: &[BundleVersion],
    in_use: &HashSet<VersionId>,
    keep: usize,
    range: Option<&VersionRange>,
) -> Vec<RetentionEntry> {
    let mut kept = 0usize;
    let entries: Vec<RetentionEntry> = versions
        .iter()
        .filter(|version| range.is_none_or(|range| range.contains(&version.name)))
        .map(|version| {
            let decision = if in_use.contains(&version.id) {
                kept += 1;
                RetentionDecision::KeepInUse
            } else if kept < keep {
                kept += 1;
                RetentionDecision::KeepExplicit
            } else {
                RetentionDecision::Remove
            };
            RetentionEntry {
                version: version.clone(),
                decision,
            }
        })
        .collect();

    debug!(
        considered = entries.len(),
        total = versions.len(),
        keep,
        "retention decided"
    );
    entries
}

/// What a cleanup run has to do once decisions are made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalPlan {
    /// No version is marked for removal.
    NothingToDo,
    Remove(Vec<BundleVersion>),
}

impl RemovalPlan {
    #[must_use]
    pub fn from_entries(entries: &[RetentionEntry]) -> Self {
        let removals: Vec<BundleVersion> = entries
            .iter()
            .filter(|entry| entry.decision == RetentionDecision::Remove)
            .map(|entry| entry.version.clone())
            .collect();
        if removals.is_empty() {
            Self::NothingToDo
        } else {
            Self::Remove(removals)
        }
    }
}

/// Result of deleting one version.
#[derive(Debug)]
pub struct RemovalOutcome {
    pub version: BundleVersion,
    pub result: Result<()>,
}

impl RemovalOutcome {
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.result.is_ok()
    }
}

/// Delete `removals` one at a time.
///
/// A failed delete is recorded and the walk moves on to the next version.
pub fn remove_versions<S: BundleService + ?Sized>(
    service: &S,
    app_id: &str,
    removals: &[BundleVersion],
) -> Vec<RemovalOutcome> {
    removals
        .iter()
        .fold(Vec::with_capacity(removals.len()), |mut outcomes, version| {
            let result = service.delete_version(app_id, &version.name);
            if let Err(err) = &result {
                warn!(app_id, version = %version.name, error = %err, "delete failed");
            }
            outcomes.push(RemovalOutcome {
                version: version.clone(),
                result,
            });
            outcomes
        })
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::remote::{ChannelRef, VersionUpload};

    fn version(id: VersionId, name: &str) -> BundleVersion {
        BundleVersion {
            id,
            name: name.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + id * 60, 0).unwrap(),
            checksum: None,
            session_key: None,
        }
    }

    /// v10..v1, newest first, id == number.
    fn ten_versions() -> Vec<BundleVersion> {
        (1..=10)
            .rev()
            .map(|n| version(n, &format!("1.0.{n}")))
            .collect()
    }

    fn names_with(entries: &[RetentionEntry], keep: bool) -> Vec<String> {
        entries
            .iter()
            .filter(|entry| entry.decision.is_keep() == keep)
            .map(|entry| entry.version.name.clone())
            .collect()
    }

    // =========================================================================
    // Range
    // =========================================================================

    #[test]
    fn ceiling_defaults_to_next_major() {
        let range = VersionRange::from_floor("2.0.0", None).unwrap();
        assert_eq!(range.ceiling(), &Version::new(3, 0, 0));
        assert!(range.contains("2.0.0"));
        assert!(range.contains("2.9.9"));
        assert!(!range.contains("1.9.0"));
        assert!(!range.contains("3.0.0"));
    }

    #[test]
    fn prerelease_floor_bumps_to_its_release() {
        let range = VersionRange::from_floor("2.0.0-beta.1", None).unwrap();
        assert_eq!(range.ceiling(), &Version::new(2, 0, 0));

        let range = VersionRange::from_floor("2.1.0-rc.1", None).unwrap();
        assert_eq!(range.ceiling(), &Version::new(3, 0, 0));
    }

    #[test]
    fn explicit_ceiling() {
        let range = VersionRange::from_floor("1.2.0", Some("1.4.0")).unwrap();
        assert!(range.contains("1.3.5"));
        assert!(!range.contains("1.4.0"));
        assert_eq!(range.to_string(), "[1.2.0, 1.4.0)");
    }

    #[test]
    fn malformed_floor_is_invalid_range() {
        for input in ["", "1.2", "banana", "v1.2.3"] {
            let err = VersionRange::from_floor(input, None).unwrap_err();
            assert!(matches!(err, OtaError::InvalidRange(_)), "input {input:?}");
        }
    }

    #[test]
    fn inverted_range_is_invalid() {
        assert!(matches!(
            VersionRange::from_floor("2.0.0", Some("1.0.0")),
            Err(OtaError::InvalidRange(_))
        ));
    }

    #[test]
    fn non_semver_names_are_outside_any_range() {
        let range = VersionRange::from_floor("0.0.0", None).unwrap();
        assert!(!range.contains("latest"));
        assert!(!range.contains(""));
    }

    // =========================================================================
    // Selection
    // =========================================================================

    #[test]
    fn keeps_newest_four_and_in_use() {
        let versions = ten_versions();
        let entries = select_for_removal(&versions, &HashSet::from([3]), 4, None);

        assert_eq!(entries.len(), 10);
        assert_eq!(
            names_with(&entries, true),
            vec!["1.0.10", "1.0.9", "1.0.8", "1.0.7", "1.0.3"]
        );
        assert_eq!(
            names_with(&entries, false),
            vec!["1.0.6", "1.0.5", "1.0.4", "1.0.2", "1.0.1"]
        );
        assert_eq!(entries[7].decision, RetentionDecision::KeepInUse);
    }

    #[test]
    fn in_use_version_consumes_budget() {
        // v10 in use takes one of the two slots
        let versions = ten_versions();
        let entries = select_for_removal(&versions, &HashSet::from([10]), 2, None);
        assert_eq!(names_with(&entries, true), vec!["1.0.10", "1.0.9"]);
        assert_eq!(entries[0].decision, RetentionDecision::KeepInUse);
        assert_eq!(entries[1].decision, RetentionDecision::KeepExplicit);
    }

    #[test]
    fn range_excludes_out_of_range_versions() {
        let versions = vec![
            version(5, "3.0.0"),
            version(4, "2.5.0"),
            version(3, "2.0.0"),
            version(2, "1.9.0"),
            version(1, "not-semver"),
        ];
        let range = VersionRange::from_floor("2.0.0", None).unwrap();
        let entries = select_for_removal(&versions, &HashSet::new(), 1, Some(&range));

        let names: Vec<_> = entries.iter().map(|e| e.version.name.as_str()).collect();
        assert_eq!(names, vec!["2.5.0", "2.0.0"]);
        assert_eq!(entries[0].decision, RetentionDecision::KeepExplicit);
        assert_eq!(entries[1].decision, RetentionDecision::Remove);
    }

    #[test]
    fn keep_zero_removes_everything_not_in_use() {
        let versions = vec![version(3, "1.0.2"), version(2, "1.0.1"), version(1, "1.0.0")];
        let entries = select_for_removal(&versions, &HashSet::new(), 0, None);
        assert!(
            entries
                .iter()
                .all(|entry| entry.decision == RetentionDecision::Remove)
        );
    }

    #[test]
    fn everything_in_use_removes_nothing() {
        let versions = ten_versions();
        let in_use: HashSet<_> = versions.iter().map(|v| v.id).collect();
        let entries = select_for_removal(&versions, &in_use, 0, None);
        assert_eq!(RemovalPlan::from_entries(&entries), RemovalPlan::NothingToDo);
    }

    #[test]
    fn empty_input_is_nothing_to_do() {
        let entries = select_for_removal(&[], &HashSet::new(), 4, None);
        assert!(entries.is_empty());
        assert_eq!(RemovalPlan::from_entries(&entries), RemovalPlan::NothingToDo);
    }

    #[test]
    fn sort_by_recency_orders_newest_first() {
        let mut versions = vec![version(1, "1.0.0"), version(3, "1.0.2"), version(2, "1.0.1")];
        sort_by_recency(&mut versions);
        let ids: Vec<_> = versions.iter().map(|v| v.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    // =========================================================================
    // Removal
    // =========================================================================

    struct FlakyService {
        fail: &'static str,
        deleted: RefCell<Vec<String>>,
    }

    impl BundleService for FlakyService {
        fn list_versions(&self, _: &str) -> Result<Vec<BundleVersion>> {
            Ok(Vec::new())
        }

        fn list_channels(&self, _: &str) -> Result<Vec<ChannelRef>> {
            Ok(Vec::new())
        }

        fn delete_version(&self, _: &str, name: &str) -> Result<()> {
            self.deleted.borrow_mut().push(name.to_string());
            if name == self.fail {
                Err(OtaError::Remote("HTTP 500".into()))
            } else {
                Ok(())
            }
        }

        fn upload_version(&self, _: &str, _: &VersionUpload, _: Option<&[u8]>) -> Result<BundleVersion> {
            unreachable!()
        }

        fn set_channel(&self, _: &str, _: &str, _: &str) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_delete_does_not_stop_the_rest() {
        let service = FlakyService {
            fail: "1.0.1",
            deleted: RefCell::new(Vec::new()),
        };
        let removals = vec![version(3, "1.0.2"), version(2, "1.0.1"), version(1, "1.0.0")];

        let outcomes = remove_versions(&service, "app", &removals);

        assert_eq!(
            *service.deleted.borrow(),
            vec!["1.0.2".to_string(), "1.0.1".to_string(), "1.0.0".to_string()]
        );
        let removed: Vec<bool> = outcomes.iter().map(RemovalOutcome::is_removed).collect();
        assert_eq!(removed, vec![true, false, true]);
        assert_eq!(outcomes[1].version.name, "1.0.1");
    }
}
