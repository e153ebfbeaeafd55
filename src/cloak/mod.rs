//! Cloaked-path filtering.
//!
//! A cloaked path is a server-path prefix explicitly excluded from triggering
//! consideration: a changeset whose every affected path falls under some
//! cloaked prefix must not cause a build. Matching is a case-insensitive
//! prefix test, mirroring the server's case-insensitive path semantics.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AffectedPath, ChangesetRecord, ChangesetVersion};

/// The set of cloaked path prefixes configured on a job.
///
/// Read-only during comparison; owned by the job configuration. Order is
/// preserved for display but has no effect on matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CloakedPaths(Vec<String>);

impl CloakedPaths {
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        CloakedPaths(prefixes.into_iter().map(Into::into).collect())
    }

    /// An empty set: nothing is cloaked.
    pub fn none() -> Self {
        CloakedPaths(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Whether `path` falls under at least one cloaked prefix.
    ///
    /// Case-insensitive, consistent with server path semantics.
    pub fn covers(&self, path: &str) -> bool {
        let path_lower = path.to_lowercase();
        self.0
            .iter()
            .any(|prefix| path_lower.starts_with(&prefix.to_lowercase()))
    }
}

impl<S: Into<String>> FromIterator<S> for CloakedPaths {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        CloakedPaths::new(iter)
    }
}

/// Error returned when a changeset sequence violates the ordering contract.
///
/// Callers of [`find_latest_uncloaked`] guarantee a strictly decreasing
/// version sequence; a violation is a defect in the caller (or the history
/// provider), not a recoverable condition, so it is reported loudly rather
/// than silently corrected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("changeset versions must strictly decrease: {previous} followed by {next}")]
pub struct OrderingViolation {
    /// The earlier element in the sequence.
    pub previous: ChangesetVersion,

    /// The element that failed to decrease.
    pub next: ChangesetVersion,
}

/// True iff every affected path is covered by at least one cloaked prefix.
///
/// An empty prefix set cloaks nothing, so the result is always `false` in
/// that case. A changeset with no affected paths is considered fully cloaked
/// when prefixes exist: there is nothing uncloaked in it to build for.
pub fn is_fully_cloaked(affected_paths: &[AffectedPath], cloaked: &CloakedPaths) -> bool {
    if cloaked.is_empty() {
        return false;
    }
    affected_paths.iter().all(|p| cloaked.covers(&p.path))
}

/// Scans `changesets` from most-recent to oldest and returns the first record
/// that is not fully cloaked.
///
/// The caller guarantees the list is strictly decreasing by version; two
/// consecutive elements that do not strictly decrease fail with
/// [`OrderingViolation`]. Returns `None` when every record is cloaked or the
/// list is empty.
pub fn find_latest_uncloaked<'a>(
    changesets: &'a [ChangesetRecord],
    cloaked: &CloakedPaths,
) -> Result<Option<&'a ChangesetRecord>, OrderingViolation> {
    for pair in changesets.windows(2) {
        if pair[1].version >= pair[0].version {
            return Err(OrderingViolation {
                previous: pair[0].version,
                next: pair[1].version,
            });
        }
    }
    Ok(changesets
        .iter()
        .find(|record| !is_fully_cloaked(&record.affected_paths, cloaked)))
}

/// Returns the subsequence of `changesets` that are not fully cloaked,
/// preserving order.
pub fn filter_out_fully_cloaked<'a>(
    changesets: &'a [ChangesetRecord],
    cloaked: &CloakedPaths,
) -> Vec<&'a ChangesetRecord> {
    changesets
        .iter()
        .filter(|record| !is_fully_cloaked(&record.affected_paths, cloaked))
        .collect()
}
