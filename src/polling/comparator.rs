//! Baseline-vs-server comparison.
//!
//! Stateless: the comparator operates on its inputs each call. The two input
//! conditions (baseline present or absent, baseline comparable or not) take
//! the place of any stored state machine.
//!
//! # Failure semantics
//!
//! A failure contacting the server degrades to `NoChanges` (logged): a
//! transient outage must never spuriously trigger a build. The trade-off is
//! that a persistent outage silently suppresses legitimate builds until it
//! clears. Ordering violations in the returned history are a defect, not an
//! outage, and propagate loudly.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::cloak::{filter_out_fully_cloaked, find_latest_uncloaked, CloakedPaths, OrderingViolation};
use crate::types::RevisionBaseline;

use super::history::{ChangesetHistoryProvider, VersionSpec, MAX_CHANGESETS_PER_QUERY};

/// What the polling cycle should do for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingDecision {
    /// Nothing relevant changed; do not build.
    NoChanges,

    /// Relevant changes exist beyond the baseline; build.
    Significant,

    /// Build unconditionally: either there is no baseline to compare against
    /// and uncloaked changes exist, or the baseline's project path no longer
    /// matches the job's and no comparison is possible.
    BuildNow,
}

/// A polling decision together with the baseline to carry forward.
///
/// `baseline` is `None` when no usable baseline exists; one must be recorded
/// when the triggered build completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub decision: PollingDecision,
    pub baseline: Option<RevisionBaseline>,
}

impl PollOutcome {
    fn new(decision: PollingDecision, baseline: Option<RevisionBaseline>) -> Self {
        PollOutcome { decision, baseline }
    }
}

/// Compares a job's stored baseline against current server history.
///
/// * With no baseline (first run, or a job upgraded from a version that did
///   not record one), falls back to a time-range query from `last_build_time`:
///   any uncloaked changeset means `BuildNow`.
/// * With a baseline whose project path no longer matches the job's, returns
///   `BuildNow`: the histories are incomparable.
/// * Otherwise queries from the baseline version to latest and searches for
///   the most recent uncloaked changeset. Finding none, or only the baseline
///   itself, means `NoChanges` with the baseline unchanged; anything newer
///   means `Significant` with a superseding baseline.
///
/// Calling twice with the same baseline and no intervening server changes
/// yields `NoChanges` both times with the baseline unchanged.
pub fn compare_remote_revision_with(
    provider: &dyn ChangesetHistoryProvider,
    baseline: Option<&RevisionBaseline>,
    project_path: &str,
    cloaked: &CloakedPaths,
    last_build_time: DateTime<Utc>,
) -> Result<PollOutcome, OrderingViolation> {
    let Some(baseline) = baseline else {
        return Ok(compare_without_baseline(
            provider,
            project_path,
            cloaked,
            last_build_time,
        ));
    };

    if !baseline.is_comparable_to(project_path) {
        debug!(
            baseline_path = %baseline.project_path,
            project_path,
            "baseline project path differs from job's; building unconditionally"
        );
        return Ok(PollOutcome::new(PollingDecision::BuildNow, None));
    }

    let history = match provider.query(
        project_path,
        VersionSpec::Version(baseline.changeset_version),
        VersionSpec::Latest,
        true,
        MAX_CHANGESETS_PER_QUERY,
    ) {
        Ok(history) => history,
        Err(e) => {
            warn!(project_path, error = %e, "history query failed; reporting no changes");
            return Ok(PollOutcome::new(
                PollingDecision::NoChanges,
                Some(baseline.clone()),
            ));
        }
    };

    match find_latest_uncloaked(&history, cloaked)? {
        None => Ok(PollOutcome::new(
            PollingDecision::NoChanges,
            Some(baseline.clone()),
        )),
        Some(latest) if latest.version == baseline.changeset_version => Ok(PollOutcome::new(
            PollingDecision::NoChanges,
            Some(baseline.clone()),
        )),
        Some(latest) => {
            debug!(
                project_path,
                baseline = %baseline.changeset_version,
                latest = %latest.version,
                "significant changes since baseline"
            );
            Ok(PollOutcome::new(
                PollingDecision::Significant,
                Some(RevisionBaseline::new(latest.version, project_path)),
            ))
        }
    }
}

/// Legacy mode: no baseline recorded, compare by time range instead.
fn compare_without_baseline(
    provider: &dyn ChangesetHistoryProvider,
    project_path: &str,
    cloaked: &CloakedPaths,
    last_build_time: DateTime<Utc>,
) -> PollOutcome {
    let history = match provider.query(
        project_path,
        VersionSpec::Date(last_build_time),
        VersionSpec::Latest,
        true,
        MAX_CHANGESETS_PER_QUERY,
    ) {
        Ok(history) => history,
        Err(e) => {
            warn!(project_path, error = %e, "history query failed; reporting no changes");
            return PollOutcome::new(PollingDecision::NoChanges, None);
        }
    };

    if filter_out_fully_cloaked(&history, cloaked).is_empty() {
        PollOutcome::new(PollingDecision::NoChanges, None)
    } else {
        debug!(project_path, "uncloaked changes since last build; no baseline to compare");
        PollOutcome::new(PollingDecision::BuildNow, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AffectedPath, ChangesetRecord, ChangesetVersion, PathAction};
    use std::cell::RefCell;

    use crate::polling::history::HistoryError;

    fn record(version: u64, paths: &[&str]) -> ChangesetRecord {
        ChangesetRecord {
            version: ChangesetVersion(version),
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
            author: "alice".to_string(),
            comment: String::new(),
            affected_paths: paths
                .iter()
                .map(|p| AffectedPath::new(*p, PathAction::Edit))
                .collect(),
        }
    }

    /// Returns canned responses in order, recording the queries made.
    struct FakeProvider {
        responses: RefCell<Vec<Result<Vec<ChangesetRecord>, HistoryError>>>,
        queries: RefCell<Vec<(String, VersionSpec, VersionSpec)>>,
    }

    impl FakeProvider {
        fn returning(history: Vec<ChangesetRecord>) -> Self {
            FakeProvider {
                responses: RefCell::new(vec![Ok(history)]),
                queries: RefCell::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            FakeProvider {
                responses: RefCell::new(vec![Err(HistoryError::Unreachable(
                    "connection refused".to_string(),
                ))]),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl ChangesetHistoryProvider for FakeProvider {
        fn query(
            &self,
            project_path: &str,
            from: VersionSpec,
            to: VersionSpec,
            _include_details: bool,
            _max_count: usize,
        ) -> Result<Vec<ChangesetRecord>, HistoryError> {
            self.queries
                .borrow_mut()
                .push((project_path.to_string(), from, to));
            self.responses.borrow_mut().remove(0)
        }
    }

    fn noon() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().unwrap()
    }

    // ─── Baseline mode ───

    #[test]
    fn latest_uncloaked_equals_baseline_means_no_changes() {
        let provider = FakeProvider::returning(vec![record(50, &["$/Proj/a"])]);
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");

        let outcome = compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::NoChanges);
        assert_eq!(outcome.baseline, Some(baseline));
    }

    #[test]
    fn newer_uncloaked_changeset_is_significant() {
        let provider =
            FakeProvider::returning(vec![record(55, &["$/Proj/b"]), record(50, &["$/Proj/a"])]);
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");

        let outcome = compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::Significant);
        assert_eq!(
            outcome.baseline,
            Some(RevisionBaseline::new(ChangesetVersion(55), "$/Proj"))
        );
    }

    #[test]
    fn newer_but_fully_cloaked_changesets_are_no_changes() {
        let provider = FakeProvider::returning(vec![
            record(55, &["$/Proj/docs/readme.md"]),
            record(50, &["$/Proj/a"]),
        ]);
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");
        let cloaked = CloakedPaths::new(["$/Proj/docs"]);

        let outcome =
            compare_remote_revision_with(&provider, Some(&baseline), "$/Proj", &cloaked, noon())
                .unwrap();

        // 55 is cloaked, so the latest uncloaked is the baseline itself.
        assert_eq!(outcome.decision, PollingDecision::NoChanges);
        assert_eq!(outcome.baseline, Some(baseline));
    }

    #[test]
    fn query_range_starts_at_baseline_version() {
        let provider = FakeProvider::returning(vec![record(50, &["$/Proj/a"])]);
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");

        compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        let queries = provider.queries.borrow();
        assert_eq!(
            queries[0],
            (
                "$/Proj".to_string(),
                VersionSpec::Version(ChangesetVersion(50)),
                VersionSpec::Latest
            )
        );
    }

    #[test]
    fn comparison_is_idempotent() {
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");
        let mut current = Some(baseline.clone());

        for _ in 0..2 {
            let provider = FakeProvider::returning(vec![record(50, &["$/Proj/a"])]);
            let outcome = compare_remote_revision_with(
                &provider,
                current.as_ref(),
                "$/Proj",
                &CloakedPaths::none(),
                noon(),
            )
            .unwrap();
            assert_eq!(outcome.decision, PollingDecision::NoChanges);
            current = outcome.baseline;
        }

        assert_eq!(current, Some(baseline));
    }

    #[test]
    fn incomparable_project_path_builds_now() {
        // No query should even be attempted.
        let provider = FakeProvider {
            responses: RefCell::new(vec![]),
            queries: RefCell::new(Vec::new()),
        };
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/OldRoot");

        let outcome = compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/NewRoot",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::BuildNow);
        assert_eq!(outcome.baseline, None);
        assert!(provider.queries.borrow().is_empty());
    }

    #[test]
    fn project_path_comparison_ignores_case() {
        let provider = FakeProvider::returning(vec![record(50, &["$/Proj/a"])]);
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/PROJ");

        let outcome = compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::NoChanges);
    }

    #[test]
    fn server_failure_degrades_to_no_changes() {
        let provider = FakeProvider::failing();
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");

        let outcome = compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::NoChanges);
        assert_eq!(outcome.baseline, Some(baseline));
    }

    #[test]
    fn ordering_violation_propagates() {
        // The provider returned a non-decreasing sequence: a defect, not an
        // outage, so it must not degrade to NoChanges.
        let provider =
            FakeProvider::returning(vec![record(50, &["$/Proj/a"]), record(55, &["$/Proj/b"])]);
        let baseline = RevisionBaseline::new(ChangesetVersion(50), "$/Proj");

        let result = compare_remote_revision_with(
            &provider,
            Some(&baseline),
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        );

        assert!(result.is_err());
    }

    // ─── Legacy mode (no baseline) ───

    #[test]
    fn no_baseline_with_uncloaked_changes_builds_now() {
        let provider = FakeProvider::returning(vec![record(60, &["$/Proj/src/x.c"])]);

        let outcome = compare_remote_revision_with(
            &provider,
            None,
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::BuildNow);
        assert_eq!(outcome.baseline, None);
    }

    #[test]
    fn no_baseline_queries_by_time_range() {
        let provider = FakeProvider::returning(vec![]);

        compare_remote_revision_with(&provider, None, "$/Proj", &CloakedPaths::none(), noon())
            .unwrap();

        let queries = provider.queries.borrow();
        assert_eq!(
            queries[0],
            (
                "$/Proj".to_string(),
                VersionSpec::Date(noon()),
                VersionSpec::Latest
            )
        );
    }

    #[test]
    fn no_baseline_with_only_cloaked_changes_is_no_changes() {
        let provider = FakeProvider::returning(vec![record(60, &["$/Proj/docs/readme.md"])]);
        let cloaked = CloakedPaths::new(["$/Proj/docs"]);

        let outcome =
            compare_remote_revision_with(&provider, None, "$/Proj", &cloaked, noon()).unwrap();

        assert_eq!(outcome.decision, PollingDecision::NoChanges);
        assert_eq!(outcome.baseline, None);
    }

    #[test]
    fn no_baseline_server_failure_degrades_to_no_changes() {
        let provider = FakeProvider::failing();

        let outcome = compare_remote_revision_with(
            &provider,
            None,
            "$/Proj",
            &CloakedPaths::none(),
            noon(),
        )
        .unwrap();

        assert_eq!(outcome.decision, PollingDecision::NoChanges);
    }
}
