//! Polling-side change detection.
//!
//! The CI host's polling cycle asks this module whether a job needs a build:
//! the stored [`RevisionBaseline`] from the last completed build is compared
//! against the server's current history, ignoring changesets that fall
//! entirely under the job's cloaked paths.

pub mod comparator;
pub mod history;

pub use comparator::{compare_remote_revision_with, PollOutcome, PollingDecision};
pub use history::{ChangesetHistoryProvider, HistoryError, VersionSpec, MAX_CHANGESETS_PER_QUERY};
