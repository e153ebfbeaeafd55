//! History queries against the version-control server.
//!
//! The server itself is an external collaborator; this module defines the
//! interface the comparator needs from it and nothing more.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{ChangesetRecord, ChangesetVersion};

/// Upper bound on changesets returned per history query.
///
/// Matches the page size the server uses for history listings; the comparator
/// only ever needs the most recent uncloaked changeset, so one page is enough.
pub const MAX_CHANGESETS_PER_QUERY: usize = 256;

/// One endpoint of a history query range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSpec {
    /// A specific changeset version.
    Version(ChangesetVersion),

    /// The changeset current at a point in time.
    Date(DateTime<Utc>),

    /// The newest changeset on the server.
    Latest,
}

/// Errors from the history collaborator.
///
/// These are transient from the comparator's point of view: the server being
/// unreachable this cycle does not mean anything changed.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The server could not be reached or did not answer in time.
    #[error("version-control server unreachable: {0}")]
    Unreachable(String),

    /// The server rejected the query.
    #[error("history query rejected: {0}")]
    Rejected(String),
}

/// Queries the version-control server for an ordered list of changesets.
///
/// Implementations return records **descending by version** (most recent
/// first). When `include_details` is false, `affected_paths` may be empty in
/// the returned records.
pub trait ChangesetHistoryProvider {
    fn query(
        &self,
        project_path: &str,
        from: VersionSpec,
        to: VersionSpec,
        include_details: bool,
        max_count: usize,
    ) -> Result<Vec<ChangesetRecord>, HistoryError>;
}
