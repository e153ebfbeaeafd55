//! Changeset records and revision baselines.
//!
//! A changeset is an atomic, numbered set of file changes committed to the
//! version-control server. A revision baseline records the changeset a
//! completed build started from; the next polling cycle compares against it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ChangesetVersion;

/// The action performed on a path within a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathAction {
    Add,
    Edit,
    Delete,
    Rename,
    Branch,
    Merge,
}

/// A single path affected by a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedPath {
    /// Server path, e.g. `$/Project/src/main.c`.
    pub path: String,

    /// What happened to the path.
    pub action: PathAction,
}

impl AffectedPath {
    pub fn new(path: impl Into<String>, action: PathAction) -> Self {
        AffectedPath {
            path: path.into(),
            action,
        }
    }
}

/// An atomic, numbered set of file changes retrieved from the server.
///
/// Immutable once retrieved; produced per history query and discarded after
/// the comparison that requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetRecord {
    /// Server-assigned version. Strictly increasing across the collection.
    pub version: ChangesetVersion,

    /// When the changeset was committed.
    pub timestamp: DateTime<Utc>,

    /// Display name of the committer.
    pub author: String,

    /// Check-in comment.
    pub comment: String,

    /// Paths affected by this changeset, in server order.
    ///
    /// Empty when the history query was made without file details.
    pub affected_paths: Vec<AffectedPath>,
}

/// The last changeset version a job was known to have built.
///
/// Attached to a completed build as its recorded starting point; created once
/// per build and never mutated. A later build supersedes it with a new
/// baseline rather than editing this one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionBaseline {
    /// The changeset version the build was made from.
    pub changeset_version: ChangesetVersion,

    /// The server project path the build was made from, e.g. `$/Project`.
    ///
    /// If the job's configured path has since changed, the baseline is
    /// incomparable and polling must fall back to an unconditional build.
    pub project_path: String,
}

impl RevisionBaseline {
    pub fn new(changeset_version: ChangesetVersion, project_path: impl Into<String>) -> Self {
        RevisionBaseline {
            changeset_version,
            project_path: project_path.into(),
        }
    }

    /// Whether this baseline can be compared against the given project path.
    ///
    /// Server paths are case-insensitive.
    pub fn is_comparable_to(&self, project_path: &str) -> bool {
        self.project_path.eq_ignore_ascii_case(project_path)
    }
}
