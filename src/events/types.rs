//! Typed representations of service-hook notifications.

use serde::{Deserialize, Serialize};

use crate::types::{CommitId, PullRequestId};

/// A decoded service-hook notification.
///
/// This enum is closed: recognized event kinds are decoded once by
/// [`super::decode_service_hook`] and handled exhaustively downstream. An
/// unrecognized event name is a client error, not a silently ignored case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceHookEvent {
    /// Connectivity probe. No state change.
    Ping,

    /// Out-of-band connect handshake from the server's hook configuration UI.
    Connect,

    /// Commits were pushed to a git repository.
    Push(CanonicalPushEvent),

    /// A pull request was merged into its target branch.
    ///
    /// Carries the merge commit, not the source-branch tip; builds made from
    /// it verify the merged result.
    PullRequestMerged(CanonicalPushEvent),
}

/// The normalized, backend-agnostic representation of a push or
/// pull-request-merge notification.
///
/// Built once per inbound notification, consumed by the correlator, then
/// discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalPushEvent {
    /// Base URL of the project collection containing the repository.
    pub collection_uri: String,

    /// Remote URL of the repository, as clients would clone it.
    pub repo_uri: String,

    /// Name of the team project the repository belongs to.
    pub project_id: String,

    /// Server-assigned repository ID.
    pub repo_id: String,

    /// The commit to build.
    ///
    /// `None` when the push carried no commits (e.g. a ref deletion); the
    /// correlator skips processing in that case.
    pub commit: Option<CommitId>,

    /// Display name of whoever pushed or merged.
    pub pushed_by: String,

    /// The branch the push or merge landed on (short name, no `refs/heads/`).
    pub target_branch: String,

    /// Set when the event is a pull-request merge.
    pub pull_request: Option<PullRequestId>,
}
