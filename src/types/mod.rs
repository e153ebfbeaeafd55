//! Core domain types shared across the crate.

pub mod changeset;
pub mod ids;

pub use changeset::{AffectedPath, ChangesetRecord, PathAction, RevisionBaseline};
pub use ids::{
    BuildRef, ChangesetVersion, CommitId, JobName, NodeName, PullRequestId, QueueTicket,
};
