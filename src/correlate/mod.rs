//! Event-to-job correlation and trigger decisions.
//!
//! Given a canonical push event, this module matches it against every
//! configured job's repository references and decides, per matched job,
//! whether to schedule a build immediately, schedule a poll, skip, or cancel
//! a superseded in-flight pull-request build first.

pub mod engine;
pub mod uri;

pub use engine::{
    BranchSourceIndex, BuildCause, BuildParameter, HookTriggerState, Job, JobDirectory,
    JobQueue, JobTriggerResult, MultibranchRef, QueueError, SystemListingContext,
    TriggerDecisionEngine, TriggerOutcome, TriggerSettings,
};
pub use uri::same_git_repo;
