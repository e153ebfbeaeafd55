//! The trigger decision engine.
//!
//! Takes one canonical push event and walks every configured job, deciding
//! per job whether to schedule a build immediately, schedule a poll, skip, or
//! first cancel a superseded in-flight pull-request build. Scheduling itself
//! is fire-and-forget against the external job queue; the queue's admission
//! and quiet-period handling is its own concern.
//!
//! # Privilege boundary
//!
//! Jobs are listed under an explicit [`SystemListingContext`] capability so
//! that jobs invisible to the inbound caller's identity are still matched.
//! The only effect of a match is scheduling a build, never disclosing data,
//! which is why the elevated listing is acceptable; keeping the capability an
//! explicit parameter keeps that boundary visible and testable.
//!
//! # Failure isolation
//!
//! One job failing to evaluate must not prevent the remaining jobs from being
//! evaluated; failures are logged and recorded as a skip for that job.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::CanonicalPushEvent;
use crate::types::{BuildRef, CommitId, JobName, PullRequestId, QueueTicket};

use super::uri::same_git_repo;

/// Snapshot of trigger-related host configuration.
///
/// Taken once per request and passed in explicitly; the engine never consults
/// ambient global state mid-algorithm.
#[derive(Debug, Clone)]
pub struct TriggerSettings {
    /// Fire the push trigger for every matched job, even ones without an
    /// explicit post-commit-hook trigger (unless the job opted out).
    pub trigger_all_jobs_on_push: bool,

    /// How long to wait after requesting branch re-indexing before resolving
    /// the branch job, giving the host time to materialize a job for a new
    /// branch. A heuristic, not a guarantee; tests use `Duration::ZERO`.
    pub branch_materialization_grace: Duration,

    /// Quiet period to attach to directly scheduled builds.
    pub quiet_period: Duration,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        TriggerSettings {
            trigger_all_jobs_on_push: false,
            branch_materialization_grace: Duration::from_secs(4),
            quiet_period: Duration::ZERO,
        }
    }
}

/// Capability token for listing all jobs regardless of the caller's identity.
///
/// Constructing one asserts that the caller runs in a context where the
/// system-level listing is appropriate (the notification endpoint, acting on
/// the server's behalf).
#[derive(Debug, Clone, Copy)]
pub struct SystemListingContext {
    _priv: (),
}

impl SystemListingContext {
    pub fn elevated() -> Self {
        SystemListingContext { _priv: () }
    }
}

/// State of a job's explicit post-commit-hook trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookTriggerState {
    /// Configured and enabled: notifications schedule builds directly.
    Enabled,

    /// Configured but disabled by the job owner.
    Disabled,

    /// The job has no post-commit-hook trigger at all.
    NotConfigured,
}

/// Membership of a branch job in a multi-branch container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultibranchRef {
    /// The container job that indexes branches.
    pub container: JobName,

    /// The branch this job builds.
    pub branch: String,

    /// Remote URL of the container's branch-discovery source.
    pub source_repo_uri: String,
}

/// A configured job as seen by the correlator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub name: JobName,

    /// Remote URLs of the repositories the job builds from.
    ///
    /// Empty when the job cannot declare its sources up front (e.g. a
    /// pipeline whose definition lives in the repository itself); such jobs
    /// cannot be pre-filtered and are always offered the event.
    #[serde(default)]
    pub repositories: Vec<String>,

    #[serde(default = "HookTriggerState::not_configured")]
    pub hook_trigger: HookTriggerState,

    /// The job explicitly opted out of post-commit hooks; the global
    /// trigger-all setting does not apply to it.
    #[serde(default)]
    pub opted_out_of_hooks: bool,

    /// Set when the job is a branch of a multi-branch container.
    #[serde(default)]
    pub multibranch: Option<MultibranchRef>,
}

impl HookTriggerState {
    fn not_configured() -> Self {
        HookTriggerState::NotConfigured
    }
}

/// Why a build was scheduled; recorded on the queued build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildCause {
    /// A push or pull-request merge notification.
    Push {
        commit: CommitId,
        pushed_by: String,
    },

    /// A direct request through the build-trigger endpoint.
    Manual { requested_by: String },
}

/// A name/value parameter attached to a scheduled build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildParameter {
    pub name: String,
    pub value: String,
}

impl BuildParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        BuildParameter {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Errors from the job-queue collaborator.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("failed to schedule {job}: {reason}")]
    ScheduleFailed { job: JobName, reason: String },

    #[error("failed to cancel {build}: {reason}")]
    CancelFailed { build: BuildRef, reason: String },

    #[error("branch indexing failed for {container}: {reason}")]
    IndexingFailed { container: JobName, reason: String },
}

/// Lists all configured jobs.
///
/// The listing runs under the given capability so jobs hidden from the
/// inbound caller are still returned.
pub trait JobDirectory {
    fn jobs(&self, ctx: &SystemListingContext) -> Vec<Job>;
}

/// The CI host's build queue and executors.
///
/// Must be safe under concurrent callers; this engine only reads job
/// definitions and mutates nothing except through these calls.
pub trait JobQueue {
    /// Schedules a build. Fire-and-forget: admission control and quiet-period
    /// collapsing are the queue's concern.
    fn schedule(
        &self,
        job: &JobName,
        cause: BuildCause,
        extra_actions: &[BuildParameter],
        quiet_period: Duration,
    ) -> Result<QueueTicket, QueueError>;

    /// Asks the job to run its own polling cycle instead of building
    /// directly.
    fn schedule_polling(&self, job: &JobName) -> Result<(), QueueError>;

    /// Builds currently executing for `job`, with the pull request each was
    /// triggered for where known.
    fn in_progress_builds(&self, job: &JobName) -> Vec<BuildRef>;

    /// Stops a running build's executor and cancels its queue entry.
    ///
    /// Racing against completion is expected: if the build has already left
    /// the in-progress state this must succeed as a no-op, not error.
    fn stop_build(&self, build: &BuildRef) -> Result<(), QueueError>;
}

/// The multi-branch container's branch-discovery index.
pub trait BranchSourceIndex {
    /// Requests a re-index of the container's branch source, so a job for a
    /// newly pushed branch gets materialized.
    fn request_reindex(&self, container: &JobName) -> Result<(), QueueError>;

    /// Resolves the job for `branch` under `container`, if it exists yet.
    fn resolve_branch_job(&self, container: &JobName, branch: &str) -> Option<JobName>;
}

/// The action taken (or not) for one matched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A build was scheduled directly.
    Scheduled,

    /// The job was asked to poll; a build follows only if polling finds
    /// significant changes.
    PollingScheduled,

    /// Nothing was scheduled.
    Skipped { reason: String },

    /// A superseded in-flight build for the same pull request was stopped
    /// and its queue entry canceled.
    Canceled { build: BuildRef },
}

impl std::fmt::Display for TriggerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerOutcome::Scheduled => write!(f, "scheduled"),
            TriggerOutcome::PollingScheduled => write!(f, "polling scheduled"),
            TriggerOutcome::Skipped { reason } => write!(f, "skipped: {}", reason),
            TriggerOutcome::Canceled { build } => write!(f, "canceled superseded build {}", build),
        }
    }
}

/// One entry of the correlation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTriggerResult {
    pub job: JobName,
    #[serde(flatten)]
    pub outcome: TriggerOutcome,
}

/// Matches canonical push events against configured jobs and decides trigger
/// actions.
pub struct TriggerDecisionEngine {
    directory: Arc<dyn JobDirectory + Send + Sync>,
    queue: Arc<dyn JobQueue + Send + Sync>,
    branch_index: Arc<dyn BranchSourceIndex + Send + Sync>,
}

impl TriggerDecisionEngine {
    pub fn new(
        directory: Arc<dyn JobDirectory + Send + Sync>,
        queue: Arc<dyn JobQueue + Send + Sync>,
        branch_index: Arc<dyn BranchSourceIndex + Send + Sync>,
    ) -> Self {
        TriggerDecisionEngine {
            directory,
            queue,
            branch_index,
        }
    }

    /// Correlates one event against all configured jobs.
    ///
    /// `bypass_polling` is true for pull-request-merge events (the merge
    /// commit is already known good to build) and false for plain pushes.
    /// An event with no commit triggers nothing and returns no results; the
    /// caller reports the skip.
    ///
    /// A job that matches the event may contribute several results: a
    /// `Canceled` entry per superseded pull-request build, then the outcome
    /// of the scheduling itself. Jobs that do not match contribute nothing.
    pub async fn correlate(
        &self,
        event: &CanonicalPushEvent,
        bypass_polling: bool,
        extra_actions: &[BuildParameter],
        settings: &TriggerSettings,
        ctx: &SystemListingContext,
    ) -> Vec<JobTriggerResult> {
        let Some(commit) = &event.commit else {
            debug!(repo = %event.repo_uri, "event carries no commit; nothing to trigger");
            return Vec::new();
        };

        let mut results = Vec::new();
        for job in self.directory.jobs(ctx) {
            if !self.matches(&job, event) {
                continue;
            }
            debug!(job = %job.name, repo = %event.repo_uri, "job matches event repository");

            match self
                .evaluate_job(&job, event, commit, bypass_polling, extra_actions, settings)
                .await
            {
                Ok(outcomes) => {
                    results.extend(outcomes.into_iter().map(|outcome| JobTriggerResult {
                        job: job.name.clone(),
                        outcome,
                    }));
                }
                Err(e) => {
                    // Isolate the failure: the remaining jobs still get
                    // evaluated.
                    warn!(job = %job.name, error = %e, "job evaluation failed");
                    results.push(JobTriggerResult {
                        job: job.name.clone(),
                        outcome: TriggerOutcome::Skipped {
                            reason: format!("evaluation failed: {}", e),
                        },
                    });
                }
            }
        }
        results
    }

    /// Whether the event's repository is relevant to this job.
    ///
    /// A job with no declared sources cannot be pre-filtered and always
    /// matches; otherwise at least one configured repository (or the
    /// multi-branch discovery source) must name the event's repository.
    fn matches(&self, job: &Job, event: &CanonicalPushEvent) -> bool {
        if job.repositories.is_empty() && job.multibranch.is_none() {
            return true;
        }
        if job
            .repositories
            .iter()
            .any(|repo| same_git_repo(repo, &event.repo_uri))
        {
            return true;
        }
        job.multibranch
            .as_ref()
            .is_some_and(|mb| same_git_repo(&mb.source_repo_uri, &event.repo_uri))
    }

    async fn evaluate_job(
        &self,
        job: &Job,
        event: &CanonicalPushEvent,
        commit: &CommitId,
        bypass_polling: bool,
        extra_actions: &[BuildParameter],
        settings: &TriggerSettings,
    ) -> Result<Vec<TriggerOutcome>, QueueError> {
        let cause = BuildCause::Push {
            commit: commit.clone(),
            pushed_by: event.pushed_by.clone(),
        };
        let mut outcomes = Vec::new();

        if settings.trigger_all_jobs_on_push && !job.opted_out_of_hooks {
            if bypass_polling {
                self.cancel_superseded(&job.name, event.pull_request, &mut outcomes)?;
                self.queue
                    .schedule(&job.name, cause, extra_actions, settings.quiet_period)?;
                info!(job = %job.name, commit = %commit.short(), "scheduled via global push trigger");
                outcomes.push(TriggerOutcome::Scheduled);
            } else {
                self.queue.schedule_polling(&job.name)?;
                info!(job = %job.name, "polling scheduled via global push trigger");
                outcomes.push(TriggerOutcome::PollingScheduled);
            }
            return Ok(outcomes);
        }

        if job.hook_trigger == HookTriggerState::Enabled {
            self.cancel_superseded(&job.name, event.pull_request, &mut outcomes)?;
            self.queue
                .schedule(&job.name, cause, extra_actions, settings.quiet_period)?;
            info!(job = %job.name, commit = %commit.short(), "scheduled via post-commit hook trigger");
            outcomes.push(TriggerOutcome::Scheduled);
            return Ok(outcomes);
        }

        if let Some(mb) = &job.multibranch {
            if same_git_repo(&mb.source_repo_uri, &event.repo_uri) {
                return self
                    .trigger_branch_job(job, mb, event, cause, extra_actions, settings, &mut outcomes)
                    .await
                    .map(|()| outcomes);
            }
        }

        outcomes.push(TriggerOutcome::Skipped {
            reason: "no applicable trigger".to_string(),
        });
        Ok(outcomes)
    }

    /// The multi-branch path: re-index the branch source, give the host a
    /// grace period to materialize a job for a new branch, then schedule the
    /// resolved branch job directly.
    ///
    /// The fixed grace period is a race workaround, not a guarantee; a branch
    /// pushed and immediately deleted, or a slow indexing run, can still lose
    /// the race, in which case the outcome is a skip.
    #[allow(clippy::too_many_arguments)]
    async fn trigger_branch_job(
        &self,
        job: &Job,
        mb: &MultibranchRef,
        event: &CanonicalPushEvent,
        cause: BuildCause,
        extra_actions: &[BuildParameter],
        settings: &TriggerSettings,
        outcomes: &mut Vec<TriggerOutcome>,
    ) -> Result<(), QueueError> {
        self.branch_index.request_reindex(&mb.container)?;
        tokio::time::sleep(settings.branch_materialization_grace).await;

        match self
            .branch_index
            .resolve_branch_job(&mb.container, &event.target_branch)
        {
            Some(branch_job) => {
                self.cancel_superseded(&branch_job, event.pull_request, outcomes)?;
                self.queue
                    .schedule(&branch_job, cause, extra_actions, settings.quiet_period)?;
                info!(
                    job = %branch_job,
                    container = %mb.container,
                    branch = %event.target_branch,
                    "scheduled branch job after re-index"
                );
                outcomes.push(TriggerOutcome::Scheduled);
            }
            None => {
                warn!(
                    job = %job.name,
                    container = %mb.container,
                    branch = %event.target_branch,
                    "branch job not materialized after re-index grace period"
                );
                outcomes.push(TriggerOutcome::Skipped {
                    reason: format!(
                        "no job for branch {} after re-indexing {}",
                        event.target_branch, mb.container
                    ),
                });
            }
        }
        Ok(())
    }

    /// Pull-request de-duplication: stop and cancel any in-flight build of
    /// `job` for the same pull request before a new one is scheduled.
    ///
    /// Afterward at most one in-flight build per (job, pull request) exists.
    /// Losing the race against a build that finishes between the scan and
    /// the stop is fine; the queue treats that stop as a no-op.
    fn cancel_superseded(
        &self,
        job: &JobName,
        pull_request: Option<PullRequestId>,
        outcomes: &mut Vec<TriggerOutcome>,
    ) -> Result<(), QueueError> {
        let Some(pr) = pull_request else {
            return Ok(());
        };
        for build in self.queue.in_progress_builds(job) {
            if build.pull_request == Some(pr) {
                info!(job = %job, build = %build, pull_request = %pr, "canceling superseded build");
                self.queue.stop_build(&build)?;
                outcomes.push(TriggerOutcome::Canceled { build });
            }
        }
        Ok(())
    }
}
