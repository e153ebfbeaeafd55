//! Service-hook payload decoder.
//!
//! Raw notification JSON carries an `eventType` discriminator and a
//! `resource` body. The decoder validates both, then normalizes the
//! recognized event kinds into [`ServiceHookEvent`] values. Decoding happens
//! exactly once per request; downstream code matches on the closed enum
//! rather than re-inspecting strings.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{CommitId, PullRequestId};

use super::types::{CanonicalPushEvent, ServiceHookEvent};

/// Error type for notification decoding failures.
///
/// All variants are client errors: the request is rejected before any job is
/// evaluated or any state changes.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload has no `eventType` discriminator.
    #[error("payload has no eventType")]
    MissingEventType,

    /// The payload names an event kind this endpoint does not recognize.
    #[error("unrecognized eventType: {0}")]
    UnknownEventType(String),

    /// The payload has no `resource` body.
    #[error("payload has no resource")]
    MissingResource,

    /// A field required for this event kind is absent or empty.
    #[error("payload is missing {0}")]
    MissingField(&'static str),
}

/// Decodes a raw service-hook payload into a typed event.
///
/// Recognized `eventType` values:
///
/// * `"ping"` — connectivity probe
/// * `"connect"` — out-of-band connect handshake
/// * `"git.push"` — commits pushed to a git repository
/// * `"git.pullrequest.merged"` — pull request merged
///
/// Anything else fails with [`DecodeError::UnknownEventType`]. `git.*` events
/// additionally require a `resource` body.
pub fn decode_service_hook(payload: &[u8]) -> Result<ServiceHookEvent, DecodeError> {
    let envelope: RawEnvelope = serde_json::from_slice(payload)?;

    let event_type = envelope.event_type.ok_or(DecodeError::MissingEventType)?;
    match event_type.as_str() {
        "ping" => Ok(ServiceHookEvent::Ping),
        "connect" => Ok(ServiceHookEvent::Connect),
        "git.push" => {
            let resource = envelope.resource.ok_or(DecodeError::MissingResource)?;
            decode_push(resource, envelope.resource_containers).map(ServiceHookEvent::Push)
        }
        "git.pullrequest.merged" => {
            let resource = envelope.resource.ok_or(DecodeError::MissingResource)?;
            decode_pull_request_merge(resource, envelope.resource_containers)
                .map(ServiceHookEvent::PullRequestMerged)
        }
        other => Err(DecodeError::UnknownEventType(other.to_string())),
    }
}

// ============================================================================
// Raw payload structures for deserialization
//
// These match the server's service-hook JSON structure. Option<T> is used
// liberally so missing fields surface as targeted errors rather than opaque
// deserialization failures.
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "eventType")]
    event_type: Option<String>,
    resource: Option<serde_json::Value>,
    #[serde(rename = "resourceContainers")]
    resource_containers: Option<RawResourceContainers>,
}

#[derive(Debug, Deserialize)]
struct RawResourceContainers {
    collection: Option<RawContainer>,
}

#[derive(Debug, Deserialize)]
struct RawContainer {
    #[serde(rename = "baseUrl")]
    base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    id: Option<String>,
    /// REST API URL of the repository (contains the `_apis/` segment).
    url: Option<String>,
    #[serde(rename = "remoteUrl")]
    remote_url: Option<String>,
    project: Option<RawProject>,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIdentity {
    #[serde(rename = "displayName")]
    display_name: Option<String>,
}

// ─── git.push ───

#[derive(Debug, Deserialize)]
struct RawPushResource {
    repository: Option<RawRepository>,
    commits: Option<Vec<RawCommit>>,
    #[serde(rename = "refUpdates")]
    ref_updates: Option<Vec<RawRefUpdate>>,
    #[serde(rename = "pushedBy")]
    pushed_by: Option<RawIdentity>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    #[serde(rename = "commitId")]
    commit_id: String,
}

#[derive(Debug, Deserialize)]
struct RawRefUpdate {
    name: Option<String>,
}

fn decode_push(
    resource: serde_json::Value,
    containers: Option<RawResourceContainers>,
) -> Result<CanonicalPushEvent, DecodeError> {
    let raw: RawPushResource = serde_json::from_value(resource)?;
    let repository = raw.repository.ok_or(DecodeError::MissingField("repository"))?;

    // The first commit in the push is the tip: the server lists newest first.
    let commit = raw
        .commits
        .unwrap_or_default()
        .into_iter()
        .next()
        .map(|c| CommitId::new(c.commit_id));

    let ref_name = raw
        .ref_updates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|r| r.name)
        .ok_or(DecodeError::MissingField("refUpdates"))?;

    Ok(CanonicalPushEvent {
        collection_uri: collection_uri(&containers, &repository)?,
        repo_uri: repository
            .remote_url
            .ok_or(DecodeError::MissingField("repository.remoteUrl"))?,
        project_id: repository
            .project
            .and_then(|p| p.name)
            .ok_or(DecodeError::MissingField("repository.project.name"))?,
        repo_id: repository.id.unwrap_or_default(),
        commit,
        pushed_by: raw
            .pushed_by
            .and_then(|i| i.display_name)
            .unwrap_or_default(),
        target_branch: branch_from_ref(&ref_name),
        pull_request: None,
    })
}

// ─── git.pullrequest.merged ───

#[derive(Debug, Deserialize)]
struct RawPullRequestResource {
    repository: Option<RawRepository>,
    #[serde(rename = "pullRequestId")]
    pull_request_id: Option<u64>,
    #[serde(rename = "lastMergeCommit")]
    last_merge_commit: Option<RawCommit>,
    #[serde(rename = "targetRefName")]
    target_ref_name: Option<String>,
    #[serde(rename = "createdBy")]
    created_by: Option<RawIdentity>,
}

fn decode_pull_request_merge(
    resource: serde_json::Value,
    containers: Option<RawResourceContainers>,
) -> Result<CanonicalPushEvent, DecodeError> {
    let raw: RawPullRequestResource = serde_json::from_value(resource)?;
    let repository = raw.repository.ok_or(DecodeError::MissingField("repository"))?;

    let target_ref = raw
        .target_ref_name
        .ok_or(DecodeError::MissingField("targetRefName"))?;

    Ok(CanonicalPushEvent {
        collection_uri: collection_uri(&containers, &repository)?,
        repo_uri: repository
            .remote_url
            .ok_or(DecodeError::MissingField("repository.remoteUrl"))?,
        project_id: repository
            .project
            .and_then(|p| p.name)
            .ok_or(DecodeError::MissingField("repository.project.name"))?,
        repo_id: repository.id.unwrap_or_default(),
        // The merge commit, not the source-branch tip: the build verifies the
        // merged result.
        commit: raw.last_merge_commit.map(|c| CommitId::new(c.commit_id)),
        pushed_by: raw
            .created_by
            .and_then(|i| i.display_name)
            .unwrap_or_default(),
        target_branch: branch_from_ref(&target_ref),
        pull_request: raw.pull_request_id.map(PullRequestId),
    })
}

// ─── Field derivation helpers ───

/// Resolves the collection base URL for an event.
///
/// An explicit `resourceContainers.collection.baseUrl` takes precedence; older
/// servers omit it, in which case the URL is derived by truncating the
/// repository's REST API URL at its `_apis/` segment.
fn collection_uri(
    containers: &Option<RawResourceContainers>,
    repository: &RawRepository,
) -> Result<String, DecodeError> {
    if let Some(base_url) = containers
        .as_ref()
        .and_then(|c| c.collection.as_ref())
        .and_then(|c| c.base_url.as_ref())
    {
        return Ok(base_url.clone());
    }
    repository
        .url
        .as_deref()
        .and_then(truncate_at_apis)
        .ok_or(DecodeError::MissingField("resourceContainers.collection.baseUrl"))
}

/// Truncates an API URL's path at the `_apis/` segment, preserving
/// scheme/host and any query or fragment.
fn truncate_at_apis(url: &str) -> Option<String> {
    let (before_fragment, fragment) = match url.split_once('#') {
        Some((b, f)) => (b, Some(f)),
        None => (url, None),
    };
    let (before_query, query) = match before_fragment.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (before_fragment, None),
    };

    let apis = before_query.find("_apis/")?;
    let mut result = before_query[..apis].trim_end_matches('/').to_string();
    if let Some(q) = query {
        result.push('?');
        result.push_str(q);
    }
    if let Some(f) = fragment {
        result.push('#');
        result.push_str(f);
    }
    Some(result)
}

/// Extracts the short branch name from a ref, e.g.
/// `refs/heads/topic` becomes `topic`.
fn branch_from_ref(ref_name: &str) -> String {
    ref_name
        .rsplit('/')
        .next()
        .unwrap_or(ref_name)
        .to_string()
}
