//! Direct build-trigger endpoint.
//!
//! Schedules a build of a named job without any event correlation, carrying
//! caller-supplied parameters. Used by the version-control server's build
//! integration when it already knows which job to run.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::AppState;
use crate::correlate::{BuildCause, BuildParameter, SystemListingContext};
use crate::types::{JobName, QueueTicket};

/// Errors that can occur when triggering a build directly.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("no such job: {0}")]
    UnknownJob(JobName),

    #[error("failed to queue build: {0}")]
    Queue(#[from] crate::correlate::QueueError),
}

impl IntoResponse for BuildError {
    fn into_response(self) -> Response {
        let status = match &self {
            BuildError::UnknownJob(_) => StatusCode::NOT_FOUND,
            BuildError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Request body for the build-trigger endpoint.
#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    pub job: JobName,

    /// Display name recorded as the build cause.
    #[serde(default)]
    pub requested_by: Option<String>,

    /// Parameters attached to the scheduled build.
    #[serde(default)]
    pub parameters: Vec<BuildParameter>,
}

#[derive(Debug, Serialize)]
struct BuildResponse {
    queued: QueueTicket,
}

/// Build-trigger handler.
///
/// # Response
///
/// - 200 OK: build queued; body carries the queue ticket
/// - 404 Not Found: no job with the requested name
/// - 500 Internal Server Error: the queue refused the build
pub async fn build_handler(
    State(app_state): State<AppState>,
    Json(request): Json<BuildRequest>,
) -> Result<Response, BuildError> {
    let ctx = SystemListingContext::elevated();
    let known = app_state
        .directory()
        .jobs(&ctx)
        .iter()
        .any(|job| job.name == request.job);
    if !known {
        warn!(job = %request.job, "build requested for unknown job");
        return Err(BuildError::UnknownJob(request.job));
    }

    let cause = BuildCause::Manual {
        requested_by: request.requested_by.unwrap_or_else(|| "anonymous".to_string()),
    };
    let ticket = app_state.queue().schedule(
        &request.job,
        cause,
        &request.parameters,
        app_state.settings().quiet_period,
    )?;

    info!(job = %request.job, ticket = %ticket, "build queued via direct trigger");
    Ok(Json(BuildResponse { queued: ticket }).into_response())
}
