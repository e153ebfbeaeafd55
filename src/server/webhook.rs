//! Service-hook notification endpoint.
//!
//! Accepts notification payloads from the version-control server, decodes
//! them into typed events, and runs the trigger correlation synchronously.
//! The response lists what was decided per matched job, so the server's hook
//! log shows exactly what each notification caused.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use super::AppState;
use crate::correlate::SystemListingContext;
use crate::events::{decode_service_hook, CanonicalPushEvent, DecodeError, ServiceHookEvent};

/// Errors that can occur when processing a notification.
///
/// Decode failures are client errors; the request is rejected before any job
/// is evaluated. Per-job scheduling failures do NOT surface here: the
/// correlator isolates them and reports them as skips in the response body.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("malformed notification: {0}")]
    Decode(#[from] DecodeError),
}

impl IntoResponse for HookError {
    fn into_response(self) -> Response {
        let status = match &self {
            HookError::Decode(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Response body for push and pull-request-merge notifications.
#[derive(Debug, Serialize)]
struct HookResponse {
    results: Vec<crate::correlate::JobTriggerResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Notification handler.
///
/// # Request
///
/// - Method: POST
/// - Body: service-hook JSON with an `eventType` discriminator
///
/// # Response
///
/// - 200 OK: event processed; body lists per-job trigger outcomes
/// - 400 Bad Request: malformed payload or unrecognized event type
pub async fn hook_handler(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Response, HookError> {
    let event = decode_service_hook(&body)?;

    match event {
        ServiceHookEvent::Ping => {
            debug!("ping received");
            Ok(Json(serde_json::json!({ "status": "ok" })).into_response())
        }
        ServiceHookEvent::Connect => {
            debug!("connect handshake received");
            // Static metadata only; the handshake changes no state.
            Ok(Json(serde_json::json!({
                "server": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            }))
            .into_response())
        }
        ServiceHookEvent::Push(push) => {
            // Plain pushes go through each job's own polling cycle where the
            // global trigger applies; enabled hook triggers still build
            // directly.
            correlate_and_respond(&app_state, push, false).await
        }
        ServiceHookEvent::PullRequestMerged(merge) => {
            // The merge commit is already the thing to build; skip polling.
            correlate_and_respond(&app_state, merge, true).await
        }
    }
}

async fn correlate_and_respond(
    app_state: &AppState,
    event: CanonicalPushEvent,
    bypass_polling: bool,
) -> Result<Response, HookError> {
    if event.commit.is_none() {
        info!(repo = %event.repo_uri, "notification carries no commit; nothing to trigger");
        return Ok(Json(HookResponse {
            results: Vec::new(),
            message: Some("no commit in notification; nothing to trigger".to_string()),
        })
        .into_response());
    }

    let results = app_state
        .engine()
        .correlate(
            &event,
            bypass_polling,
            &[],
            app_state.settings(),
            &SystemListingContext::elevated(),
        )
        .await;

    info!(
        repo = %event.repo_uri,
        branch = %event.target_branch,
        matched = results.len(),
        "notification processed"
    );
    Ok(Json(HookResponse {
        results,
        message: None,
    })
    .into_response())
}
