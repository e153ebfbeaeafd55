//! HTTP server for the build-trigger bridge.
//!
//! This module implements the HTTP server that:
//! - Accepts service-hook notifications from the version-control server and
//!   runs trigger correlation against the configured jobs
//! - Accepts direct build-trigger requests
//! - Provides health checks for liveness probes
//!
//! # Endpoints
//!
//! - `POST /hook` - Accepts service-hook notifications (ping, connect,
//!   git.push, git.pullrequest.merged)
//! - `POST /build` - Schedules a build of a named job with parameters
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod build;
pub mod health;
pub mod webhook;

pub use build::build_handler;
pub use health::health_handler;
pub use webhook::hook_handler;

use crate::correlate::{
    BranchSourceIndex, JobDirectory, JobQueue, TriggerDecisionEngine, TriggerSettings,
};

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. It holds the
/// correlation engine, the collaborators the direct-trigger endpoint needs,
/// and the trigger settings snapshot used for every request.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: TriggerDecisionEngine,
    directory: Arc<dyn JobDirectory + Send + Sync>,
    queue: Arc<dyn JobQueue + Send + Sync>,
    settings: TriggerSettings,
}

impl AppState {
    /// Creates a new `AppState` wired to the given collaborators.
    pub fn new(
        directory: Arc<dyn JobDirectory + Send + Sync>,
        queue: Arc<dyn JobQueue + Send + Sync>,
        branch_index: Arc<dyn BranchSourceIndex + Send + Sync>,
        settings: TriggerSettings,
    ) -> Self {
        let engine = TriggerDecisionEngine::new(directory.clone(), queue.clone(), branch_index);
        AppState {
            inner: Arc::new(AppStateInner {
                engine,
                directory,
                queue,
                settings,
            }),
        }
    }

    /// Returns the trigger correlation engine.
    pub fn engine(&self) -> &TriggerDecisionEngine {
        &self.inner.engine
    }

    /// Returns the job directory.
    pub fn directory(&self) -> &Arc<dyn JobDirectory + Send + Sync> {
        &self.inner.directory
    }

    /// Returns the job queue.
    pub fn queue(&self) -> &Arc<dyn JobQueue + Send + Sync> {
        &self.inner.queue
    }

    /// Returns the trigger settings snapshot.
    pub fn settings(&self) -> &TriggerSettings {
        &self.inner.settings
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/hook", post(hook_handler))
        .route("/build", post(build_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
