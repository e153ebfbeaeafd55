use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buildhook::correlate::{
    BranchSourceIndex, BuildCause, BuildParameter, Job, JobDirectory, JobQueue, QueueError,
    SystemListingContext, TriggerSettings,
};
use buildhook::server::{build_router, AppState};
use buildhook::types::{BuildRef, JobName, QueueTicket};

/// Job directory backed by a JSON registry file.
///
/// Loaded once at startup; the file is a JSON array of job definitions.
struct RegistryDirectory {
    jobs: Vec<Job>,
}

impl RegistryDirectory {
    fn load(path: &str) -> Self {
        let jobs = match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(jobs) => jobs,
                Err(e) => {
                    tracing::warn!(path, error = %e, "job registry is malformed; starting empty");
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!(path, error = %e, "job registry not readable; starting empty");
                Vec::new()
            }
        };
        RegistryDirectory { jobs }
    }
}

impl JobDirectory for RegistryDirectory {
    fn jobs(&self, _ctx: &SystemListingContext) -> Vec<Job> {
        self.jobs.clone()
    }
}

/// Development queue: logs scheduling decisions and hands out tickets without
/// talking to a real CI host.
struct LoggingQueue {
    next_ticket: AtomicU64,
}

impl JobQueue for LoggingQueue {
    fn schedule(
        &self,
        job: &JobName,
        cause: BuildCause,
        extra_actions: &[BuildParameter],
        quiet_period: Duration,
    ) -> Result<QueueTicket, QueueError> {
        let ticket = QueueTicket(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        tracing::info!(
            job = %job,
            ?cause,
            parameters = extra_actions.len(),
            quiet_period_secs = quiet_period.as_secs(),
            ticket = %ticket,
            "schedule"
        );
        Ok(ticket)
    }

    fn schedule_polling(&self, job: &JobName) -> Result<(), QueueError> {
        tracing::info!(job = %job, "schedule polling");
        Ok(())
    }

    fn in_progress_builds(&self, _job: &JobName) -> Vec<BuildRef> {
        Vec::new()
    }

    fn stop_build(&self, build: &BuildRef) -> Result<(), QueueError> {
        tracing::info!(build = %build, "stop build");
        Ok(())
    }
}

/// Development branch index: re-index requests are acknowledged but no branch
/// jobs ever materialize.
struct NoBranchIndex;

impl BranchSourceIndex for NoBranchIndex {
    fn request_reindex(&self, container: &JobName) -> Result<(), QueueError> {
        tracing::info!(container = %container, "re-index requested");
        Ok(())
    }

    fn resolve_branch_job(&self, _container: &JobName, _branch: &str) -> Option<JobName> {
        None
    }
}


#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "buildhook=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry_path =
        std::env::var("BUILDHOOK_JOBS").unwrap_or_else(|_| "jobs.json".to_string());
    let directory = Arc::new(RegistryDirectory::load(&registry_path));
    tracing::info!(path = %registry_path, jobs = directory.jobs.len(), "job registry loaded");

    let settings = TriggerSettings {
        trigger_all_jobs_on_push: std::env::var("BUILDHOOK_TRIGGER_ALL")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
        ..TriggerSettings::default()
    };

    let app_state = AppState::new(
        directory,
        Arc::new(LoggingQueue {
            next_ticket: AtomicU64::new(1),
        }),
        Arc::new(NoBranchIndex),
        settings,
    );
    let app = build_router(app_state);

    let addr: SocketAddr = std::env::var("BUILDHOOK_ADDR")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .unwrap();
}
