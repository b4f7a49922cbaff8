//! Engine facade — the exposed operations, wired by dependency injection.
//!
//! No entry point blocks its caller: deployment and dry run return the task
//! handle of a detached launch and report exclusively through the injected
//! progress sink. Handles are returned rather than discarded so completion
//! and failure stay observable.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::deploy::{DeploymentOrchestrator, PreflightValidator};
use crate::events::ProgressSink;
use crate::ingest::{IngestError, IngestionClassifier};
use crate::policy::NetworkPolicy;
use crate::remote::RemoteChannel;
use crate::scheduler::{JobParams, JobRunner, ScheduleError, TaskScheduler};
use crate::storage::{StoreError, TargetRepository};
use crate::types::{JobView, LparTarget, PreflightReport};

/// Operation errors surfaced synchronously (everything asynchronous flows
/// through the sink instead).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown target id {0}")]
    UnknownTarget(u64),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// The orchestration-and-ingestion engine.
pub struct Engine {
    targets: Arc<dyn TargetRepository>,
    channel: Arc<dyn RemoteChannel>,
    policy: Arc<dyn NetworkPolicy>,
    sink: Arc<dyn ProgressSink>,
    scheduler: Arc<TaskScheduler>,
    ingestion: Arc<IngestionClassifier>,
}

impl Engine {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        channel: Arc<dyn RemoteChannel>,
        policy: Arc<dyn NetworkPolicy>,
        sink: Arc<dyn ProgressSink>,
        scheduler: Arc<TaskScheduler>,
        ingestion: Arc<IngestionClassifier>,
    ) -> Self {
        Self {
            targets,
            channel,
            policy,
            sink,
            scheduler,
            ingestion,
        }
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    /// Launch a deployment across the given target ids. Detached; progress
    /// streams through the sink, the handle resolves to the per-host
    /// terminal values.
    pub fn run_deployment(&self, target_ids: Vec<u64>) -> JoinHandle<Vec<String>> {
        let targets = Arc::clone(&self.targets);
        let orchestrator =
            DeploymentOrchestrator::new(Arc::clone(&self.channel), Arc::clone(&self.sink));

        tokio::spawn(async move {
            let resolved = match targets.by_ids(&target_ids) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(error = %e, "Could not resolve deployment targets");
                    return Vec::new();
                }
            };
            if resolved.len() < target_ids.len() {
                warn!(
                    requested = target_ids.len(),
                    resolved = resolved.len(),
                    "Some target ids are unknown — deploying the rest"
                );
            }
            orchestrator.run(resolved).await
        })
    }

    /// Launch a dry run for one host. Detached; check states stream through
    /// the sink, the handle resolves to the final report.
    pub fn run_dry_run(
        &self,
        hostname: String,
        username: String,
        qualifier: String,
    ) -> JoinHandle<PreflightReport> {
        let validator = PreflightValidator::new(
            Arc::clone(&self.channel),
            Arc::clone(&self.policy),
            Arc::clone(&self.sink),
        );
        tokio::spawn(async move { validator.run(&hostname, &username, &qualifier).await })
    }

    /// Register a recurring job for one target, or wipe the registry when
    /// `cancel_all` is set.
    pub fn schedule_task(
        &self,
        target_id: u64,
        time: chrono::NaiveTime,
        day_of_week: Option<chrono::Weekday>,
        cancel_all: bool,
    ) -> Result<(), EngineError> {
        let target = self
            .targets
            .by_id(target_id)?
            .ok_or(EngineError::UnknownTarget(target_id))?;
        self.scheduler.schedule_task(
            &target.lpar,
            JobParams {
                hostname: target.hostname,
                username: target.username,
                qualifier: target.dataset,
            },
            time,
            day_of_week,
            cancel_all,
        );
        Ok(())
    }

    pub fn list_scheduled_jobs(&self) -> Vec<JobView> {
        self.scheduler.list_jobs()
    }

    pub fn clear_scheduled_jobs(&self, tag: Option<&str>) {
        self.scheduler.clear_jobs(tag);
    }

    /// Run one ingestion-and-classification pass on the blocking pool (sled
    /// and file I/O are synchronous).
    pub fn ingest_and_classify(&self) -> JoinHandle<Result<Vec<String>, IngestError>> {
        let ingestion = Arc::clone(&self.ingestion);
        tokio::task::spawn_blocking(move || ingestion.run())
    }
}

/// [`JobRunner`] that launches the single-target deployment workflow bound
/// to a scheduled job.
pub struct DeployRunner {
    channel: Arc<dyn RemoteChannel>,
    sink: Arc<dyn ProgressSink>,
}

impl DeployRunner {
    pub fn new(channel: Arc<dyn RemoteChannel>, sink: Arc<dyn ProgressSink>) -> Self {
        Self { channel, sink }
    }
}

impl JobRunner for DeployRunner {
    fn launch(&self, params: &JobParams) -> JoinHandle<()> {
        let orchestrator =
            DeploymentOrchestrator::new(Arc::clone(&self.channel), Arc::clone(&self.sink));
        let target = LparTarget {
            id: 0,
            lpar: params.hostname.clone(),
            hostname: params.hostname.clone(),
            username: params.username.clone(),
            dataset: params.qualifier.clone(),
            enabled: true,
            schedule: None,
        };
        info!(host = %target.hostname, "Launching scheduled deployment");
        tokio::spawn(async move {
            let _ = orchestrator.run(vec![target]).await;
        })
    }
}
