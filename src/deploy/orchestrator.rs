//! Deployment orchestrator — bounded fan-out with failure isolation.
//!
//! Every target runs its workflow independently inside a worker pool capped
//! by `deploy.worker_cap`. One host failing never disturbs the others; a
//! batch of N hosts always settles even if M < N fail. Errors are values at
//! this boundary — the caller receives per-host terminal strings, never an
//! exception.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::workflow;
use crate::config;
use crate::config::defaults::INITIAL_PROGRESS_PERCENT;
use crate::events::{self, ProgressSink};
use crate::remote::RemoteChannel;
use crate::types::{HostStatus, LparTarget};

/// Fans a deployment out across N hosts and streams progress snapshots.
pub struct DeploymentOrchestrator {
    channel: Arc<dyn RemoteChannel>,
    sink: Arc<dyn ProgressSink>,
}

impl DeploymentOrchestrator {
    pub fn new(channel: Arc<dyn RemoteChannel>, sink: Arc<dyn ProgressSink>) -> Self {
        Self { channel, sink }
    }

    /// Run the deployment workflow against every target.
    ///
    /// Returns per-host terminal values in completion order: the hostname on
    /// success, `"ERROR: <reason>"` on failure.
    pub async fn run(&self, targets: Vec<LparTarget>) -> Vec<String> {
        if targets.is_empty() {
            return Vec::new();
        }

        // Snapshot ordering is fixed up front so consumers see a stable host
        // list across the whole run.
        let order: Vec<String> = targets.iter().map(|t| t.hostname.clone()).collect();
        let statuses: Arc<DashMap<String, HostStatus>> = Arc::new(
            order
                .iter()
                .map(|h| (h.clone(), HostStatus::Waiting))
                .collect(),
        );

        let total = targets.len();
        info!(hosts = total, "Starting deployment run");
        self.emit_snapshot(&order, &statuses, INITIAL_PROGRESS_PERCENT, &[]);

        let semaphore = Arc::new(Semaphore::new(config::get().deploy.worker_cap));
        let mut workers: JoinSet<String> = JoinSet::new();

        for target in targets {
            let channel = Arc::clone(&self.channel);
            let statuses = Arc::clone(&statuses);
            let semaphore = Arc::clone(&semaphore);

            workers.spawn(async move {
                let _permit = semaphore.acquire().await;
                let hostname = target.hostname.clone();

                match workflow::deploy_host(channel.as_ref(), &target).await {
                    Ok(value) => {
                        statuses.insert(hostname, HostStatus::Done);
                        value
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        warn!(host = %hostname, error = %reason, "Host workflow failed");
                        statuses.insert(hostname.clone(), HostStatus::Error(reason.clone()));
                        format!("ERROR: {reason}")
                    }
                }
            });
        }

        let mut terminal = Vec::with_capacity(total);
        let mut errors: Vec<String> = Vec::new();
        let mut completed = 0usize;

        while let Some(joined) = workers.join_next().await {
            completed += 1;
            match joined {
                Ok(value) => {
                    if let Some(reason) = value.strip_prefix("ERROR: ") {
                        errors.push(reason.to_string());
                    }
                    terminal.push(value);
                }
                Err(e) => {
                    // A panicked worker never wrote its status; the sweep
                    // below flips the leftover Waiting entry to Error.
                    warn!(error = %e, "Deployment worker terminated abnormally");
                    errors.push(format!("worker terminated abnormally: {e}"));
                    terminal.push(format!("ERROR: worker terminated abnormally: {e}"));
                }
            }

            let percent = percent_for(completed, total);
            self.emit_snapshot(&order, &statuses, percent, &errors);
        }

        // Every host must end Done or Error — none may remain Waiting.
        for host in &order {
            let unresolved = statuses
                .get(host)
                .map(|s| *s == HostStatus::Waiting)
                .unwrap_or(true);
            if unresolved {
                statuses.insert(
                    host.clone(),
                    HostStatus::Error("workflow never completed".to_string()),
                );
            }
        }

        let percent = percent_for(completed, total);
        self.emit_snapshot(&order, &statuses, percent, &errors);
        info!(
            hosts = total,
            failed = errors.len(),
            "Deployment run settled"
        );
        terminal
    }

    fn emit_snapshot(
        &self,
        order: &[String],
        statuses: &DashMap<String, HostStatus>,
        percent: f64,
        errors: &[String],
    ) {
        let result = order
            .iter()
            .map(|host| {
                let wire = statuses
                    .get(host)
                    .map(|s| s.as_wire())
                    .unwrap_or("wait");
                format!("'{host}': '{wire}'")
            })
            .collect();
        let error = if errors.is_empty() {
            None
        } else {
            Some(errors.join("; "))
        };
        self.sink
            .emit("task_progress", events::task_progress(result, percent, error));
    }
}

/// Completion percentage, floored at the initial dispatch value so the
/// stream stays monotonically non-decreasing even for large batches.
fn percent_for(completed: usize, total: usize) -> f64 {
    let raw = (completed as f64 / total as f64) * 100.0;
    raw.max(INITIAL_PROGRESS_PERCENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_monotonic_for_large_batches() {
        // 1/20 completed is nominally 5% — below the initial 10% snapshot.
        assert_eq!(percent_for(1, 20), INITIAL_PROGRESS_PERCENT);
        assert_eq!(percent_for(10, 20), 50.0);
        assert_eq!(percent_for(20, 20), 100.0);
    }
}
