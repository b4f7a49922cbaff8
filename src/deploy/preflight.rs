//! Dry-run preflight validation.
//!
//! Four checks per host, each a strict linear state machine:
//! Wait → {Done | Error}, terminal once set, no retries. The firewall stage
//! gates the three remote stages — on firewall failure no remote call is
//! ever made. Each outcome is emitted individually before the next check
//! executes, so consumers watch the pipeline advance check by check.

use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tracing::{info, warn};

use crate::config;
use crate::config::defaults::DATASET_MIN_COUNT;
use crate::events::{self, ProgressSink};
use crate::policy::NetworkPolicy;
use crate::remote::RemoteChannel;
use crate::types::{PreflightReport, PreflightStatus};

/// Remote probe for dataset access: look the qualifier up in the catalog and
/// count readable lines of the newest log dataset.
pub(crate) fn dataset_probe_command(qualifier: &str) -> String {
    format!(
        "check=$(tsocmd \"listcat level({qualifier})\" | grep NONVSAM | egrep \"LOG|BLDR01\" \
         | tail -2 | head -1 | cut -d\" \" -f3) && head -1000 \"//'$check'\" | wc -l 2>&1"
    )
}

/// Remote probe for /tmp usage, yielding a percentage like `42%`.
pub(crate) const TMP_SPACE_COMMAND: &str = "df -kP /tmp | tail -1 | awk '{print $5}'";

/// Login probe: the final component of `$HOME` must equal the username.
pub(crate) const SSH_LOGIN_COMMAND: &str = "cd $HOME; pwd 2>&1";

/// Four-stage dry-run pipeline for one host.
pub struct PreflightValidator {
    channel: Arc<dyn RemoteChannel>,
    policy: Arc<dyn NetworkPolicy>,
    sink: Arc<dyn ProgressSink>,
}

impl PreflightValidator {
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        policy: Arc<dyn NetworkPolicy>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            channel,
            policy,
            sink,
        }
    }

    /// Run the dry-run pipeline and return the final report.
    pub async fn run(&self, hostname: &str, username: &str, qualifier: &str) -> PreflightReport {
        let mut report = PreflightReport::default();
        self.emit(&report);

        // Check 1: egress firewall. Failure or error here short-circuits —
        // the snapshot emitted at that moment still shows the remaining
        // checks as wait; only the final state downgrades them.
        match self.check_firewall(hostname).await {
            Ok(true) => {
                report.firewall_rules = PreflightStatus::Done;
                self.emit(&report);
            }
            Ok(false) => {
                info!(host = hostname, "No egress rule for host — dry run stops");
                report.firewall_rules = PreflightStatus::Error;
                self.emit(&report);
                report.mark_unresolved_error();
                self.emit(&report);
                return report;
            }
            Err(e) => {
                warn!(host = hostname, error = %e, "Firewall lookup failed — dry run stops");
                report.firewall_rules = PreflightStatus::Error;
                self.emit(&report);
                report.mark_unresolved_error();
                self.emit(&report);
                return report;
            }
        }

        // Check 2: SSH login.
        match self
            .channel
            .run_command(hostname, username, SSH_LOGIN_COMMAND)
            .await
        {
            Ok(home) => {
                let last = home.rsplit('/').next().unwrap_or("");
                report.check_ssh_login = if last == username {
                    PreflightStatus::Done
                } else {
                    PreflightStatus::Error
                };
                self.emit(&report);
            }
            Err(e) => return self.abort(report, hostname, "ssh login", &e.to_string()),
        }

        // Check 3: dataset access via catalog lookup.
        match self
            .channel
            .run_command(hostname, username, &dataset_probe_command(qualifier))
            .await
        {
            Ok(count) => {
                let readable = count
                    .trim()
                    .parse::<i64>()
                    .map(|n| n > DATASET_MIN_COUNT)
                    .unwrap_or(false);
                report.check_dataset_access = if readable {
                    PreflightStatus::Done
                } else {
                    PreflightStatus::Error
                };
                self.emit(&report);
            }
            Err(e) => return self.abort(report, hostname, "dataset access", &e.to_string()),
        }

        // Check 4: /tmp space.
        match self
            .channel
            .run_command(hostname, username, TMP_SPACE_COMMAND)
            .await
        {
            Ok(used) => {
                let threshold = config::get().preflight.tmp_space_max_percent;
                let within = used
                    .trim()
                    .trim_end_matches('%')
                    .parse::<u32>()
                    .map(|p| p < threshold)
                    .unwrap_or(false);
                report.check_tmp_space = if within {
                    PreflightStatus::Done
                } else {
                    PreflightStatus::Error
                };
                self.emit(&report);
            }
            Err(e) => return self.abort(report, hostname, "tmp space", &e.to_string()),
        }

        info!(
            host = hostname,
            passed = report.all_done(),
            "Dry run complete"
        );
        report
    }

    async fn check_firewall(&self, hostname: &str) -> Result<bool, String> {
        let ip = resolve_host(hostname).await?;
        self.policy
            .has_egress_rule(ip)
            .await
            .map_err(|e| e.to_string())
    }

    /// Unexpected transport failure: mark every unresolved check Error and
    /// emit the final state.
    fn abort(
        &self,
        mut report: PreflightReport,
        hostname: &str,
        stage: &str,
        reason: &str,
    ) -> PreflightReport {
        warn!(host = hostname, stage = stage, error = reason, "Dry run aborted");
        report.mark_unresolved_error();
        self.emit(&report);
        report
    }

    fn emit(&self, report: &PreflightReport) {
        self.sink.emit("dry_run", events::dry_run(report));
    }
}

/// Resolve a hostname to its first IP address.
async fn resolve_host(hostname: &str) -> Result<IpAddr, String> {
    let mut addrs = lookup_host((hostname, 0))
        .await
        .map_err(|e| format!("could not resolve {hostname}: {e}"))?;
    addrs
        .next()
        .map(|socket_addr| socket_addr.ip())
        .ok_or_else(|| format!("no addresses for {hostname}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_probe_embeds_qualifier() {
        let cmd = dataset_probe_command("SYSA.SYSLOG");
        assert!(cmd.contains("listcat level(SYSA.SYSLOG)"));
        assert!(cmd.contains("wc -l"));
    }
}
