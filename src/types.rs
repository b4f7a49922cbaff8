//! Core domain types shared across the orchestration and ingestion engine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ============================================================================
// Targets
// ============================================================================

/// One LPAR reachable over SSH.
///
/// Owned by the persistence layer; the engine only ever holds read-only
/// snapshots for the duration of a single run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LparTarget {
    pub id: u64,
    /// LPAR name, also used as the scheduler tag for this target.
    pub lpar: String,
    /// Fully qualified hostname.
    pub hostname: String,
    /// SSH login user.
    pub username: String,
    /// Dataset-name qualifier locating the system's log dataset.
    pub dataset: String,
    pub enabled: bool,
    /// Recurring schedule spec: optional weekday name, then `HH:MM`.
    /// Absent weekday means "every day". `None` disables scheduling.
    #[serde(default)]
    pub schedule: Option<String>,
}

impl LparTarget {
    /// Hostname up to the first dot — used for remote workspace and local
    /// result directory names.
    pub fn short_name(&self) -> &str {
        self.hostname.split('.').next().unwrap_or(&self.hostname)
    }
}

// ============================================================================
// Deployment status
// ============================================================================

/// Per-host state during one orchestration run.
///
/// Ephemeral: the status map is scoped to a single run and destroyed when the
/// run finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostStatus {
    Waiting,
    Done,
    Error(String),
}

impl HostStatus {
    /// Wire representation used in `task_progress` payloads.
    pub fn as_wire(&self) -> &'static str {
        match self {
            HostStatus::Waiting => "wait",
            HostStatus::Done => "done",
            HostStatus::Error(_) => "error",
        }
    }
}

// ============================================================================
// Preflight (dry run)
// ============================================================================

/// State of one dry-run check. Strictly linear: `Wait` transitions to exactly
/// one of `Done` or `Error` and is terminal once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreflightStatus {
    #[default]
    Wait,
    Done,
    Error,
}

impl PreflightStatus {
    pub fn as_wire(self) -> &'static str {
        match self {
            PreflightStatus::Wait => "wait",
            PreflightStatus::Done => "done",
            PreflightStatus::Error => "error",
        }
    }

    pub fn is_wait(self) -> bool {
        self == PreflightStatus::Wait
    }
}

/// Outcome of the four-stage dry-run pipeline for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PreflightReport {
    pub firewall_rules: PreflightStatus,
    pub check_ssh_login: PreflightStatus,
    pub check_dataset_access: PreflightStatus,
    pub check_tmp_space: PreflightStatus,
}

impl PreflightReport {
    /// Downgrade every check still in `Wait` to `Error`.
    ///
    /// Used when an earlier stage short-circuits the pipeline or an
    /// unexpected failure aborts it.
    pub fn mark_unresolved_error(&mut self) {
        for status in [
            &mut self.firewall_rules,
            &mut self.check_ssh_login,
            &mut self.check_dataset_access,
            &mut self.check_tmp_space,
        ] {
            if status.is_wait() {
                *status = PreflightStatus::Error;
            }
        }
    }

    pub fn all_done(&self) -> bool {
        [
            self.firewall_rules,
            self.check_ssh_login,
            self.check_dataset_access,
            self.check_tmp_space,
        ]
        .iter()
        .all(|s| *s == PreflightStatus::Done)
    }
}

// ============================================================================
// Telemetry records
// ============================================================================

/// One row of raw CSV telemetry as retrieved from an LPAR.
///
/// All fields are kept as strings — timestamps are validated at classification
/// time, never at parse time, so malformed data flows into the Fail/Garbage
/// buckets instead of raising. Immutable once stored; file-level uniqueness is
/// keyed by `log_dataset`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RawIplRecord {
    pub sysname: String,
    pub log_dataset: String,
    pub shutdown_begin: String,
    pub shutdown_end: String,
    pub ipl_begin: String,
    pub ipl_end: String,
    pub pre_ipl: String,
    pub pos_ipl: String,
    pub last_ipl: String,
}

/// A fully classified IPL event: all four core timestamps were valid, so the
/// four durations could be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoneRecord {
    pub sysname: String,
    /// Human-readable IPL date ("Jan 12, 2023"), derived from `shutdown_begin`.
    pub ipl_date: String,
    pub log_dataset: String,
    pub shutdown_begin: String,
    pub shutdown_end: String,
    pub ipl_begin: String,
    pub ipl_end: String,
    pub pre_ipl: String,
    pub pos_ipl: String,
    /// `shutdown_end - shutdown_begin`, as `HH:MM:SS`.
    pub shutdown_duration: String,
    /// `ipl_begin - shutdown_end`, as `HH:MM:SS`.
    pub poweroff_duration: String,
    /// `ipl_end - ipl_begin`, as `HH:MM:SS`.
    pub load_duration: String,
    /// `ipl_end - shutdown_begin`, as `HH:MM:SS`.
    pub total_duration: String,
}

/// Last-IPL index entry, derived independently of the Done/Fail/Garbage
/// partition whenever a row carries a valid `last_ipl` timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastIplRecord {
    pub sysname: String,
    pub last_ipl: String,
}

// ============================================================================
// Scheduler views
// ============================================================================

/// Read-only snapshot of one scheduled job, for admin listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub tag: String,
    /// Human-readable description of the bound task.
    pub task: String,
    pub last_run: Option<NaiveDateTime>,
    pub next_run: NaiveDateTime,
    /// Recurrence unit: `"day"` or `"week"`.
    pub unit: String,
    pub interval: u32,
    /// Recurrence period in seconds.
    pub period_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(hostname: &str) -> LparTarget {
        LparTarget {
            id: 1,
            lpar: "SYSA".to_string(),
            hostname: hostname.to_string(),
            username: "ipluser".to_string(),
            dataset: "SYS1.LOG".to_string(),
            enabled: true,
            schedule: None,
        }
    }

    #[test]
    fn short_name_strips_domain() {
        assert_eq!(target("sysa.mainframe.example.com").short_name(), "sysa");
        assert_eq!(target("sysa").short_name(), "sysa");
    }

    #[test]
    fn preflight_mark_unresolved_only_touches_wait() {
        let mut report = PreflightReport {
            firewall_rules: PreflightStatus::Done,
            check_ssh_login: PreflightStatus::Error,
            ..PreflightReport::default()
        };
        report.mark_unresolved_error();
        assert_eq!(report.firewall_rules, PreflightStatus::Done);
        assert_eq!(report.check_ssh_login, PreflightStatus::Error);
        assert_eq!(report.check_dataset_access, PreflightStatus::Error);
        assert_eq!(report.check_tmp_space, PreflightStatus::Error);
    }

    #[test]
    fn host_status_wire_values() {
        assert_eq!(HostStatus::Waiting.as_wire(), "wait");
        assert_eq!(HostStatus::Done.as_wire(), "done");
        assert_eq!(HostStatus::Error("x".to_string()).as_wire(), "error");
    }
}
